//! Resource index, manager chain and router over real archives and directories.

use webfront::lifecycle::{build_resources, StartupError};
use webfront::resources::{Origin, PathNormalizer};
use webfront::routing::Route;

mod common;

use common::Fixture;

#[test]
fn test_all_aliases_resolve_to_same_location() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    let aliases = PathNormalizer::new("META-INF").normalize("VAADIN/build/app.js").unwrap();
    assert_eq!(aliases.len(), 3);
    let first = stack.index.lookup_exact("/VAADIN/build/app.js").unwrap();
    for alias in &aliases {
        assert_eq!(stack.index.lookup_exact(alias), Some(first));
    }
    assert_eq!(first.origin(), Origin::ArchiveEntry);
}

#[test]
fn test_non_resource_archive_entries_are_not_indexed() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    assert!(!stack.index.contains("/META-INF/MANIFEST.MF"));
    assert!(!stack.index.contains("/com/example/Main.class"));
}

#[test]
fn test_loose_file_shadows_archive_entry() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    let location = stack.index.lookup_exact("/shared.css").unwrap();
    assert_eq!(location.origin(), Origin::LooseFile);
    let path = location.file_path().unwrap();
    assert!(path.ends_with("web/shared.css"), "unexpected path {}", path.display());

    // Every alias of the packaged copy is shadowed, not just the leading-slash one.
    assert_eq!(stack.index.lookup_exact("META-INF/shared.css"), Some(location));
}

#[tokio::test]
async fn test_routing_decisions() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();
    let router = &stack.router;

    match router.route("/VAADIN/build/app.js").await.unwrap() {
        Route::FastPath(resource) => {
            assert_eq!(resource.origin(), Origin::ArchiveEntry);
            assert_eq!(resource.read().await.unwrap().as_ref(), b"console.log('app');");
        }
        other => panic!("expected fast path, got {:?}", other),
    }

    assert!(matches!(router.route("/").await.unwrap(), Route::SlowPath));
    assert!(matches!(router.route("/app/orders").await.unwrap(), Route::SlowPath));
    assert!(matches!(router.route("/icons/missing.png").await.unwrap(), Route::NotFound));
    assert!(matches!(
        router.route("/VAADIN/dynamic/resource/0/abc/chart.png").await.unwrap(),
        Route::SlowPath
    ));
}

#[tokio::test]
async fn test_loose_root_fallback_sees_files_added_after_startup() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    assert!(matches!(
        stack.router.route("/images/late.png").await.unwrap(),
        Route::NotFound
    ));

    common::write_file(&fixture.loose_root, "images/late.png", b"LATE");
    match stack.router.route("/images/late.png").await.unwrap() {
        Route::FastPath(resource) => {
            assert_eq!(resource.origin(), Origin::LooseFile);
            assert_eq!(resource.read().await.unwrap().as_ref(), b"LATE");
        }
        other => panic!("expected fast path, got {:?}", other),
    }
}

#[test]
fn test_resolver_agrees_with_router_index() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    for name in [
        "VAADIN/config/stats.json",
        "META-INF/VAADIN/config/stats.json",
        "/VAADIN/config/stats.json",
    ] {
        let resolved = stack.resolver.resolve(name);
        assert!(resolved.is_some(), "{} should resolve", name);
        assert_eq!(resolved.as_ref(), stack.index.lookup_exact(name));
    }
    assert!(stack.resolver.resolve("VAADIN/config/missing.json").is_none());
}

#[test]
fn test_missing_required_resource_aborts_startup() {
    let fixture = Fixture::new();
    let mut config = fixture.resource_config();
    config.required_resources = vec![
        "VAADIN/config/stats.json".to_string(),
        "VAADIN/config/flow-build-info.json".to_string(),
    ];

    match build_resources(&config) {
        Err(StartupError::MissingRequired(missing)) => {
            assert_eq!(missing, vec!["VAADIN/config/flow-build-info.json".to_string()]);
        }
        other => panic!("expected MissingRequired, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_corrupted_archive_aborts_startup() {
    let fixture = Fixture::new();
    std::fs::write(&fixture.archive, b"not a zip at all").unwrap();

    assert!(matches!(
        build_resources(&fixture.resource_config()),
        Err(StartupError::Scan(_))
    ));
}

#[tokio::test]
async fn test_store_failure_is_not_a_miss() {
    let fixture = Fixture::new();
    let stack = build_resources(&fixture.resource_config()).unwrap();

    // The index still points into the archive; the archive itself is now broken.
    std::fs::write(&fixture.archive, b"corrupted after indexing").unwrap();

    let Route::FastPath(resource) = stack.router.route("/VAADIN/build/app.js").await.unwrap() else {
        panic!("exact index hits never touch the store");
    };
    let err = resource.read().await.unwrap_err();
    assert!(!err.is_missing(), "corruption must not look like a 404: {}", err);
}
