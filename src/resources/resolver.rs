//! Module-resolution shim.
//!
//! Lets the application's own resource lookups go through the same index the
//! router uses, so both always agree on where a named resource lives.

use std::fmt;
use std::sync::Arc;

use crate::resources::index::ResourceIndex;
use crate::resources::location::ResourceLocation;

/// Anything that can answer "where does this named resource live?".
pub trait ResolveResource: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ResourceLocation>;
}

impl ResolveResource for ResourceIndex {
    fn resolve(&self, name: &str) -> Option<ResourceLocation> {
        self.lookup_exact(name).cloned()
    }
}

impl<F> ResolveResource for F
where
    F: Fn(&str) -> Option<ResourceLocation> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<ResourceLocation> {
        self(name)
    }
}

/// Resolves names against the resource index, then an optional parent.
#[derive(Clone)]
pub struct ModuleResolver {
    index: Arc<ResourceIndex>,
    parent: Option<Arc<dyn ResolveResource>>,
}

impl ModuleResolver {
    pub fn new(index: Arc<ResourceIndex>) -> Self {
        Self {
            index,
            parent: None,
        }
    }

    /// Consulted for names the index does not know.
    pub fn with_parent(mut self, parent: Arc<dyn ResolveResource>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn resolve(&self, name: &str) -> Option<ResourceLocation> {
        if let Some(location) = self.index.resolve(name) {
            tracing::trace!(name = %name, origin = %location.origin(), "Resolved from index");
            return Some(location);
        }
        self.parent.as_ref().and_then(|parent| parent.resolve(name))
    }
}

impl ResolveResource for ModuleResolver {
    fn resolve(&self, name: &str) -> Option<ResourceLocation> {
        ModuleResolver::resolve(self, name)
    }
}

impl fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("entries", &self.index.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::location::{Archive, Origin};
    use crate::resources::normalize::PathNormalizer;
    use std::collections::BTreeSet;

    #[test]
    fn test_resolver_agrees_with_index() {
        let normalizer = PathNormalizer::new("META-INF");
        let archive = Archive::new(0, "/srv/app.jar");
        let packaged = ResourceLocation::archive_entry(archive, "META-INF/resources/VAADIN/config/stats.json");
        let loose = ResourceLocation::file("/srv/web/VAADIN/config/stats.json");
        let aliases = normalizer.normalize("VAADIN/config/stats.json").unwrap();
        let index = Arc::new(ResourceIndex::build(vec![
            (aliases.clone(), packaged),
            (aliases, loose.clone()),
        ]));

        let resolver = ModuleResolver::new(index.clone());
        for name in [
            "VAADIN/config/stats.json",
            "META-INF/VAADIN/config/stats.json",
            "/VAADIN/config/stats.json",
        ] {
            assert_eq!(resolver.resolve(name), index.lookup_exact(name).cloned());
            assert_eq!(resolver.resolve(name).map(|l| l.origin()), Some(Origin::LooseFile));
        }
    }

    #[test]
    fn test_parent_consulted_on_miss() {
        let index = Arc::new(ResourceIndex::build(vec![(
            BTreeSet::from(["/a.txt".to_string()]),
            ResourceLocation::file("/srv/a.txt"),
        )]));
        let fallback = ResourceLocation::file("/opt/lib/b.txt");
        let expected = fallback.clone();
        let parent = move |name: &str| (name == "b.txt").then(|| fallback.clone());

        let resolver = ModuleResolver::new(index).with_parent(Arc::new(parent));
        assert_eq!(resolver.resolve("/a.txt"), Some(ResourceLocation::file("/srv/a.txt")));
        assert_eq!(resolver.resolve("b.txt"), Some(expected));
        assert_eq!(resolver.resolve("c.txt"), None);
    }
}
