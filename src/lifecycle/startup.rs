//! Startup orchestration.
//!
//! # Responsibilities
//! - Scan resource origins and build the index
//! - Assemble the manager chain, router, resolver and cache
//! - Create the dispatcher around the application handler
//! - Refuse to start when a required resource is missing
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Everything lands in one explicit context value; no global state

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigError, FrontConfig, ResourceConfig};
use crate::dispatch::{AppHandler, Dispatcher};
use crate::observability::metrics;
use crate::resources::error::ScanError;
use crate::resources::manager::{ArchiveManager, LooseFileManager, ManagerChain};
use crate::resources::normalize::PathNormalizer;
use crate::resources::resolver::ModuleResolver;
use crate::resources::{scan, ResourceCache, ResourceIndex};
use crate::routing::{PrefixMatcher, Router};

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("resource scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("required resources missing from index: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
}

/// Everything built from the resource configuration.
#[derive(Debug, Clone)]
pub struct ResourceStack {
    pub index: Arc<ResourceIndex>,
    pub chain: Arc<ManagerChain>,
    pub router: Arc<Router>,
    pub resolver: ModuleResolver,
}

/// The runtime context handed to the server and every component it drives.
pub struct FrontContext<H: AppHandler> {
    pub config: FrontConfig,
    pub resources: ResourceStack,
    pub cache: Option<Arc<ResourceCache>>,
    pub dispatcher: Arc<Dispatcher<H>>,
}

impl<H: AppHandler> std::fmt::Debug for FrontContext<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontContext")
            .field("resources", &self.resources)
            .field("cache", &self.cache.is_some())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Scan, index and wire up the resource side. Blocking; call before serving.
pub fn build_resources(config: &ResourceConfig) -> Result<ResourceStack, StartupError> {
    let scanned = scan(config)?;
    let normalizer = PathNormalizer::new(config.alias_marker.clone());
    let index = Arc::new(ResourceIndex::from_scan(&scanned, &normalizer)?);

    let missing: Vec<String> = config
        .required_resources
        .iter()
        .filter(|name| !index.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(StartupError::MissingRequired(missing));
    }

    let loose_roots = config
        .loose_roots
        .iter()
        .filter_map(|root| std::path::absolute(root).ok())
        .collect::<Vec<PathBuf>>();

    let chain = Arc::new(
        ManagerChain::new()
            .with(LooseFileManager::new("loose", index.clone(), loose_roots))
            .with(ArchiveManager::new("archive", index.clone())),
    );
    let prefixes = PrefixMatcher::new(&config.static_prefixes, config.dynamic_subpath.clone());
    let router = Arc::new(Router::new(index.clone(), chain.clone(), prefixes));
    let resolver = ModuleResolver::new(index.clone());

    metrics::set_index_entries(index.len());
    tracing::info!(
        resources = index.resource_count(),
        aliases = index.len(),
        archives = scanned.archives.len(),
        managers = ?chain.manager_names(),
        "Resource index ready"
    );

    Ok(ResourceStack {
        index,
        chain,
        router,
        resolver,
    })
}

/// Build the full runtime context.
pub fn build_context<H: AppHandler>(config: FrontConfig, handler: Arc<H>) -> Result<FrontContext<H>, StartupError> {
    let resources = build_resources(&config.resources)?;
    let cache = ResourceCache::from_config(&config.cache).map(Arc::new);
    let dispatcher = Arc::new(Dispatcher::new(handler, &config.dispatcher));

    tracing::info!(
        mailbox_capacity = config.dispatcher.mailbox_capacity,
        backpressure = ?config.dispatcher.backpressure,
        cache = cache.is_some(),
        "Front context ready"
    );

    Ok(FrontContext {
        config,
        resources,
        cache,
        dispatcher,
    })
}
