//! Per-request routing decision.
//!
//! # Responsibilities
//! - Decide fast path (serve a static resource) or slow path (application)
//! - Answer NotFound only for paths under a static prefix that no store has
//! - Record the decision for metrics
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Exact index hits are answered without any I/O
//! - The application is the catch-all: anything unknown goes to the slow path
//! - Store failures propagate as errors, never as NotFound

use std::sync::Arc;

use crate::observability::metrics;
use crate::resources::error::ResourceError;
use crate::resources::index::ResourceIndex;
use crate::resources::manager::ManagerChain;
use crate::resources::resource::Resource;
use crate::routing::matcher::{PrefixMatch, PrefixMatcher};

/// Where a request goes.
#[derive(Debug, Clone)]
pub enum Route {
    /// Serve this resource directly.
    FastPath(Resource),
    /// Hand the request to the application handler.
    SlowPath,
    /// Under a static prefix, but nothing backs it.
    NotFound,
}

impl Route {
    pub fn decision(&self) -> &'static str {
        match self {
            Route::FastPath(_) => "fast",
            Route::SlowPath => "slow",
            Route::NotFound => "not_found",
        }
    }
}

/// The request router.
#[derive(Debug)]
pub struct Router {
    index: Arc<ResourceIndex>,
    chain: Arc<ManagerChain>,
    prefixes: PrefixMatcher,
}

impl Router {
    pub fn new(index: Arc<ResourceIndex>, chain: Arc<ManagerChain>, prefixes: PrefixMatcher) -> Self {
        Self {
            index,
            chain,
            prefixes,
        }
    }

    /// Route a decoded request path.
    pub async fn route(&self, path: &str) -> Result<Route, ResourceError> {
        let route = self.decide(path).await?;
        tracing::debug!(path = %path, decision = route.decision(), "Routed request");
        metrics::record_route(route.decision());
        Ok(route)
    }

    async fn decide(&self, path: &str) -> Result<Route, ResourceError> {
        // The application owns the root document.
        if path.len() <= 1 {
            return Ok(Route::SlowPath);
        }

        if let Some(location) = self.index.lookup_exact(path) {
            return Ok(Route::FastPath(Resource::new(path, location.clone())));
        }

        match self.prefixes.classify(path) {
            Some(PrefixMatch::Dynamic(prefix)) => {
                tracing::trace!(path = %path, prefix = %prefix, "Dynamic resource, deferring to application");
                Ok(Route::SlowPath)
            }
            Some(PrefixMatch::Static(_)) => Ok(match self.chain.resolve(path).await? {
                Some(resource) => Route::FastPath(resource),
                None => Route::NotFound,
            }),
            None => Ok(Route::SlowPath),
        }
    }

    pub fn index(&self) -> &Arc<ResourceIndex> {
        &self.index
    }

    pub fn chain(&self) -> &Arc<ManagerChain> {
        &self.chain
    }
}
