//! Resource managers and the manager chain.
//!
//! # Responsibilities
//! - Resolve a request path to a resource within one backing store
//! - Try stores in a fixed priority order, first hit wins
//! - Keep "not found" and "failed to resolve" apart
//!
//! # Design Decisions
//! - Loose files are consulted before archives (same precedence as the index)
//! - Index hits never touch the store; only the loose-root fallback stats
//! - Paths that try to leave a loose root are never resolved against disk

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::resources::error::ResourceError;
use crate::resources::index::ResourceIndex;
use crate::resources::location::{Origin, ResourceLocation};
use crate::resources::resource::Resource;

/// A backing store that can resolve request paths.
#[async_trait]
pub trait ResourceManager: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// `Ok(None)` means this store does not have the path.
    async fn resolve(&self, path: &str) -> Result<Option<Resource>, ResourceError>;
}

/// Serves files found on disk.
#[derive(Debug)]
pub struct LooseFileManager {
    name: String,
    index: Arc<ResourceIndex>,
    roots: Vec<PathBuf>,
}

impl LooseFileManager {
    pub fn new(name: impl Into<String>, index: Arc<ResourceIndex>, roots: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            index,
            roots,
        }
    }

    async fn resolve_from_roots(&self, path: &str) -> Result<Option<Resource>, ResourceError> {
        let Some(relative) = safe_relative_path(path) else {
            tracing::trace!(path = %path, "Refusing unsafe path");
            return Ok(None);
        };

        for root in &self.roots {
            let candidate = root.join(&relative);
            match tokio::fs::metadata(&candidate).await {
                Ok(_) => {
                    tracing::trace!(path = %path, file = %candidate.display(), "Resolved from loose root");
                    return Ok(Some(Resource::new(path, ResourceLocation::file(candidate))));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ResourceError::io(candidate.display().to_string(), e)),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ResourceManager for LooseFileManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, path: &str) -> Result<Option<Resource>, ResourceError> {
        match self.index.lookup_exact(path) {
            Some(location) if location.origin() == Origin::LooseFile => {
                Ok(Some(Resource::new(path, location.clone())))
            }
            // Indexed, but owned by another store.
            Some(_) => Ok(None),
            None => self.resolve_from_roots(path).await,
        }
    }
}

/// Serves entries packaged inside archives.
#[derive(Debug)]
pub struct ArchiveManager {
    name: String,
    index: Arc<ResourceIndex>,
}

impl ArchiveManager {
    pub fn new(name: impl Into<String>, index: Arc<ResourceIndex>) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

#[async_trait]
impl ResourceManager for ArchiveManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, path: &str) -> Result<Option<Resource>, ResourceError> {
        Ok(self
            .index
            .lookup_exact(path)
            .filter(|location| location.origin() == Origin::ArchiveEntry)
            .map(|location| Resource::new(path, location.clone())))
    }
}

/// Ordered list of managers; the first one that resolves a path wins.
#[derive(Debug, Default)]
pub struct ManagerChain {
    managers: Vec<Box<dyn ResourceManager>>,
}

impl ManagerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, manager: impl ResourceManager + 'static) -> Self {
        self.managers.push(Box::new(manager));
        self
    }

    /// Resolve through each manager in priority order.
    ///
    /// A store error stops the search: a failing store must surface as a
    /// server error, not fall through to a lower-priority store or a 404.
    pub async fn resolve(&self, path: &str) -> Result<Option<Resource>, ResourceError> {
        for manager in &self.managers {
            match manager.resolve(path).await {
                Ok(Some(resource)) => {
                    tracing::trace!(path = %path, manager = manager.name(), "Resource resolved");
                    return Ok(Some(resource));
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(path = %path, manager = manager.name(), error = %e, "Resource resolution failed");
                    return Err(e);
                }
            }
        }
        tracing::trace!(path = %path, "Resource not found");
        Ok(None)
    }

    pub fn manager_names(&self) -> Vec<&str> {
        self.managers.iter().map(|m| m.name()).collect()
    }
}

/// Turn a request path into a relative disk path, rejecting anything that could
/// escape the root (`..`, absolute components, Windows separators).
pub fn safe_relative_path(path: &str) -> Option<PathBuf> {
    if path.contains('\\') || path.contains('\0') {
        return None;
    }
    let trimmed = path.trim_start_matches('/');
    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}
