//! Resource subsystem errors.

use std::io;
use std::path::PathBuf;

/// Fatal problems found while scanning resource origins at startup.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("resource root '{0}' does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("I/O error scanning '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed walking resource directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("archive '{path}' is unreadable: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A discovered path is shorter than the root it was found under. The scan
    /// configuration is wrong, so this aborts startup instead of skipping the entry.
    #[error("path '{path}' is shorter than its resource root ({root_len} bytes)")]
    ShortPath { path: String, root_len: usize },

    #[error("path '{0}' is not valid percent-encoded UTF-8")]
    Undecodable(String),
}

/// Failure to read a resource that the index says exists.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The backing file or entry vanished after indexing.
    #[error("resource '{0}' is missing from its store")]
    Missing(String),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("archive '{archive}' is unreadable: {source}")]
    Archive {
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("blocking read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ResourceError {
    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            ResourceError::Missing(path)
        } else {
            ResourceError::Io { path, source }
        }
    }

    pub(crate) fn archive(archive: impl Into<String>, entry: &str, source: zip::result::ZipError) -> Self {
        match source {
            zip::result::ZipError::FileNotFound => ResourceError::Missing(entry.to_string()),
            source => ResourceError::Archive {
                archive: archive.into(),
                source,
            },
        }
    }

    /// True when the resource is simply gone (a miss), false for real read failures.
    pub fn is_missing(&self) -> bool {
        matches!(self, ResourceError::Missing(_))
    }
}
