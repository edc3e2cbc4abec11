//! Lazily-resolved resource handles.
//!
//! A [`Resource`] is cheap to create: it pairs a request path with a location.
//! Length, modification time and entity tag are only computed when asked for,
//! so indexing tens of thousands of entries never touches the stores.

use std::io::Read;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::resources::error::ResourceError;
use crate::resources::location::{Archive, ArchiveReader, Locator, Origin, ResourceLocation};

/// Metadata computed on demand from the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    pub len: u64,
    pub last_modified: Option<SystemTime>,
    pub is_dir: bool,
}

impl ResourceMeta {
    /// Strong entity tag derived from length and modification time.
    pub fn etag(&self) -> String {
        let modified = self
            .last_modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("\"{:x}-{:x}\"", self.len, modified)
    }

    /// `Last-Modified` header value (IMF-fixdate).
    pub fn last_modified_http(&self) -> Option<String> {
        self.last_modified.map(http_date)
    }
}

/// Format a timestamp as an HTTP date.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// A static resource resolved for one request path.
#[derive(Debug, Clone)]
pub struct Resource {
    request_path: String,
    location: ResourceLocation,
}

impl Resource {
    pub fn new(request_path: impl Into<String>, location: ResourceLocation) -> Self {
        Self {
            request_path: request_path.into(),
            location,
        }
    }

    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    pub fn origin(&self) -> Origin {
        self.location.origin()
    }

    /// Stat the backing file or archive entry.
    pub async fn metadata(&self) -> Result<ResourceMeta, ResourceError> {
        match self.location.locator() {
            Locator::File(path) => {
                let meta = tokio::fs::metadata(path)
                    .await
                    .map_err(|e| ResourceError::io(path.display().to_string(), e))?;
                Ok(ResourceMeta {
                    len: meta.len(),
                    last_modified: meta.modified().ok(),
                    is_dir: meta.is_dir(),
                })
            }
            Locator::ArchiveEntry { archive, entry } => {
                let archive = archive.clone();
                let entry = entry.clone();
                tokio::task::spawn_blocking(move || archive_entry_meta(&archive, &entry)).await?
            }
        }
    }

    /// Read the whole resource into memory.
    pub async fn read(&self) -> Result<Bytes, ResourceError> {
        match self.location.locator() {
            Locator::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| ResourceError::io(path.display().to_string(), e)),
            Locator::ArchiveEntry { archive, entry } => {
                let archive = archive.clone();
                let entry = entry.clone();
                tokio::task::spawn_blocking(move || read_archive_entry(&archive, &entry)).await?
            }
        }
    }
}

/// Run `f` against a pooled reader, parsing the archive only when none is idle.
///
/// The reader goes back to the pool unless `f` failed for a reason other than a
/// missing entry; a reader that hit corruption is not reused.
fn with_reader<T>(
    archive: &Archive,
    f: impl FnOnce(&mut ArchiveReader) -> Result<T, ResourceError>,
) -> Result<T, ResourceError> {
    let mut zip = match archive.checkout() {
        Some(zip) => zip,
        None => archive.open_reader().map_err(|source| match source {
            zip::result::ZipError::Io(e) => ResourceError::io(archive.display_name(), e),
            source => ResourceError::Archive {
                archive: archive.display_name(),
                source,
            },
        })?,
    };

    let result = f(&mut zip);
    match &result {
        Err(e) if !e.is_missing() => {
            tracing::debug!(archive = %archive.display_name(), error = %e, "Dropping archive reader");
        }
        _ => archive.check_in(zip),
    }
    result
}

fn archive_entry_meta(archive: &Arc<Archive>, entry: &str) -> Result<ResourceMeta, ResourceError> {
    with_reader(archive, |zip| {
        let file = zip
            .by_name(entry)
            .map_err(|e| ResourceError::archive(archive.display_name(), entry, e))?;
        Ok(ResourceMeta {
            len: file.size(),
            last_modified: archive.modified(),
            is_dir: file.is_dir(),
        })
    })
}

fn read_archive_entry(archive: &Arc<Archive>, entry: &str) -> Result<Bytes, ResourceError> {
    with_reader(archive, |zip| {
        let mut file = zip
            .by_name(entry)
            .map_err(|e| ResourceError::archive(archive.display_name(), entry, e))?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ResourceError::io(entry.to_string(), e))?;
        Ok(Bytes::from(buf))
    })
}
