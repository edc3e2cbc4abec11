//! Startup discovery of static resources.
//!
//! # Responsibilities
//! - Enumerate entries under the resource root of every configured archive
//! - Walk every configured loose-file directory
//! - Report paths relative to their root, ready for normalization
//!
//! # Design Decisions
//! - Runs once, synchronously, before any listener is bound
//! - Any error aborts startup: a broken scan means a broken deployment
//! - Directory entries are not resources and are skipped

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::config::ResourceConfig;
use crate::resources::error::ScanError;
use crate::resources::location::Archive;
use crate::resources::normalize::strip_root;

/// A resource found inside an archive.
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    /// Path relative to the archive's resource root.
    pub relative_path: String,
    /// Full entry name inside the archive.
    pub entry_name: String,
    pub archive: Arc<Archive>,
}

/// A resource found on disk.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the loose root, with `/` separators.
    pub relative_path: String,
    /// Absolute file path.
    pub path: PathBuf,
}

/// Both resource universes, as discovered at startup.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub archive_entries: Vec<ScannedEntry>,
    pub loose_files: Vec<ScannedFile>,
    pub archives: Vec<Arc<Archive>>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.archive_entries.len() + self.loose_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scan every archive and loose root named in the configuration.
pub fn scan(config: &ResourceConfig) -> Result<ScanResult, ScanError> {
    let mut result = ScanResult::default();

    for (id, path) in config.archives.iter().enumerate() {
        let path = absolute(Path::new(path))?;
        let archive = Archive::new(id, path);
        let entries = scan_archive(&archive, &config.resource_root)?;
        tracing::info!(
            archive = %archive.path.display(),
            entries = entries.len(),
            "Scanned archive"
        );
        result.archive_entries.extend(entries);
        result.archives.push(archive);
    }

    for root in &config.loose_roots {
        let files = scan_loose_root(Path::new(root))?;
        tracing::info!(root = %root, files = files.len(), "Scanned loose root");
        result.loose_files.extend(files);
    }

    Ok(result)
}

/// List entries under `resource_root` inside one archive.
pub fn scan_archive(archive: &Arc<Archive>, resource_root: &str) -> Result<Vec<ScannedEntry>, ScanError> {
    let mut zip = archive.open_reader().map_err(|source| match source {
        zip::result::ZipError::Io(source) => ScanError::Io {
            path: archive.path.clone(),
            source,
        },
        source => ScanError::Archive {
            path: archive.path.clone(),
            source,
        },
    })?;

    let root = resource_root.trim_matches('/');
    let root_len = root.len() + 1;
    let mut entries = Vec::new();

    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i).map_err(|source| ScanError::Archive {
            path: archive.path.clone(),
            source,
        })?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name();
        match name.strip_prefix(root) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {}
            _ => continue,
        }

        let relative = strip_root(name, root_len)?;
        tracing::trace!(entry = %name, "Archive resource");
        entries.push(ScannedEntry {
            relative_path: relative.to_string(),
            entry_name: name.to_string(),
            archive: archive.clone(),
        });
    }

    // The parsed central directory serves the first requests.
    archive.check_in(zip);
    Ok(entries)
}

/// Recursively list files under a loose-file root.
pub fn scan_loose_root(root: &Path) -> Result<Vec<ScannedFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingRoot(root.to_path_buf()));
    }
    let root = absolute(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let relative = path.strip_prefix(&root).map_err(|_| ScanError::ShortPath {
            path: path.display().to_string(),
            root_len: root.as_os_str().len(),
        })?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        tracing::trace!(file = %relative, "Disk resource");
        files.push(ScannedFile {
            relative_path: relative,
            path,
        });
    }

    Ok(files)
}

fn absolute(path: &Path) -> Result<PathBuf, ScanError> {
    std::path::absolute(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })
}
