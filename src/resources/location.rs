//! Indexed pointers to static resources.

use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Parsed archive: the central directory is read once, entries are read by offset.
pub type ArchiveReader = zip::ZipArchive<BufReader<File>>;

/// Parsed readers kept per archive. Extra readers past this are dropped on return.
const MAX_IDLE_READERS: usize = 8;

/// Which resource universe a location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    ArchiveEntry,
    LooseFile,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::ArchiveEntry => "archive",
            Origin::LooseFile => "loose",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A zip archive discovered at startup.
///
/// Archives are immutable while the server runs, so the modification time is
/// captured once and parsed readers are pooled instead of reparsing the central
/// directory on every request. Identity is the (id, path) pair.
pub struct Archive {
    /// Position in the configured archive list.
    pub id: usize,
    /// Absolute path of the archive file.
    pub path: PathBuf,
    modified: Option<SystemTime>,
    readers: Mutex<Vec<ArchiveReader>>,
}

impl Archive {
    pub fn new(id: usize, path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Arc::new(Self {
            id,
            path,
            modified,
            readers: Mutex::new(Vec::new()),
        })
    }

    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }

    /// Modification time of the archive file when it was discovered.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Open and parse the archive file.
    pub fn open_reader(&self) -> Result<ArchiveReader, zip::result::ZipError> {
        let file = File::open(&self.path)?;
        zip::ZipArchive::new(BufReader::new(file))
    }

    /// Take a parsed reader from the pool, if one is idle.
    pub fn checkout(&self) -> Option<ArchiveReader> {
        self.lock_readers().pop()
    }

    /// Return a healthy reader to the pool.
    pub fn check_in(&self, reader: ArchiveReader) {
        let mut readers = self.lock_readers();
        if readers.len() < MAX_IDLE_READERS {
            readers.push(reader);
        }
    }

    pub fn idle_readers(&self) -> usize {
        self.lock_readers().len()
    }

    fn lock_readers(&self) -> std::sync::MutexGuard<'_, Vec<ArchiveReader>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

impl PartialEq for Archive {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.path == other.path
    }
}

impl Eq for Archive {}

impl Hash for Archive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.path.hash(state);
    }
}

/// Where the bytes of a resource live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Full entry name inside a containing archive.
    ArchiveEntry { archive: Arc<Archive>, entry: String },
    /// Absolute path on disk.
    File(PathBuf),
}

/// One indexed static resource. Immutable once created; metadata such as length
/// and modification time is fetched on demand from the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocation {
    locator: Locator,
}

impl ResourceLocation {
    pub fn archive_entry(archive: Arc<Archive>, entry: impl Into<String>) -> Self {
        Self {
            locator: Locator::ArchiveEntry {
                archive,
                entry: entry.into(),
            },
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            locator: Locator::File(path.into()),
        }
    }

    pub fn origin(&self) -> Origin {
        match self.locator {
            Locator::ArchiveEntry { .. } => Origin::ArchiveEntry,
            Locator::File(_) => Origin::LooseFile,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Disk path for loose files.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.locator {
            Locator::File(path) => Some(path),
            Locator::ArchiveEntry { .. } => None,
        }
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Locator::ArchiveEntry { archive, entry } => {
                write!(f, "{}!/{}", archive.path.display(), entry)
            }
            Locator::File(path) => write!(f, "{}", path.display()),
        }
    }
}
