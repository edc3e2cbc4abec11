//! The resource index.
//!
//! # Responsibilities
//! - Map every alias of every scanned resource to its location
//! - Resolve alias conflicts between origins deterministically
//! - Answer exact and longest-prefix queries on the request hot path
//!
//! # Design Decisions
//! - Built once from a complete scan, read-only afterwards (lock-free reads)
//! - O(1) exact lookup via HashMap
//! - Prefix lookup walks segment boundaries of the query, longest first,
//!   so cost is bounded by path depth rather than index size
//! - Loose files beat archive entries; within one origin the first scanned wins

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use crate::resources::error::ScanError;
use crate::resources::location::{Origin, ResourceLocation};
use crate::resources::normalize::{segment_prefixes, PathNormalizer};
use crate::resources::scan::ScanResult;

/// Immutable mapping from request path to resource location.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    entries: HashMap<String, ResourceLocation>,
    resources: usize,
}

impl ResourceIndex {
    /// Build an index from alias sets. Each location is stored under every alias
    /// in its set.
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (BTreeSet<String>, ResourceLocation)>,
    {
        let mut index = Self::default();
        for (aliases, location) in entries {
            index.resources += 1;
            for alias in aliases {
                index.insert(alias, location.clone());
            }
        }

        tracing::debug!(
            resources = index.resources,
            aliases = index.entries.len(),
            "Resource index built"
        );
        index
    }

    /// Build an index from a startup scan, normalizing every discovered path.
    pub fn from_scan(scan: &ScanResult, normalizer: &PathNormalizer) -> Result<Self, ScanError> {
        let mut entries = Vec::with_capacity(scan.len());
        for entry in &scan.archive_entries {
            let aliases = normalizer.normalize(&entry.relative_path)?;
            entries.push((
                aliases,
                ResourceLocation::archive_entry(entry.archive.clone(), entry.entry_name.clone()),
            ));
        }
        for file in &scan.loose_files {
            let aliases = normalizer.normalize(&file.relative_path)?;
            entries.push((aliases, ResourceLocation::file(file.path.clone())));
        }
        Ok(Self::build(entries))
    }

    fn insert(&mut self, alias: String, location: ResourceLocation) {
        match self.entries.entry(alias) {
            Entry::Vacant(slot) => {
                slot.insert(location);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                if *existing == location {
                    return;
                }
                if existing.origin() == Origin::ArchiveEntry && location.origin() == Origin::LooseFile {
                    tracing::debug!(
                        alias = %slot.key(),
                        archive = %existing,
                        file = %location,
                        "Loose file shadows archive entry"
                    );
                    slot.insert(location);
                } else {
                    tracing::debug!(
                        alias = %slot.key(),
                        kept = %existing,
                        ignored = %location,
                        "Duplicate resource alias ignored"
                    );
                }
            }
        }
    }

    /// Location registered under exactly `path`.
    pub fn lookup_exact(&self, path: &str) -> Option<&ResourceLocation> {
        self.entries.get(path)
    }

    /// Longest registered key that is a segment-boundary prefix of `path`.
    pub fn lookup_prefix<'a>(&self, path: &'a str) -> Option<(&'a str, &ResourceLocation)> {
        segment_prefixes(path).find_map(|prefix| self.entries.get(prefix).map(|location| (prefix, location)))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of aliases (index keys).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of physical resources the index was built from.
    pub fn resource_count(&self) -> usize {
        self.resources
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceLocation)> {
        self.entries.iter().map(|(alias, location)| (alias.as_str(), location))
    }
}
