//! Fronting byte cache for static resources.

use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

use crate::config::CacheConfig;
use crate::resources::resource::ResourceMeta;

/// A cached resource body with the metadata it was served with.
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub meta: ResourceMeta,
    pub body: Bytes,
    inserted: Instant,
}

/// Size- and age-bounded cache keyed by request path.
///
/// Reads and writes go through DashMap shards, so population and eviction never
/// hold a lock across an await point or across the whole map.
#[derive(Debug)]
pub struct ResourceCache {
    entries: DashMap<String, CachedResource>,
    max_entries: usize,
    max_file_bytes: u64,
    max_age: Duration,
}

impl ResourceCache {
    pub fn new(max_entries: usize, max_file_bytes: u64, max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            max_file_bytes,
            max_age,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config.enabled.then(|| {
            Self::new(
                config.max_entries,
                config.max_file_bytes,
                Duration::from_secs(config.max_age_secs),
            )
        })
    }

    /// Whether a resource of this size is eligible for caching.
    pub fn accepts(&self, len: u64) -> bool {
        len <= self.max_file_bytes
    }

    pub fn get(&self, path: &str) -> Option<CachedResource> {
        let hit = self.entries.get(path).map(|entry| entry.value().clone())?;
        if hit.inserted.elapsed() > self.max_age {
            self.entries.remove(path);
            return None;
        }
        Some(hit)
    }

    pub fn insert(&self, path: &str, meta: ResourceMeta, body: Bytes) {
        if !self.accepts(body.len() as u64) {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(path) {
            self.evict();
        }
        self.entries.insert(
            path.to_string(),
            CachedResource {
                meta,
                body,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop expired entries; if still full, drop the oldest one.
    fn evict(&self) {
        let max_age = self.max_age;
        self.entries.retain(|_, entry| entry.inserted.elapsed() <= max_age);
        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
