//! Path normalization.
//!
//! # Responsibilities
//! - Strip the resource root a scanned path was discovered under
//! - Percent-decode scanned paths so they match request paths
//! - Produce every alias a resource may be requested under
//!
//! # Design Decisions
//! - Pure functions, no state beyond the configured marker segment
//! - A path shorter than its root is a configuration error, never a skip
//! - `+` is left alone: request paths follow RFC 3986, not form encoding

use std::collections::BTreeSet;

use percent_encoding::percent_decode_str;

use crate::resources::error::ScanError;

/// Remove the first `root_len` bytes of a scanned path.
pub fn strip_root(path: &str, root_len: usize) -> Result<&str, ScanError> {
    path.get(root_len..).ok_or_else(|| ScanError::ShortPath {
        path: path.to_string(),
        root_len,
    })
}

/// Percent-decode a path into the form clients request it by.
pub fn decode_path(raw: &str) -> Result<String, ScanError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ScanError::Undecodable(raw.to_string()))
}

/// Computes request aliases for scanned resource paths.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    marker: String,
}

impl PathNormalizer {
    /// `marker` is the segment some callers prepend when re-requesting a resource.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Every path under which `raw` may legitimately be requested:
    /// the decoded path, the path under the marker segment, and the
    /// path with a leading `/`. At most three entries.
    pub fn normalize(&self, raw: &str) -> Result<BTreeSet<String>, ScanError> {
        let decoded = decode_path(raw)?;
        let mut aliases = BTreeSet::new();

        if !decoded.starts_with(self.marker.as_str()) {
            aliases.insert(format!(
                "{}/{}",
                self.marker,
                decoded.trim_start_matches('/')
            ));
        }
        if !decoded.starts_with('/') {
            aliases.insert(format!("/{}", decoded));
        }
        aliases.insert(decoded);

        Ok(aliases)
    }
}

/// Segment-boundary prefixes of `path`, longest first.
///
/// `/a/b/c` yields `/a/b/c`, `/a/b`, `/a`. A prefix never ends in the middle of
/// a segment, so `/ab` is not a prefix of `/abc`.
pub fn segment_prefixes(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_end_matches('/');
    let full = if trimmed.is_empty() { None } else { Some(trimmed) };
    full.into_iter().chain(
        trimmed
            .rmatch_indices('/')
            .map(move |(i, _)| &trimmed[..i])
            .filter(|prefix| !prefix.is_empty()),
    )
}
