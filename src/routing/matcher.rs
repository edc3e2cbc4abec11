//! Static prefix matching.
//!
//! # Responsibilities
//! - Match a request path against the registered static prefixes
//! - Pick the longest matching prefix, not the first registered one
//! - Detect the dynamic sub-path carve-out below a matched prefix
//!
//! # Design Decisions
//! - Prefixes match on segment boundaries (`/icons` does not match `/iconsx`)
//! - Path matching is case-sensitive
//! - Lookup walks the request's own segments, cost bounded by path depth
//! - No regex to guarantee O(n) matching

use std::collections::HashSet;

use crate::resources::normalize::segment_prefixes;

/// Outcome of matching a path against the static prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatch<'a> {
    /// Path lies under a static prefix and may be served directly.
    Static(&'a str),
    /// Path lies under a static prefix, but inside the reserved dynamic sub-path.
    Dynamic(&'a str),
}

/// Matches request paths against a fixed set of static prefixes.
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefixes: HashSet<String>,
    dynamic_subpath: String,
}

impl PrefixMatcher {
    /// Create a matcher. Trailing slashes on prefixes are ignored.
    pub fn new<I, S>(prefixes: I, dynamic_subpath: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            prefixes,
            dynamic_subpath: dynamic_subpath.into(),
        }
    }

    /// Longest registered prefix of `path`, on segment boundaries.
    pub fn longest_match<'a>(&self, path: &'a str) -> Option<&'a str> {
        segment_prefixes(path).find(|prefix| self.prefixes.contains(*prefix))
    }

    /// Match `path` and classify it as static or dynamic content.
    pub fn classify<'a>(&self, path: &'a str) -> Option<PrefixMatch<'a>> {
        let prefix = self.longest_match(path)?;
        let rest = path[prefix.len()..].trim_start_matches('/');
        let next_segment = rest.split('/').next().unwrap_or_default();

        if !self.dynamic_subpath.is_empty() && next_segment == self.dynamic_subpath {
            Some(PrefixMatch::Dynamic(prefix))
        } else {
            Some(PrefixMatch::Static(prefix))
        }
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matcher() {
        let matcher = PrefixMatcher::new(["/VAADIN", "/icons/"], "dynamic");

        assert_eq!(matcher.longest_match("/icons/logo.png"), Some("/icons"));
        assert_eq!(matcher.longest_match("/VAADIN/build/app.js"), Some("/VAADIN"));
        assert_eq!(matcher.longest_match("/iconsx/logo.png"), None);
        assert_eq!(matcher.longest_match("/vaadin/build/app.js"), None); // Case sensitive
        assert_eq!(matcher.longest_match("/"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let matcher = PrefixMatcher::new(["/a", "/a/b"], "dynamic");
        assert_eq!(matcher.longest_match("/a/b/c"), Some("/a/b"));
        assert_eq!(matcher.longest_match("/a/c"), Some("/a"));
    }

    #[test]
    fn test_dynamic_carve_out() {
        let matcher = PrefixMatcher::new(["/VAADIN"], "dynamic");

        assert_eq!(
            matcher.classify("/VAADIN/dynamic/resource/1/abc/img.png"),
            Some(PrefixMatch::Dynamic("/VAADIN"))
        );
        assert_eq!(
            matcher.classify("/VAADIN/build/dynamic/x.js"),
            Some(PrefixMatch::Static("/VAADIN"))
        );
        assert_eq!(
            matcher.classify("/VAADIN/dynamically.js"),
            Some(PrefixMatch::Static("/VAADIN"))
        );
        assert_eq!(matcher.classify("/other/dynamic/x"), None);
    }
}
