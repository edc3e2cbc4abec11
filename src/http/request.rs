//! Request inspection helpers.
//!
//! # Responsibilities
//! - Extract the session id from the configured cookie
//! - Read the request ID set by the request-id layer
//! - Decode the request path into the form the index is keyed by
//!
//! # Design Decisions
//! - All helpers are pure functions over headers/URIs (easy to test)
//! - A path that is not valid UTF-8 after decoding is routed as-is to the application

use axum::http::{HeaderMap, HeaderName};
use percent_encoding::percent_decode_str;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Value of cookie `name`, if any `Cookie` header carries it.
pub fn session_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// The request ID, or `"unknown"` when the layer did not run.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Percent-decode a URI path. Falls back to the raw path on invalid UTF-8.
pub fn decoded_path(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
