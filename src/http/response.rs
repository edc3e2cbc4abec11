//! Response construction.
//!
//! # Responsibilities
//! - Serve fast-path resources directly (methods, conditionals, directories)
//! - Map resource and dispatch errors to stable status codes
//! - Detect upstream responses that end the client's session
//!
//! # Design Decisions
//! - Status mapping is a pure function of the error
//! - Small resources go through the fronting cache; large loose files are streamed
//! - HEAD never reads the body

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::io::ReaderStream;

use crate::dispatch::DispatchError;
use crate::http::mime;
use crate::resources::error::ResourceError;
use crate::resources::location::Locator;
use crate::resources::manager::ManagerChain;
use crate::resources::resource::{http_date, Resource, ResourceMeta};
use crate::resources::ResourceCache;

/// Methods a static resource answers.
pub const ALLOWED_METHODS: &str = "GET, HEAD, POST";

/// How a request method is treated by the fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodAction {
    /// Send headers and body.
    Body,
    /// Send headers only.
    Head,
    /// Known method, not allowed on static resources (405).
    NotAllowed,
    /// Unknown method (501).
    NotImplemented,
}

impl MethodAction {
    pub fn classify(method: &Method) -> Self {
        match *method {
            Method::GET | Method::POST => MethodAction::Body,
            Method::HEAD => MethodAction::Head,
            Method::PUT
            | Method::DELETE
            | Method::OPTIONS
            | Method::TRACE
            | Method::CONNECT
            | Method::PATCH => MethodAction::NotAllowed,
            _ => MethodAction::NotImplemented,
        }
    }
}

/// Serves resources the router resolved on the fast path.
#[derive(Debug, Clone)]
pub struct StaticResponder {
    chain: Arc<ManagerChain>,
    cache: Option<Arc<ResourceCache>>,
    welcome_files: Vec<String>,
    client_max_age: Option<u64>,
}

impl StaticResponder {
    pub fn new(
        chain: Arc<ManagerChain>,
        cache: Option<Arc<ResourceCache>>,
        welcome_files: Vec<String>,
        client_max_age: Option<u64>,
    ) -> Self {
        Self {
            chain,
            cache,
            welcome_files,
            client_max_age,
        }
    }

    /// Build the response for a resolved resource.
    pub async fn serve(&self, resource: Resource, method: &Method, headers: &HeaderMap, uri: &Uri) -> Response {
        let action = MethodAction::classify(method);
        match action {
            MethodAction::NotAllowed => {
                return (
                    StatusCode::METHOD_NOT_ALLOWED,
                    [(header::ALLOW, ALLOWED_METHODS)],
                    "Method not allowed",
                )
                    .into_response();
            }
            MethodAction::NotImplemented => {
                return (StatusCode::NOT_IMPLEMENTED, "Method not implemented").into_response();
            }
            MethodAction::Body | MethodAction::Head => {}
        }

        let path = resource.request_path().to_string();
        let meta = match resource.metadata().await {
            Ok(meta) => meta,
            Err(e) => return resource_error_response(&e),
        };

        let (resource, meta) = if meta.is_dir {
            if !path.ends_with('/') {
                let location = match uri.query() {
                    Some(query) => format!("{}/?{}", uri.path(), query),
                    None => format!("{}/", uri.path()),
                };
                return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
            }
            match self.welcome_file(&path).await {
                Ok(Some(found)) => found,
                Ok(None) => return (StatusCode::FORBIDDEN, "Directory listing denied").into_response(),
                Err(e) => return resource_error_response(&e),
            }
        } else if path.ends_with('/') {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        } else {
            (resource, meta)
        };

        if let Some(status) = evaluate_preconditions(method, headers, &meta) {
            let mut response = status.into_response();
            if status == StatusCode::NOT_MODIFIED {
                self.apply_validators(response.headers_mut(), &meta);
            }
            return response;
        }

        let body = if action == MethodAction::Head {
            Body::empty()
        } else {
            match self.body(&resource, &meta).await {
                Ok(body) => body,
                Err(e) => return resource_error_response(&e),
            }
        };

        let mut response = Response::new(body);
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(mime::from_path(resource.request_path())),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.len));
        self.apply_validators(headers, &meta);
        self.apply_caching(headers);

        tracing::trace!(
            path = %resource.request_path(),
            origin = %resource.origin(),
            len = meta.len,
            "Serving static resource"
        );
        response
    }

    async fn welcome_file(&self, dir: &str) -> Result<Option<(Resource, ResourceMeta)>, ResourceError> {
        for name in &self.welcome_files {
            let candidate = format!("{}{}", dir, name);
            let Some(resource) = self.chain.resolve(&candidate).await? else {
                continue;
            };
            match resource.metadata().await {
                Ok(meta) if !meta.is_dir => return Ok(Some((resource, meta))),
                Ok(_) => continue,
                Err(e) if e.is_missing() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn body(&self, resource: &Resource, meta: &ResourceMeta) -> Result<Body, ResourceError> {
        let path = resource.request_path();

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(path) {
                if hit.meta == *meta {
                    return Ok(Body::from(hit.body));
                }
            }
            if cache.accepts(meta.len) {
                let bytes: Bytes = resource.read().await?;
                cache.insert(path, meta.clone(), bytes.clone());
                return Ok(Body::from(bytes));
            }
        }

        match resource.location().locator() {
            Locator::File(file) => {
                let file = tokio::fs::File::open(file)
                    .await
                    .map_err(|e| ResourceError::io(file.display().to_string(), e))?;
                Ok(Body::from_stream(ReaderStream::new(file)))
            }
            Locator::ArchiveEntry { .. } => Ok(Body::from(resource.read().await?)),
        }
    }

    fn apply_validators(&self, headers: &mut HeaderMap, meta: &ResourceMeta) {
        if let Ok(etag) = HeaderValue::from_str(&meta.etag()) {
            headers.insert(header::ETAG, etag);
        }
        if let Some(Ok(modified)) = meta.last_modified_http().map(|d| HeaderValue::from_str(&d)) {
            headers.insert(header::LAST_MODIFIED, modified);
        }
    }

    fn apply_caching(&self, headers: &mut HeaderMap) {
        let Some(max_age) = self.client_max_age else {
            return;
        };
        if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        let expires = http_date(SystemTime::now() + Duration::from_secs(max_age));
        if let Ok(value) = HeaderValue::from_str(&expires) {
            headers.insert(header::EXPIRES, value);
        }
    }
}

/// Check conditional request headers against the resource.
///
/// Returns the status to answer with instead of the resource, if any.
pub fn evaluate_preconditions(method: &Method, headers: &HeaderMap, meta: &ResourceMeta) -> Option<StatusCode> {
    let etag = meta.etag();
    let modified = meta
        .last_modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    let safe = *method == Method::GET || *method == Method::HEAD;

    if let Some(if_match) = header_str(headers, header::IF_MATCH) {
        if !etag_matches(if_match, &etag, false) {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    } else if let Some(since) = header_str(headers, header::IF_UNMODIFIED_SINCE).and_then(parse_http_date) {
        if modified.is_some_and(|m| m > since) {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    }

    if let Some(if_none_match) = header_str(headers, header::IF_NONE_MATCH) {
        if etag_matches(if_none_match, &etag, true) {
            return Some(if safe {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::PRECONDITION_FAILED
            });
        }
    } else if safe {
        if let Some(since) = header_str(headers, header::IF_MODIFIED_SINCE).and_then(parse_http_date) {
            if modified.is_some_and(|m| m <= since) {
                return Some(StatusCode::NOT_MODIFIED);
            }
        }
    }

    None
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `*` or any listed tag equal to `etag`. Weak comparison ignores `W/`.
fn etag_matches(list: &str, etag: &str, weak: bool) -> bool {
    list.split(',').map(str::trim).any(|candidate| {
        if candidate == "*" {
            return true;
        }
        match candidate.strip_prefix("W/") {
            Some(tag) => weak && tag == etag,
            None => candidate == etag,
        }
    })
}

/// Parse an HTTP date into seconds since the epoch.
pub fn parse_http_date(value: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .and_then(|d| u64::try_from(d.timestamp()).ok())
}

/// Status for a resource failure: a vanished resource is a miss, anything else a server error.
pub fn resource_error_status(error: &ResourceError) -> StatusCode {
    if error.is_missing() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub fn resource_error_response(error: &ResourceError) -> Response {
    let status = resource_error_status(error);
    if status.is_server_error() {
        tracing::error!(error = %error, "Resource resolution failed");
    }
    (status, status.canonical_reason().unwrap_or("Error")).into_response()
}

/// Status for a dispatch failure.
pub fn dispatch_error_status(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::MailboxFull { .. }
        | DispatchError::ShuttingDown
        | DispatchError::MailboxClosed
        | DispatchError::Discarded => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Handler(_) | DispatchError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn dispatch_error_response(error: &DispatchError) -> Response {
    let status = dispatch_error_status(error);
    match error {
        DispatchError::MailboxFull { .. } => {
            (status, [(header::RETRY_AFTER, "1")], "Server busy, retry later").into_response()
        }
        DispatchError::ShuttingDown => (status, "Server shutting down").into_response(),
        _ => (status, status.canonical_reason().unwrap_or("Error")).into_response(),
    }
}

/// Whether `headers` expire the cookie `name` (`Max-Age=0` or an empty value).
pub fn expires_session(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|cookie| {
            let mut parts = cookie.split(';').map(str::trim);
            let Some((key, value)) = parts.next().and_then(|first| first.split_once('=')) else {
                return false;
            };
            if key != name {
                return false;
            }
            value.trim_matches('"').is_empty()
                || parts.any(|attr| attr.eq_ignore_ascii_case("max-age=0"))
        })
}
