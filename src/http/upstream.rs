//! Upstream application handler.
//!
//! # Responsibilities
//! - Forward slow-path requests to the application server
//! - Propagate the request ID
//! - Bound each forward with a timeout
//!
//! # Design Decisions
//! - One pooled hyper-util client shared by all session workers
//! - Transport failures become 502/504 responses, not handler failures,
//!   so a flaky upstream never closes a session's mailbox

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::UpstreamConfig;
use crate::dispatch::{AppHandler, HandlerError};
use crate::http::request::{request_id, X_REQUEST_ID};

/// Forwards requests to the application at a fixed address.
#[derive(Debug, Clone)]
pub struct UpstreamHandler {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
}

impl UpstreamHandler {
    pub fn new(config: &UpstreamConfig) -> Result<Self, HandlerError> {
        let authority: Authority = config
            .address
            .parse()
            .map_err(|e| HandlerError::Failed(format!("invalid upstream address '{}': {}", config.address, e)))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            authority,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, HandlerError> {
        let mut parts = uri.clone().into_parts();
        parts.scheme = Some(Scheme::HTTP);
        parts.authority = Some(self.authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some("/".parse().map_err(|_| HandlerError::Failed("invalid path".into()))?);
        }
        Uri::from_parts(parts).map_err(|e| HandlerError::Failed(format!("invalid upstream uri: {}", e)))
    }
}

#[async_trait]
impl AppHandler for UpstreamHandler {
    type Request = Request<Body>;
    type Response = Response;

    async fn handle(&self, request: Request<Body>) -> Result<Response, HandlerError> {
        let request_id = request_id(request.headers());
        let (mut parts, body) = request.into_parts();
        parts.uri = self.rewrite_uri(&parts.uri)?;
        parts.headers.remove(header::HOST);
        if let Ok(host) = self.authority.as_str().parse() {
            parts.headers.insert(header::HOST, host);
        }
        if let Ok(id) = request_id.parse() {
            parts.headers.insert(X_REQUEST_ID, id);
        }

        let request = Request::from_parts(parts, body);
        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(into_response(response)),
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, upstream = %self.authority, error = %e, "Upstream error");
                Ok((StatusCode::BAD_GATEWAY, "Upstream request failed").into_response())
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, upstream = %self.authority, "Upstream timed out");
                Ok((StatusCode::GATEWAY_TIMEOUT, "Upstream timed out").into_response())
            }
        }
    }
}

fn into_response(response: hyper::Response<Incoming>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}
