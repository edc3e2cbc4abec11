//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the front handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Route each request: fast path, slow path or not found
//! - Dispatch slow-path requests through the session dispatcher
//! - Shut down in order: stop accepting, then drain the dispatcher

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::dispatch::{AppHandler, ShutdownReport};
use crate::http::request::{self, X_REQUEST_ID};
use crate::http::response::{self, StaticResponder};
use crate::lifecycle::{FrontContext, Shutdown};
use crate::net::Listener;
use crate::observability::metrics;
use crate::routing::Route;

/// Application state injected into handlers.
pub struct AppState<H: AppHandler> {
    pub context: Arc<FrontContext<H>>,
    pub statics: StaticResponder,
}

impl<H: AppHandler> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            statics: self.statics.clone(),
        }
    }
}

/// HTTP front server.
pub struct FrontServer<H: AppHandler> {
    router: Router,
    context: Arc<FrontContext<H>>,
}

impl<H> FrontServer<H>
where
    H: AppHandler<Request = Request<Body>, Response = Response>,
{
    pub fn new(context: Arc<FrontContext<H>>) -> Self {
        let config = &context.config;
        let statics = StaticResponder::new(
            context.resources.chain.clone(),
            context.cache.clone(),
            config.resources.welcome_files.clone(),
            config.cache.client_max_age_secs,
        );
        let state = AppState {
            context: context.clone(),
            statics,
        };
        let router = Self::build_router(Duration::from_secs(config.timeouts.request_secs), state);
        Self { router, context }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(request_timeout: Duration, state: AppState<H>) -> Router {
        Router::new()
            .route("/{*path}", any(front_handler::<H>))
            .route("/", any(front_handler::<H>))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// The router, for driving the server in-process (tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain the dispatcher within its deadline.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> io::Result<ShutdownReport> {
        let addr = axum::serve::Listener::local_addr(&listener)?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown({
                let shutdown = shutdown.clone();
                async move {
                    shutdown.triggered().await;
                    tracing::info!("Stopping listener");
                }
            })
            .await?;

        let report = self.context.dispatcher.shutdown(shutdown.deadline()).await;
        tracing::info!("HTTP server stopped");
        Ok(report)
    }
}

/// Routes every request: static resources directly, everything else through the dispatcher.
async fn front_handler<H>(State(state): State<AppState<H>>, request: Request<Body>) -> Response
where
    H: AppHandler<Request = Request<Body>, Response = Response>,
{
    let start = Instant::now();
    let request_id = request::request_id(request.headers());
    let path = request::decoded_path(request.uri().path());

    tracing::debug!(
        request_id = %request_id,
        method = %request.method(),
        path = %path,
        "Routing request"
    );

    let route = match state.context.resources.router.route(&path).await {
        Ok(route) => route,
        Err(e) => {
            let response = response::resource_error_response(&e);
            metrics::record_request("error", response.status().as_u16(), start);
            return response;
        }
    };

    match route {
        Route::FastPath(resource) => {
            let (parts, _body) = request.into_parts();
            let response = state
                .statics
                .serve(resource, &parts.method, &parts.headers, &parts.uri)
                .await;
            metrics::record_request("fast", response.status().as_u16(), start);
            response
        }
        Route::NotFound => {
            tracing::debug!(request_id = %request_id, path = %path, "Static resource not found");
            metrics::record_request("not_found", 404, start);
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
        Route::SlowPath => {
            let response = slow_path(&state, &request_id, request).await;
            metrics::record_request("slow", response.status().as_u16(), start);
            response
        }
    }
}

async fn slow_path<H>(state: &AppState<H>, request_id: &str, request: Request<Body>) -> Response
where
    H: AppHandler<Request = Request<Body>, Response = Response>,
{
    let cookie = &state.context.config.dispatcher.session_cookie;
    let session = request::session_id(request.headers(), cookie);
    let dispatcher = &state.context.dispatcher;

    match dispatcher.dispatch(session.as_deref(), request).await {
        Ok(response) => {
            if let Some(session) = session.as_deref() {
                if response::expires_session(response.headers(), cookie) {
                    dispatcher.on_session_destroyed(session);
                }
            }
            response
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                session = session.as_deref().unwrap_or("-"),
                error = %e,
                "Dispatch failed"
            );
            response::dispatch_error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrontConfig;
    use crate::dispatch::HandlerError;
    use crate::lifecycle::build_context;
    use async_trait::async_trait;
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl AppHandler for Echo {
        type Request = Request<Body>;
        type Response = Response;

        async fn handle(&self, request: Request<Body>) -> Result<Response, HandlerError> {
            if request.uri().path() == "/boom" {
                return Err(HandlerError::Failed("boom".to_string()));
            }
            Ok(format!("echo {}", request.uri().path()).into_response())
        }
    }

    fn server(dir: &std::path::Path) -> FrontServer<Echo> {
        std::fs::create_dir_all(dir.join("icons")).unwrap();
        std::fs::write(dir.join("icons/a.svg"), "<svg/>").unwrap();
        let mut config = FrontConfig::default();
        config.resources.loose_roots = vec![dir.display().to_string()];
        let context = build_context(config, Arc::new(Echo)).unwrap();
        FrontServer::new(Arc::new(context))
    }

    async fn send(server: &FrontServer<Echo>, path: &str) -> Response {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        server.router().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_fast_path_serves_resource() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = send(&server, "/icons/a.svg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(&X_REQUEST_ID));
        assert_eq!(body_text(response).await, "<svg/>");
    }

    #[tokio::test]
    async fn test_slow_path_reaches_handler() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = send(&server, "/app/main").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "echo /app/main");
        assert_eq!(
            server.context.dispatcher.mailbox_state(None),
            crate::dispatch::MailboxState::Active
        );
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = send(&server, "/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_static_resource_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = send(&server, "/icons/none.svg").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        server.context.dispatcher.shutdown(Duration::from_millis(100)).await;

        let response = send(&server, "/app").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        // Static resources keep working until the listener stops.
        assert_eq!(send(&server, "/icons/a.svg").await.status(), StatusCode::OK);
    }
}
