//! The application handler seam.

use async_trait::async_trait;

/// Failure reported by the application handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The request failed. The worker keeps serving the session.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler can no longer be trusted (resource exhaustion and the like).
    /// The session's worker stops and its mailbox is closed.
    #[error("handler failed fatally: {0}")]
    Fatal(String),
}

impl HandlerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandlerError::Fatal(_))
    }
}

/// Processes slow-path requests. One call at a time per session.
#[async_trait]
pub trait AppHandler: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response, HandlerError>;
}
