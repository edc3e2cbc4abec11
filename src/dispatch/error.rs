//! Dispatch errors.

/// Why a submitted request did not produce a handler response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The session's mailbox is at capacity (reject policy).
    #[error("mailbox '{mailbox}' is full")]
    MailboxFull { mailbox: String },

    /// The dispatcher no longer admits work.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The mailbox was closed while the request was being admitted.
    #[error("mailbox closed")]
    MailboxClosed,

    /// The request was accepted but dropped before the handler ran it.
    #[error("request discarded before processing")]
    Discarded,

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("worker failed fatally: {0}")]
    Fatal(String),
}

impl DispatchError {
    /// Whether a client may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::MailboxFull { .. } | DispatchError::ShuttingDown)
    }
}
