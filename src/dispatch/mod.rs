//! Session dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Slow-path request (session id from cookie, optional)
//!     → dispatcher.rs (session id → MailboxKey, get-or-create mailbox)
//!     → mailbox.rs (bounded queue; block or reject when full)
//!     → worker (one per mailbox, one request at a time)
//!     → handler.rs (AppHandler::handle)
//!     → Receipt (oneshot reply to the caller)
//!
//! Mailbox lifecycle:
//!     Absent → Active → (Draining) → Closed
//! ```
//!
//! # Design Decisions
//! - Requests in one session run strictly in submission order
//! - Sessions run concurrently, bounded by a shared handler semaphore
//! - Handler failures stay with the request; fatal failures close only that mailbox
//! - No global state: the dispatcher is an explicit value owned by the server context

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod mailbox;

pub use dispatcher::{Dispatcher, Receipt, ShutdownReport};
pub use error::DispatchError;
pub use handler::{AppHandler, HandlerError};
pub use mailbox::{MailboxKey, MailboxState};
