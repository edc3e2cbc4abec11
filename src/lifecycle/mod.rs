//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Scan → Index → Chain/Router → Dispatcher → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain mailboxes → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then resources, then dispatcher, listener last
//! - Ordered shutdown: stop accept, drain, close
//! - The shutdown handle carries its deadline: mailboxes still open after it are closed by force

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_context, build_resources, FrontContext, ResourceStack, StartupError};
