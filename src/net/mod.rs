//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → Hand off to HTTP layer (axum::serve)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - TLS is terminated in front of this server

pub mod listener;

pub use listener::{Listener, ListenerError};
