//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → request.rs (decode path, extract session cookie)
//!     → routing::Router (fast / slow / not found)
//!     → fast:  response.rs (StaticResponder: methods, conditionals, cache)
//!     → slow:  dispatch::Dispatcher → upstream.rs (forward to application)
//!     → Send to client
//! ```

pub mod mime;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use request::X_REQUEST_ID;
pub use response::StaticResponder;
pub use server::{AppState, FrontServer};
pub use upstream::UpstreamHandler;
