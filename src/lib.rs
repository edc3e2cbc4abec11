//! Static-resource front server with per-session request dispatch.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resources;
pub mod routing;

pub use config::FrontConfig;
pub use dispatch::{AppHandler, Dispatcher};
pub use http::FrontServer;
pub use lifecycle::{build_context, FrontContext, Shutdown};
pub use routing::{Route, Router};
