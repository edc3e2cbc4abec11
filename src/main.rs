//! webfront: static-resource front server
//!
//! Serves static resources straight from an in-memory index and hands every
//! other request to the application, one request at a time per session.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                      WEBFRONT                         │
//!                        │                                                       │
//!   Client Request       │  ┌─────────┐   ┌─────────┐   ┌──────────────┐         │
//!   ─────────────────────┼─▶│   net   │──▶│  http   │──▶│   routing    │         │
//!                        │  │listener │   │ server  │   │   router     │         │
//!                        │  └─────────┘   └─────────┘   └──────┬───────┘         │
//!                        │                        fast path    │   slow path     │
//!                        │                  ┌──────────────────┴───────┐         │
//!                        │                  ▼                          ▼         │
//!                        │         ┌────────────────┐        ┌────────────────┐  │
//!                        │         │   resources    │        │   dispatch     │  │
//!                        │         │ index + chain  │        │ session mailbox│  │
//!                        │         │   + cache      │        │   + worker     │  │
//!                        │         └────────────────┘        └───────┬────────┘  │
//!                        │                                           ▼           │
//!                        │                                  ┌────────────────┐   │
//!                        │                                  │ http::upstream │───┼──▶ Application
//!                        │                                  └────────────────┘   │
//!                        │  ┌─────────────────────────────────────────────────┐  │
//!                        │  │  config │ lifecycle │ observability              │  │
//!                        │  └─────────────────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use webfront::config::{load_config, FrontConfig};
use webfront::http::{FrontServer, UpstreamHandler};
use webfront::lifecycle::{build_context, signals, Shutdown};
use webfront::net::Listener;
use webfront::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "webfront")]
#[command(about = "Static-resource front server with per-session dispatch", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => FrontConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("webfront v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let handler = Arc::new(UpstreamHandler::new(&config.upstream)?);
    let listener_config = config.listener.clone();
    let shutdown = Shutdown::from_config(&config.dispatcher);

    // Scanning archives and directories is blocking work.
    let context = tokio::task::spawn_blocking(move || build_context(config, handler)).await??;
    let context = Arc::new(context);

    let listener = Listener::bind(&listener_config).await?;
    signals::spawn_signal_handler(&shutdown);

    let server = FrontServer::new(context);
    let report = server.run(listener, shutdown).await?;

    tracing::info!(
        mailboxes = report.mailboxes,
        forced = report.forced,
        "Shutdown complete"
    );
    Ok(())
}
