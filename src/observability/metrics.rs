//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define front server metrics (routing, dispatch, latency)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `webfront_route_total` (counter): routing decisions by `decision`
//! - `webfront_mailbox_rejected_total` (counter): submits rejected by a full mailbox
//! - `webfront_handler_failures_total` (counter): handler failures by `kind`
//! - `webfront_active_mailboxes` (gauge): live session mailboxes
//! - `webfront_request_duration_seconds` (histogram): latency by `path_kind`, `status`
//! - `webfront_index_entries` (gauge): aliases in the resource index
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording is a no-op until a recorder is installed

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_route(decision: &'static str) {
    counter!("webfront_route_total", "decision" => decision).increment(1);
}

pub fn record_mailbox_rejected() {
    counter!("webfront_mailbox_rejected_total").increment(1);
}

pub fn record_handler_failure(kind: &'static str) {
    counter!("webfront_handler_failures_total", "kind" => kind).increment(1);
}

pub fn set_active_mailboxes(count: usize) {
    gauge!("webfront_active_mailboxes").set(count as f64);
}

pub fn set_index_entries(count: usize) {
    gauge!("webfront_index_entries").set(count as f64);
}

pub fn record_request(path_kind: &'static str, status: u16, start: Instant) {
    histogram!(
        "webfront_request_duration_seconds",
        "path_kind" => path_kind,
        "status" => status.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
