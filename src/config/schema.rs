//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the front server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the front server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Static resource discovery and routing.
    pub resources: ResourceConfig,

    /// Fronting byte cache for static resources.
    pub cache: CacheConfig,

    /// Per-session dispatch settings.
    pub dispatcher: DispatcherConfig,

    /// Application server that handles the slow path.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Where static resources come from and which request paths may be served directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Zip archives to scan, in priority order.
    pub archives: Vec<String>,

    /// Directories to scan, in priority order.
    pub loose_roots: Vec<String>,

    /// Directory inside each archive that holds web resources.
    pub resource_root: String,

    /// Segment some callers prepend when re-requesting a resource.
    pub alias_marker: String,

    /// Request prefixes served without the application handler.
    pub static_prefixes: Vec<String>,

    /// Segment under a static prefix reserved for generated content.
    pub dynamic_subpath: String,

    /// Index documents tried when a loose-file directory is requested.
    pub welcome_files: Vec<String>,

    /// Resources that must be indexed for startup to succeed.
    pub required_resources: Vec<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            archives: Vec::new(),
            loose_roots: Vec::new(),
            resource_root: "META-INF/resources".to_string(),
            alias_marker: "META-INF".to_string(),
            static_prefixes: vec![
                "/VAADIN".to_string(),
                "/icons".to_string(),
                "/images".to_string(),
            ],
            dynamic_subpath: "dynamic".to_string(),
            welcome_files: vec!["index.html".to_string(), "index.htm".to_string()],
            required_resources: Vec::new(),
        }
    }
}

/// Byte cache in front of the resource manager chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the fronting cache.
    pub enabled: bool,

    /// Maximum number of cached resources.
    pub max_entries: usize,

    /// Largest resource (in bytes) that is cached.
    pub max_file_bytes: u64,

    /// How long a cached resource stays valid, in seconds.
    pub max_age_secs: u64,

    /// If set, tells clients to cache static responses for this many seconds.
    pub client_max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            max_file_bytes: 10 * 1024 * 1024,
            max_age_secs: 3600,
            client_max_age_secs: None,
        }
    }
}

/// What `submit` does when a session mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Wait until the worker frees a slot.
    Block,
    /// Fail immediately with `MailboxFull`.
    Reject,
}

/// Session dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Queued requests per session before backpressure applies.
    pub mailbox_capacity: usize,

    /// Handler invocations allowed to run at once across all sessions.
    pub max_concurrent_handlers: usize,

    /// Behaviour when a mailbox is full.
    pub backpressure: BackpressurePolicy,

    /// Time given to mailboxes to drain on shutdown, in seconds.
    pub shutdown_deadline_secs: u64,

    /// Cookie carrying the session identifier.
    pub session_cookie: String,

    /// Seconds a mailbox may sit empty before it is released. 0 keeps mailboxes
    /// until their session is destroyed.
    pub idle_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            max_concurrent_handlers: 256,
            backpressure: BackpressurePolicy::Block,
            shutdown_deadline_secs: 10,
            session_cookie: "JSESSIONID".to_string(),
            idle_timeout_secs: 1800,
        }
    }
}

/// Upstream application server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Address of the application (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Time allowed for one application response, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
