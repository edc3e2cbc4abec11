//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities > 0, addresses parse)
//! - Check path shapes the router relies on
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FrontConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::FrontConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for values the runtime cannot work with.
pub fn validate_config(config: &FrontConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    let resources = &config.resources;
    if resources.resource_root.trim_matches('/').is_empty() {
        errors.push(ValidationError::new("resources.resource_root", "must not be empty"));
    }
    if resources.alias_marker.is_empty() || resources.alias_marker.contains('/') {
        errors.push(ValidationError::new(
            "resources.alias_marker",
            "must be a single non-empty segment",
        ));
    }
    for prefix in &resources.static_prefixes {
        if !prefix.starts_with('/') || prefix.len() < 2 {
            errors.push(ValidationError::new(
                "resources.static_prefixes",
                format!("'{}' must start with '/' and name a segment", prefix),
            ));
        }
    }
    if resources.dynamic_subpath.is_empty() || resources.dynamic_subpath.contains('/') {
        errors.push(ValidationError::new(
            "resources.dynamic_subpath",
            "must be a single non-empty segment",
        ));
    }

    let dispatcher = &config.dispatcher;
    if dispatcher.mailbox_capacity == 0 {
        errors.push(ValidationError::new("dispatcher.mailbox_capacity", "must be > 0"));
    }
    if dispatcher.max_concurrent_handlers == 0 {
        errors.push(ValidationError::new(
            "dispatcher.max_concurrent_handlers",
            "must be > 0",
        ));
    }
    if dispatcher.session_cookie.is_empty() {
        errors.push(ValidationError::new("dispatcher.session_cookie", "must not be empty"));
    }

    if config.upstream.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "upstream.address",
            format!("'{}' is not a socket address", config.upstream.address),
        ));
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be > 0 when enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&FrontConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = FrontConfig::default();
        config.dispatcher.mailbox_capacity = 0;
        config.resources.static_prefixes = vec!["VAADIN".to_string()];
        config.resources.dynamic_subpath = "a/b".to_string();
        config.upstream.address = "not-an-address".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "resources.static_prefixes",
                "resources.dynamic_subpath",
                "dispatcher.mailbox_capacity",
                "upstream.address",
            ]
        );
    }
}
