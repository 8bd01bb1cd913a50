//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate route paths
//! - Check upstream URLs are usable by the forwarding client
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - A route naming an unknown resource is NOT an error here: it becomes an
//!   unmapped route that answers 503 at request time

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Uri;

use crate::config::schema::ProxyConfig;

/// Largest accepted timeout, one day.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    for (field, value) in [
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.round_trip_secs", config.timeouts.round_trip_secs),
        ("timeouts.idle_secs", config.timeouts.idle_secs),
        ("upstream.connect_secs", config.upstream.connect_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        } else if value > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must be at most {} seconds", MAX_TIMEOUT_SECS),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.path.is_empty() {
            errors.push(ValidationError::new(format!("routes[{}].path", i), "must not be empty"));
        } else if !seen.insert(route.path.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{}].path", i),
                format!("duplicate route path '{}'", route.path),
            ));
        }
        if route.resource.is_empty() {
            errors.push(ValidationError::new(format!("routes[{}].resource", i), "must not be empty"));
        }
    }

    for (name, mappings) in &config.resources {
        for (i, mapping) in mappings.iter().enumerate() {
            let field = format!("resources.{}[{}].url", name, i);
            match mapping.url.parse::<Uri>() {
                Ok(uri) if uri.scheme_str() == Some("http") && uri.host().is_some() => {}
                Ok(_) => errors.push(ValidationError::new(field, "must be an absolute http:// URL")),
                Err(e) => errors.push(ValidationError::new(field, e.to_string())),
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
