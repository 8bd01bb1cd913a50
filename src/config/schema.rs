//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Reserved resource name that binds a route to the built-in about document.
pub const ABOUT_RESOURCE: &str = "about";

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Server identity settings.
    pub server: ServerConfig,

    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Downstream timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Upstream connection pool settings.
    pub upstream: UpstreamConfig,

    /// Route definitions mapping request targets to resources.
    pub routes: Vec<RouteConfig>,

    /// Named resources, each a list of upstream targets.
    pub resources: BTreeMap<String, Vec<ResourceMapping>>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server identity.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Fixed instance identifier. Generated at boot when absent.
    pub instance_id: Option<String>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Certificate chain (PEM), leaf first.
    pub cert: PemSource,

    /// Private key (PEM).
    pub key: PemSource,
}

/// PEM material, either inline or read from a file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PemSource {
    Inline(String),
    File { path: PathBuf },
}

impl PemSource {
    /// Read the PEM text.
    pub fn load(&self) -> std::io::Result<String> {
        match self {
            PemSource::Inline(pem) => Ok(pem.clone()),
            PemSource::File { path } => std::fs::read_to_string(path),
        }
    }
}

/// Downstream timeouts, all in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to read request headers and body.
    pub read_secs: u64,

    /// Time allowed for the upstream round trip.
    pub round_trip_secs: u64,

    /// Idle keep-alive connection timeout.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 120,
            round_trip_secs: 240,
            idle_secs: 120,
        }
    }
}

/// Upstream HTTP client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// How long idle pooled connections are kept, in seconds.
    pub pool_idle_secs: u64,

    /// Maximum idle connections kept per upstream host.
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_secs: 3,
            pool_idle_secs: 120,
            pool_max_idle_per_host: 32,
        }
    }
}

/// Route configuration mapping a path pattern to a resource.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path pattern, matched as an anchored regex prefix of the request target.
    pub path: String,

    /// Resource name; `about` selects the built-in about document.
    pub resource: String,

    /// Optional label selecting one upstream of the resource.
    #[serde(default)]
    pub label: Option<String>,
}

/// One upstream target of a named resource.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResourceMapping {
    /// Upstream base URL, e.g. "http://10.0.0.4:8081".
    pub url: String,

    /// Labels a route can select this upstream by.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Interval of the process statistics log, in seconds. 0 disables it.
    pub stats_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            stats_interval_secs: 60,
        }
    }
}
