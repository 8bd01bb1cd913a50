//! The frozen runtime every serving component reads from.
//!
//! Built once by `lifecycle::startup::prepare`, then shared behind an `Arc`.
//! Nothing mutates it after boot, so request handling reads it without locks.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::net::tls::TlsPolicy;
use crate::resilience::{ServerTimeouts, UpstreamTimeouts};
use crate::routing::RouteTable;

/// Product name reported in the `Server` header and the about document.
pub const SERVER_NAME: &str = "Portcullis";

/// Server version reported in the `Server` header and the about document.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier of this proxy instance. Restricted to `[A-Za-z0-9._-]` so it
/// can be embedded in header values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceId(String);

impl InstanceId {
    /// Use the configured id, or generate one when absent or unusable.
    pub fn new(configured: Option<&str>) -> Self {
        let cleaned: String = configured
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();
        if cleaned.is_empty() {
            Self::generate()
        } else {
            Self(cleaned)
        }
    }

    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name, version and instance of this server.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: &'static str,
    pub version: &'static str,
    pub instance_id: InstanceId,
}

impl ServerIdentity {
    pub fn new(instance_id: InstanceId) -> Self {
        Self {
            name: SERVER_NAME,
            version: VERSION,
            instance_id,
        }
    }

    /// Value of the `Server` response header.
    pub fn server_header(&self) -> String {
        format!("{} {} {}", self.name, self.version, self.instance_id)
    }
}

/// Listener address and connection limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    pub bind_address: SocketAddr,
    pub max_connections: usize,
}

/// Immutable runtime state shared by the listener, dispatcher and response writer.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub(crate) identity: ServerIdentity,
    pub(crate) listener: ListenerSettings,
    pub(crate) routes: RouteTable,
    pub(crate) tls: Option<TlsPolicy>,
    pub(crate) timeouts: ServerTimeouts,
    pub(crate) upstream: UpstreamTimeouts,
    pub(crate) observability: ObservabilityConfig,
}

impl Runtime {
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn listener(&self) -> &ListenerSettings {
        &self.listener
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The TLS policy, present exactly when the runtime is in TLS mode.
    pub fn tls(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref()
    }

    /// Whether the downstream listener terminates TLS.
    ///
    /// The listener and the response header writer both consult this; nothing
    /// else decides whether a connection is encrypted.
    pub fn is_tls_mode(&self) -> bool {
        self.tls.is_some()
    }

    pub fn timeouts(&self) -> &ServerTimeouts {
        &self.timeouts
    }

    pub fn upstream(&self) -> &UpstreamTimeouts {
        &self.upstream
    }

    pub fn observability(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// Copy of the runtime bound to a different address, used by tests to
    /// listen on an ephemeral port.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.listener.bind_address = addr;
        self
    }
}
