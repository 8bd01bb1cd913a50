//! The built-in about document.
//!
//! Served for routes bound to the `about` resource. Reports identity and the
//! live TLS certificate state, so it doubles as a liveness check.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::http::context::ProxyContext;
use crate::http::response::{default_message, send_json};
use crate::lifecycle::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct About {
    pub name: String,
    pub version: String,
    #[serde(rename = "serverID")]
    pub server_id: String,
    pub tls: TlsStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsStatus {
    /// Whether the listener terminates TLS.
    pub mode: bool,
    /// Certificate state: valid, expiring or expired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    /// Leaf certificate notAfter, in seconds since the Unix epoch.
    #[serde(rename = "notAfter", skip_serializing_if = "Option::is_none")]
    pub not_after: Option<u64>,
}

impl About {
    pub fn describe(runtime: &Runtime, now: SystemTime) -> Self {
        let identity = runtime.identity();
        let tls = match runtime.tls() {
            Some(policy) => TlsStatus {
                mode: true,
                expiry: Some(policy.leaf().expiry(now).as_str().to_string()),
                not_after: policy
                    .leaf()
                    .not_after
                    .duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_secs()),
            },
            None => TlsStatus {
                mode: false,
                expiry: None,
                not_after: None,
            },
        };

        Self {
            name: identity.name.to_string(),
            version: identity.version.to_string(),
            server_id: identity.instance_id.to_string(),
            tls,
        }
    }
}

pub fn send_about(runtime: &Runtime, ctx: &mut ProxyContext) -> Response {
    ctx.respond_with(StatusCode::OK, default_message(StatusCode::OK));
    send_json(runtime, ctx, &About::describe(runtime, SystemTime::now()))
}
