//! Error types shared across subsystems.

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::http::upstream::UpstreamError;
use crate::net::{ListenerError, TlsError};
use crate::routing::{RouteError, RouteUnmapped};

/// Fatal errors raised while turning configuration into a serving proxy.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("route table error: {0}")]
    Routes(#[from] RouteError),

    #[error("failed to read TLS material: {0}")]
    TlsMaterial(#[source] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("listen failure: {0}")]
    Listen(#[from] ListenerError),
}

/// Why a request could not be answered by its route.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches '{0}'")]
    NoRouteMatch(String),

    #[error(transparent)]
    RouteUnmapped(#[from] RouteUnmapped),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl DispatchError {
    /// Downstream status reported for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoRouteMatch(_) => StatusCode::NOT_FOUND,
            DispatchError::RouteUnmapped(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Upstream(e) => e.status(),
        }
    }
}
