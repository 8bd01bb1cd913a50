//! Portcullis: a TLS-terminating HTTP reverse proxy.
//!
//! Requests are matched against an ordered route table, forwarded to the
//! bound upstream or answered locally, and every response carries the same
//! security headers and request ID.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{DispatchError, StartupError};
pub use http::HttpServer;
pub use lifecycle::{Runtime, Shutdown};
