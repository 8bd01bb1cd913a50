//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loop, protocol detection, deadlines)
//!     → dispatch.rs (request ID, route match, outcome)
//!         → about.rs (built-in document)
//!         → upstream.rs (forward to the bound upstream)
//!     → response.rs (JSON status documents, gzip)
//!     → Send to client
//! ```

pub mod about;
pub mod context;
pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use context::ProxyContext;
pub use dispatch::{dispatch, AppState};
pub use request::{decorate_request, RequestId, X_REQUEST_ID};
pub use response::StatusBody;
pub use server::HttpServer;
pub use upstream::{Forwarder, HyperForwarder, UpstreamError};
