//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request to upstream:
//!     → headers.rs (strip hop-by-hop, set X-Forwarded-*)
//!
//! Every response to the client:
//!     → headers.rs (Server, cache, HSTS in TLS mode, XSS/nosniff/frame, request ID)
//! ```
//!
//! # Design Decisions
//! - No trust in client input: request IDs and forwarding headers are replaced
//! - TLS mode is read from the runtime, never inferred from the request

pub mod headers;
