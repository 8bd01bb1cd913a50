//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → tls.rs (optional TLS handshake, policy from boot)
//!     → connection.rs (lifecycle tracking, idle and write deadlines)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is optional; the runtime decides once at boot

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{Activity, ConnectionTracker, TimedIo};
pub use listener::{Listener, ListenerError};
pub use tls::{CertificateExpiry, TlsError, TlsPolicy};
