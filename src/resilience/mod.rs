//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Boot:
//!     TimeoutConfig / UpstreamConfig
//!     → timeouts.rs (derive deadlines once)
//!     → listener (header read, body read, write stall, idle)
//!     → upstream client (connect, round trip)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Deadlines are computed once, never per request

pub mod timeouts;

pub use timeouts::{ServerTimeouts, UpstreamTimeouts};
