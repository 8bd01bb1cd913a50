//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Build routes → Build TLS policy → Freeze Runtime
//!     → Bind listener → Release boot barrier (boot.rs) → Accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → Stop accepting → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then routes and TLS, then listener
//! - The runtime is immutable once built
//! - Shutdown has a deadline: stragglers are abandoned after it

pub mod boot;
pub mod runtime;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use boot::{barrier, BootRelease, BootWaiter};
pub use runtime::{InstanceId, Runtime, ServerIdentity};
pub use shutdown::Shutdown;
pub use startup::{prepare, serve};
