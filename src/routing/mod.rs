//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request target (path + query)
//!     → router.rs (route lookup)
//!     → matcher.rs (anchored pattern test)
//!     → Return: matched Route or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[] + resources
//!     → Sort by path length (longest first), then lexicographically
//!     → Compile anchored matchers
//!     → Bind upstreams by label
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always yields the same order
//! - First match wins

pub mod matcher;
pub mod router;

pub use router::{
    ResourceKind, Route, RouteError, RouteTable, RouteUnmapped, Upstream, UpstreamBinding,
};
