//! Timeout enforcement.
//!
//! # Responsibilities
//! - Derive every downstream and upstream deadline from configuration once, at boot
//! - Hand the listener and the forwarding client plain `Duration`s
//!
//! # Design Decisions
//! - Header read and body read share the configured read timeout
//! - Write timeout is the round trip timeout plus a fixed grace period, so an
//!   upstream timeout (504) is always produced before the write gives up
//! - Timed-out upstream round trips return 504 Gateway Timeout

use std::time::Duration;

use crate::config::{TimeoutConfig, UpstreamConfig};

/// Grace period added to the round trip timeout for the downstream write.
pub const WRITE_GRACE: Duration = Duration::from_secs(1);

/// Downstream connection timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// Time allowed to receive the request head.
    pub header_read: Duration,
    /// Time allowed to receive the request body.
    pub read: Duration,
    /// Time allowed for the upstream round trip.
    pub round_trip: Duration,
    /// Time a pending downstream write may stall before the connection is dropped.
    pub write: Duration,
    /// Time a keep-alive connection may sit without traffic.
    pub idle: Duration,
}

impl ServerTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        let read = Duration::from_secs(config.read_secs);
        let round_trip = Duration::from_secs(config.round_trip_secs);
        Self {
            header_read: read,
            read,
            round_trip,
            write: round_trip.saturating_add(WRITE_GRACE),
            idle: Duration::from_secs(config.idle_secs),
        }
    }
}

/// Upstream client timeouts and pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    pub connect: Duration,
    pub pool_idle: Duration,
    pub pool_max_idle_per_host: usize,
}

impl UpstreamTimeouts {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            pool_idle: Duration::from_secs(config.pool_idle_secs),
            pool_max_idle_per_host: config.pool_max_idle_per_host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_write_timeout_with_grace() {
        let timeouts = ServerTimeouts::from_config(&TimeoutConfig {
            read_secs: 5,
            round_trip_secs: 10,
            idle_secs: 30,
        });

        assert_eq!(timeouts.header_read, Duration::from_secs(5));
        assert_eq!(timeouts.read, Duration::from_secs(5));
        assert_eq!(timeouts.write, Duration::from_secs(11));
        assert_eq!(timeouts.idle, Duration::from_secs(30));
    }

    #[test]
    fn write_timeout_saturates() {
        let timeouts = ServerTimeouts::from_config(&TimeoutConfig {
            read_secs: 5,
            round_trip_secs: u64::MAX,
            idle_secs: 30,
        });

        assert_eq!(timeouts.round_trip, Duration::from_secs(u64::MAX));
        assert_eq!(timeouts.write, Duration::MAX);
    }
}
