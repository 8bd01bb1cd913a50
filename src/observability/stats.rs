//! Process statistics.
//!
//! # Responsibilities
//! - Count completed requests by status class
//! - Periodically log pid, uptime, request counts and open connections
//!
//! # Design Decisions
//! - Counters are incremented once per request, at the same point the
//!   completion log line is written
//! - The reporter stops on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::net::ConnectionTracker;

/// Request counters since boot.
#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    requests: AtomicU64,
    /// 1xx through 5xx.
    by_class: [AtomicU64; 5],
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub requests: u64,
    pub informational: u64,
    pub success: u64,
    pub redirection: u64,
    pub client_error: u64,
    pub server_error: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            by_class: Default::default(),
        }
    }

    /// Count one completed request.
    pub fn record(&self, status: StatusCode) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let class = (status.as_u16() / 100).clamp(1, 5) as usize - 1;
        self.by_class[class].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let class = |i: usize| self.by_class[i].load(Ordering::Relaxed);
        StatsSnapshot {
            uptime: self.started.elapsed(),
            requests: self.requests.load(Ordering::Relaxed),
            informational: class(0),
            success: class(1),
            redirection: class(2),
            client_error: class(3),
            server_error: class(4),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a statistics line every `every` until shutdown.
pub fn spawn_reporter(
    stats: Arc<ServerStats>,
    tracker: ConnectionTracker,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pid = std::process::id();
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let snapshot = stats.snapshot();
                    tracing::info!(
                        pid,
                        uptime_secs = snapshot.uptime.as_secs(),
                        requests = snapshot.requests,
                        status_2xx = snapshot.success,
                        status_3xx = snapshot.redirection,
                        status_4xx = snapshot.client_error,
                        status_5xx = snapshot.server_error,
                        active_connections = tracker.active_count(),
                        "Server statistics"
                    );
                }
            }
        }
    })
}
