//! Boot synchronization barrier.
//!
//! # Responsibilities
//! - Tell waiters (binary, tests, orchestration) when the proxy is ready
//! - Hand waiters the bound listener address
//!
//! # Design Decisions
//! - Released immediately before the accept loop starts, after the socket is bound
//! - `BootRelease::release` consumes the handle, so a second release does not compile
//! - Dropping the release handle without releasing (boot failed) wakes waiters with `None`

use std::net::SocketAddr;

use tokio::sync::watch;

/// Create a boot barrier.
pub fn barrier() -> (BootRelease, BootWaiter) {
    let (tx, rx) = watch::channel(None);
    (BootRelease { tx }, BootWaiter { rx })
}

/// The single-use release side of the barrier.
#[derive(Debug)]
pub struct BootRelease {
    tx: watch::Sender<Option<SocketAddr>>,
}

impl BootRelease {
    /// Signal that the listener at `addr` is bound and about to serve.
    pub fn release(self, addr: SocketAddr) {
        tracing::debug!(address = %addr, "Boot complete");
        self.tx.send_replace(Some(addr));
    }
}

/// The waiting side of the barrier. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BootWaiter {
    rx: watch::Receiver<Option<SocketAddr>>,
}

impl BootWaiter {
    /// Wait for the barrier. Returns the bound address, or `None` if boot
    /// failed before the barrier was released.
    pub async fn wait(&mut self) -> Option<SocketAddr> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(addr) => *addr,
            Err(_) => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
