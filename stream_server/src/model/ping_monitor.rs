//! Keep-alive tracker for subscribed viewers.
//!
//! A viewer is tracked from the moment it subscribes, keyed by the UDP address its
//! frames go to. Every `PING` from that address refreshes it:
//!
//! - `PingMonitor::track(addr)` — start tracking a new subscription.
//! - `PingMonitor::update_ping(addr)` — record a fresh ping; pings from addresses
//!   nobody subscribed are ignored.
//! - `PingMonitor::check_timeouts()` — return the viewers silent for longer than the
//!   timeout. Each is reported once and then forgotten.
//!
//! Time is measured with `std::time::Instant`, which is monotonic. The monitor is not
//! synchronized; share it behind a `Mutex`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Tracks viewer keep-alives and determines inactivity based on a timeout.
pub struct PingMonitor {
    /// Last time each tracked viewer was heard from.
    viewers: HashMap<SocketAddr, Instant>,
    /// Threshold after which a viewer is considered gone.
    timeout: Duration,
}

impl PingMonitor {
    /// Creates an empty monitor.
    pub fn new(timeout: Duration) -> Self {
        Self {
            viewers: HashMap::new(),
            timeout,
        }
    }

    /// Starts (or restarts) the timeout clock of `addr`.
    pub fn track(&mut self, addr: SocketAddr) {
        self.viewers.insert(addr, Instant::now());
    }

    /// Refreshes `addr`. Returns `false` if it is not tracked.
    pub fn update_ping(&mut self, addr: SocketAddr) -> bool {
        match self.viewers.get_mut(&addr) {
            Some(last_ping) => {
                *last_ping = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Stops tracking `addr`.
    pub fn forget(&mut self, addr: &SocketAddr) {
        self.viewers.remove(addr);
    }

    /// Removes and returns every viewer whose last ping is older than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<SocketAddr> {
        let now = Instant::now();
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.viewers.retain(|addr, last_ping| {
            if now.duration_since(*last_ping) > timeout {
                timed_out.push(*addr);
                false
            } else {
                true
            }
        });
        timed_out
    }

    /// Last ping of `addr`, if tracked.
    #[cfg(test)]
    pub fn last_ping(&self, addr: &SocketAddr) -> Option<Instant> {
        self.viewers.get(addr).copied()
    }
}
