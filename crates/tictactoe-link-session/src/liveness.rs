//! Keepalive monitor: probes the link while connected so a vanished device
//! is noticed between user actions.

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::debug;

use crate::ticker::{TickToken, Ticker};

/// Default probe period.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(1000);

/// Ticker that drives the keepalive probe.
#[derive(Debug)]
pub struct KeepaliveMonitor {
    ticker: Ticker,
    interval: Duration,
}

impl KeepaliveMonitor {
    /// Create a stopped monitor.
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: Ticker::new("keepalive"),
            interval,
        }
    }

    /// Start probing.
    pub fn start<F>(&self, probe: F)
    where
        F: FnMut(&TickToken) -> ControlFlow<()> + Send + 'static,
    {
        debug!("Keepalive started every {:?}", self.interval);
        self.ticker.start(self.interval, probe);
    }

    /// Stop probing.
    pub fn stop(&self) {
        self.ticker.stop();
    }

    /// Whether probing is active.
    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Probe period.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for KeepaliveMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE_INTERVAL)
    }
}
