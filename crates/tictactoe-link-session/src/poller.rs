//! AI-vs-AI poller: reads unsolicited board updates on a fixed interval.

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::info;

use crate::ticker::{TickToken, Ticker};

/// Default poll interval.
pub const DEFAULT_AI_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ticker that drives the poll step while the device plays itself.
#[derive(Debug)]
pub struct AiPoller {
    ticker: Ticker,
    interval: Duration,
}

impl AiPoller {
    /// Create a stopped poller.
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: Ticker::new("ai-poll"),
            interval,
        }
    }

    /// Start polling. `poll` runs once per interval until stopped.
    pub fn start<F>(&self, poll: F)
    where
        F: FnMut(&TickToken) -> ControlFlow<()> + Send + 'static,
    {
        info!("AI polling started every {:?}", self.interval);
        self.ticker.start(self.interval, poll);
    }

    /// Stop polling.
    pub fn stop(&self) {
        if self.ticker.is_running() {
            info!("AI polling stopped");
        }
        self.ticker.stop();
    }

    /// Whether polling is active.
    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for AiPoller {
    fn default() -> Self {
        Self::new(DEFAULT_AI_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_poller_runs_and_stops() {
        let poller = AiPoller::new(Duration::from_millis(5));
        assert!(!poller.is_running());

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        poller.start(move |token| {
            if token.is_current() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            ControlFlow::Continue(())
        });
        std::thread::sleep(Duration::from_millis(60));
        poller.stop();

        assert!(!poller.is_running());
        assert!(polls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(AiPoller::default().interval(), Duration::from_millis(100));
    }
}
