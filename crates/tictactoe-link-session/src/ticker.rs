//! Generation-checked periodic ticker on a dedicated thread.
//!
//! Every `start` and `stop` bumps the generation. A tick closure receives a
//! [`TickToken`] and must check [`TickToken::is_current`] after acquiring
//! whatever lock the stopper holds; a stale token means the ticker was stopped
//! (or restarted) and the tick must leave state alone.

use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Schedule {
    generation: u64,
    running: bool,
}

#[derive(Debug, Default)]
struct Control {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

impl Control {
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of which ticker run a tick belongs to.
#[derive(Debug, Clone)]
pub struct TickToken {
    control: Arc<Control>,
    generation: u64,
}

impl TickToken {
    /// Whether the run this tick belongs to is still the active one.
    pub fn is_current(&self) -> bool {
        let schedule = self.control.lock();
        schedule.running && schedule.generation == self.generation
    }
}

/// Fixed-interval ticker.
#[derive(Debug)]
pub struct Ticker {
    name: &'static str,
    control: Arc<Control>,
}

impl Ticker {
    /// Create a stopped ticker.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            control: Arc::new(Control::default()),
        }
    }

    /// Start (or restart) ticking every `interval`.
    ///
    /// Any previous run is invalidated. The closure returns
    /// `ControlFlow::Break(())` to end its own run.
    pub fn start<F>(&self, interval: Duration, mut tick: F)
    where
        F: FnMut(&TickToken) -> ControlFlow<()> + Send + 'static,
    {
        let generation = {
            let mut schedule = self.control.lock();
            schedule.generation += 1;
            schedule.running = true;
            schedule.generation
        };
        self.control.wake.notify_all();

        let token = TickToken {
            control: Arc::clone(&self.control),
            generation,
        };
        let name = self.name;
        debug!("{} ticker started (generation {})", name, generation);

        let spawned = thread::Builder::new()
            .name(format!("{name}-ticker"))
            .spawn(move || {
                while wait_for_tick(&token, interval) {
                    if tick(&token).is_break() {
                        let mut schedule = token.control.lock();
                        if schedule.generation == token.generation {
                            schedule.running = false;
                        }
                        break;
                    }
                }
                debug!("{} ticker exited (generation {})", name, token.generation);
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn {} ticker thread: {}", name, e);
            let mut schedule = self.control.lock();
            if schedule.generation == generation {
                schedule.running = false;
            }
        }
    }

    /// Stop ticking. Returns immediately; a tick in progress finishes on its own.
    pub fn stop(&self) {
        let mut schedule = self.control.lock();
        if schedule.running {
            debug!("{} ticker stopped (generation {})", self.name, schedule.generation);
        }
        schedule.generation += 1;
        schedule.running = false;
        drop(schedule);
        self.control.wake.notify_all();
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.control.lock().running
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep one interval. Returns false as soon as the run is no longer current.
fn wait_for_tick(token: &TickToken, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    let mut schedule = token.control.lock();
    loop {
        if !schedule.running || schedule.generation != token.generation {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        schedule = token
            .control
            .wake
            .wait_timeout(schedule, deadline - now)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ticker_ticks_until_stopped() {
        let ticker = Ticker::new("test");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        ticker.start(Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        assert!(ticker.is_running());

        thread::sleep(Duration::from_millis(100));
        ticker.stop();
        assert!(!ticker.is_running());

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(50));
        // At most one tick that was already past its wait may still land
        assert!(count.load(Ordering::SeqCst) <= after_stop + 1);
    }

    #[test]
    fn test_restart_invalidates_old_token() {
        let ticker = Ticker::new("test");
        let tokens = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&tokens);
        ticker.start(Duration::from_millis(5), move |token| {
            sink.lock().unwrap().push(token.clone());
            ControlFlow::Break(())
        });
        thread::sleep(Duration::from_millis(50));
        ticker.start(Duration::from_secs(60), |_| ControlFlow::Continue(()));

        let tokens = tokens.lock().unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(!tokens[0].is_current());
        assert!(ticker.is_running());
    }

    #[test]
    fn test_break_ends_run() {
        let ticker = Ticker::new("test");
        ticker.start(Duration::from_millis(5), |_| ControlFlow::Break(()));
        thread::sleep(Duration::from_millis(60));
        assert!(!ticker.is_running());
    }

    #[test]
    fn test_stop_wakes_long_interval() {
        let ticker = Ticker::new("test");
        let ticked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticked);
        ticker.start(Duration::from_secs(3600), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        ticker.stop();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticked.load(Ordering::SeqCst), 0);
    }
}
