//! Session event surface: observer callbacks plus a broadcast channel.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use tictactoe_link_core::SessionState;

/// Broadcast channel depth; slow subscribers see `Lagged` past this.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something observers should react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new state snapshot was published
    StateChanged {
        /// The published snapshot
        state: SessionState,
    },
    /// A device or link error the operator should see
    Error {
        /// Human-readable message
        message: String,
    },
}

/// Callback interface for front ends.
///
/// Callbacks run after the link lock is released, on whichever thread
/// completed the operation, so they may call back into the client.
pub trait SessionObserver: Send + Sync {
    /// Called with every published state.
    fn on_state_changed(&self, _state: &SessionState) {}

    /// Called with every surfaced error.
    fn on_error(&self, _message: &str) {}
}

/// Fans events out to observers and broadcast subscribers.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
}

impl std::fmt::Debug for dyn SessionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionObserver")
    }
}

impl EventBus {
    /// Create a bus with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Register an observer.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Deliver events in order.
    pub fn dispatch(&self, events: Vec<SessionEvent>) {
        if events.is_empty() {
            return;
        }
        let observers: Vec<Arc<dyn SessionObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            for observer in &observers {
                match &event {
                    SessionEvent::StateChanged { state } => observer.on_state_changed(state),
                    SessionEvent::Error { message } => observer.on_error(message),
                }
            }
            // No subscribers is fine
            if self.sender.send(event).is_err() {
                debug!("Session event dropped: no subscribers");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<usize>,
        errors: Mutex<Vec<String>>,
    }

    impl SessionObserver for Recorder {
        fn on_state_changed(&self, _state: &SessionState) {
            *self.states.lock().unwrap() += 1;
        }

        fn on_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_dispatch_reaches_observers_and_subscribers() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());
        bus.add_observer(recorder.clone());
        let mut rx = bus.subscribe();

        bus.dispatch(vec![
            SessionEvent::StateChanged {
                state: SessionState::default(),
            },
            SessionEvent::Error {
                message: "Cell occupied".to_string(),
            },
        ]);

        assert_eq!(*recorder.states.lock().unwrap(), 1);
        assert_eq!(*recorder.errors.lock().unwrap(), vec!["Cell occupied"]);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::StateChanged { .. }
        ));
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::Error { .. }));
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let bus = EventBus::default();
        bus.dispatch(vec![SessionEvent::Error {
            message: "x".to_string(),
        }]);
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "boom");
    }
}
