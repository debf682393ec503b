//! # tictactoe-link-session
//!
//! Session layer for the tic-tac-toe link client.
//!
//! This crate provides:
//! - [`SessionClient`], the connection and game state machine
//! - The AI-vs-AI poller and the keepalive monitor
//! - Observer callbacks and a broadcast channel of [`SessionEvent`]s
//! - A bounded log of raw frames for diagnostics
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on tictactoe-link-core
//! and tictactoe-link-transport, and is driven by the front end.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod events;
pub mod liveness;
pub mod poller;
pub mod ticker;
pub mod traffic;

// Re-export commonly used types
pub use client::{IgnoreReason, MoveResult, SessionClient, SessionClientConfig};
pub use events::{EventBus, SessionEvent, SessionObserver};
pub use liveness::KeepaliveMonitor;
pub use poller::AiPoller;
pub use ticker::{TickToken, Ticker};
pub use traffic::{Direction, FrameRecord, TrafficLog};
