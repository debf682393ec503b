//! # tictactoe-link-transport
//!
//! Line-oriented link transports for the tic-tac-toe link client.
//!
//! This crate provides:
//! - The [`LinkTransport`] and [`LinkConnector`] traits the session layer drives
//! - A serial port implementation backed by the `serialport` crate
//! - An in-memory scripted device for tests ([`testing`])
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on tictactoe-link-core
//! and knows nothing about sessions or game rules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod serial;
pub mod testing;
pub mod transport;

// Re-export commonly used types
pub use serial::{SerialConnector, SerialLink};
pub use transport::{LineRead, LinkConnector, LinkTransport, MAX_LINE_BYTES};
