//! # tictactoe-link-core
//!
//! Core types for the tic-tac-toe serial link client.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other tictactoe-link crates. It provides:
//!
//! - Board types (CellState, Board, CellIndex, GameOutcome)
//! - Session types (SessionId, LinkState, GameMode, SessionState)
//! - The wire codec (Command, Reply, encode/decode)
//! - Settings store types
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other tictactoe-link crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use board::{Board, CellIndex, CellState, GameOutcome, Player, BOARD_CELLS};
pub use codec::{decode, Ack, Command, Reply};
pub use config::{
    ClientConfig, GameSettings, SerialSettings, ServerSettings, TimingSettings,
    validate_baud_rate, SUPPORTED_BAUD_RATES,
};
pub use error::{Error, Result};
pub use session::{GameMode, LinkState, SessionId, SessionState};
