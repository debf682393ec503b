//! tictactoe-link MCP server library
//!
//! This library contains the MCP protocol layer types and handlers.
//! The actual server binary is in main.rs.

pub mod protocol;
pub mod settings;
pub mod tools;

// Re-export commonly used types
pub use protocol::TicTacToeLinkServer;
pub use settings::write_back;
pub use tools::*;
