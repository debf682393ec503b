//! Error types for the tic-tac-toe link client.

use thiserror::Error;

/// Main error type for link and session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input; never reaches the wire
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The link could not be opened (missing address, port claimed elsewhere, not connected)
    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),

    /// I/O failure during an open session
    #[error("Link broken: {0}")]
    LinkBroken(String),

    /// Unexpected or missing reply to a command that expects one
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Device-reported `ERR:` during normal play (non-fatal)
    #[error("Game error: {0}")]
    GameError(String),

    /// Operation abandoned because the session was disconnected underneath it
    #[error("Operation cancelled by disconnect")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error forces the session back to `Disconnected`.
    pub fn forces_disconnect(&self) -> bool {
        matches!(self, Error::LinkBroken(_) | Error::ProtocolError(_))
    }

    /// Whether this error is the caller's fault (bad input or wrong state).
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidParameter(_) | Error::LinkUnavailable(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
