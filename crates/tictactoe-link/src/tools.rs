//! MCP Tool Types
//!
//! Parameter and response types for every tool exposed by
//! [`crate::TicTacToeLinkServer`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tictactoe_link_core::{GameMode, SessionState};
use tictactoe_link_session::{FrameRecord, IgnoreReason};

/// Default wait for `game_wait_for_update`.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Upper bound for `game_wait_for_update`.
pub const MAX_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Default number of frames returned by `link_traffic`.
pub const DEFAULT_TRAFFIC_LIMIT: usize = 50;

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_traffic_limit() -> usize {
    DEFAULT_TRAFFIC_LIMIT
}

/// Session state plus a human-readable board.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StateView {
    /// Full session snapshot
    pub state: SessionState,

    /// Three-line board, empty cells shown by their index
    pub board_text: String,

    /// Outcome in words
    pub status: String,
}

impl From<SessionState> for StateView {
    fn from(state: SessionState) -> Self {
        let board_text = state.board.render();
        let status = if state.is_connected() {
            state.outcome.to_string()
        } else {
            format!("{:?}", state.link).to_lowercase()
        };
        Self {
            state,
            board_text,
            status,
        }
    }
}

// =============================================================================
// Link Tools
// =============================================================================

/// Parameters for link_list_ports
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListPortsParams {}

/// Response for link_list_ports
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListPortsResponse {
    /// Serial port names, sorted
    pub ports: Vec<String>,

    /// Number of ports found
    pub count: usize,

    /// Baud rates the device firmware may use
    pub supported_baud_rates: Vec<u32>,
}

/// Parameters for link_connect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectParams {
    /// Serial port name (e.g., "/dev/ttyACM0", "COM3")
    pub address: String,

    /// Baud rate. Defaults to the last one used, or the configured default.
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

/// Response for link_connect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectResponse {
    /// Baud rate the link was opened with
    pub baud_rate: u32,

    /// State after the implicit reset
    #[serde(flatten)]
    pub view: StateView,

    /// Success message
    pub message: String,
}

/// Parameters for link_disconnect
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DisconnectParams {}

/// Response for link_disconnect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DisconnectResponse {
    /// Whether a link was open before the call
    pub was_connected: bool,

    /// Success message
    pub message: String,
}

/// Parameters for link_traffic
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TrafficParams {
    /// Only frames with a sequence number at or above this one
    #[serde(default)]
    pub since: Option<u64>,

    /// Most recent frames to return
    #[serde(default = "default_traffic_limit")]
    pub limit: usize,
}

impl Default for TrafficParams {
    fn default() -> Self {
        Self {
            since: None,
            limit: DEFAULT_TRAFFIC_LIMIT,
        }
    }
}

/// Response for link_traffic
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TrafficResponse {
    /// Frames, oldest first
    pub frames: Vec<FrameRecord>,

    /// Sequence number to pass as `since` on the next call
    pub next_since: Option<u64>,
}

// =============================================================================
// Game Tools
// =============================================================================

/// Parameters for game_set_mode
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetModeParams {
    /// Game mode: "human-vs-human", "human-vs-ai" or "ai-vs-ai"
    pub mode: GameMode,
}

/// Parameters for game_move
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MoveParams {
    /// Cell index 0-8, row-major from the top-left corner
    pub position: u8,
}

/// Response for game_move
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MoveResponse {
    /// Position requested
    pub position: u8,

    /// Whether the move was written to the device
    pub sent: bool,

    /// Whether the device refused the move (`ERR:` reply)
    pub rejected: bool,

    /// Why the move was not sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<IgnoreReason>,

    /// State after the call
    #[serde(flatten)]
    pub view: StateView,

    /// Result message
    pub message: String,
}

/// Parameters for game_reset
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResetParams {}

/// Parameters for game_state
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StateParams {}

/// Response for game_set_mode, game_reset and game_state
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StateResponse {
    /// Current state
    #[serde(flatten)]
    pub view: StateView,

    /// Result message
    pub message: String,
}

/// Parameters for game_wait_for_update
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForUpdateParams {
    /// Timeout in milliseconds (capped at 60000)
    #[serde(default = "default_wait_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WaitForUpdateParams {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }
}

/// Response for game_wait_for_update
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForUpdateResponse {
    /// Whether the state changed before the timeout
    pub updated: bool,

    /// Device error reported while waiting, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time waited in milliseconds
    pub waited_ms: u64,

    /// Latest state
    #[serde(flatten)]
    pub view: StateView,
}
