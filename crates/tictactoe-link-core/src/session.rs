//! Session types: link state, game mode and the aggregate session state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Board, Error, GameOutcome, Result};

/// Identifier for one connected session (connect to disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No link open
    #[default]
    Disconnected,
    /// Open + implicit reset in progress
    Connecting,
    /// Link open and reset acknowledged
    Connected,
}

/// Game mode, mirrored from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    /// Two humans share the board (wire code 1)
    #[default]
    #[serde(alias = "Man vs Man")]
    HumanVsHuman,
    /// Human against the device AI (wire code 2)
    #[serde(alias = "Man vs AI")]
    HumanVsAi,
    /// Autonomous exhibition, device plays both sides (wire code 3)
    #[serde(alias = "AI vs AI")]
    AiVsAi,
}

impl GameMode {
    /// All modes in wire-code order.
    pub const ALL: [GameMode; 3] = [GameMode::HumanVsHuman, GameMode::HumanVsAi, GameMode::AiVsAi];

    /// Wire code used in `MODE{n}`.
    pub fn code(self) -> u8 {
        match self {
            GameMode::HumanVsHuman => 1,
            GameMode::HumanVsAi => 2,
            GameMode::AiVsAi => 3,
        }
    }

    /// Mode for a wire code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(GameMode::HumanVsHuman),
            2 => Ok(GameMode::HumanVsAi),
            3 => Ok(GameMode::AiVsAi),
            other => Err(Error::InvalidParameter(format!(
                "game mode {other} is not one of 1, 2, 3"
            ))),
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            GameMode::HumanVsHuman => "Man vs Man",
            GameMode::HumanVsAi => "Man vs AI",
            GameMode::AiVsAi => "AI vs AI",
        }
    }

    /// Whether the device plays without human input.
    pub fn is_autonomous(self) -> bool {
        self == GameMode::AiVsAi
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate state rendered by the operator front end.
///
/// `SessionClient` is the only writer; everybody else works on snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionState {
    /// Link connection state
    pub link: LinkState,
    /// Last acknowledged (or configured) game mode
    pub mode: GameMode,
    /// Authoritative board
    pub board: Board,
    /// Authoritative outcome
    pub outcome: GameOutcome,
    /// False once the game reached a terminal outcome, until a reset
    pub active: bool,
    /// Current session, while connected
    pub session_id: Option<SessionId>,
    /// Address of the open link, while connected
    pub address: Option<String>,
    /// Whether the AI poller is running
    pub ai_polling: bool,
}

impl SessionState {
    /// Startup state: disconnected, empty board, given mode label.
    pub fn new(mode: GameMode) -> Self {
        Self {
            link: LinkState::Disconnected,
            mode,
            board: Board::new(),
            outcome: GameOutcome::InProgress,
            active: true,
            session_id: None,
            address: None,
            ai_polling: false,
        }
    }

    /// Whether the link is fully connected.
    pub fn is_connected(&self) -> bool {
        self.link == LinkState::Connected
    }

    /// Clear the board for a new game.
    pub fn reset_game(&mut self) {
        self.board = Board::new();
        self.outcome = GameOutcome::InProgress;
        self.active = true;
    }

    /// Overwrite board and outcome with an authoritative update.
    ///
    /// A terminal outcome deactivates the game and stops polling.
    pub fn apply_board(&mut self, board: Board, outcome: GameOutcome) {
        self.board = board;
        self.outcome = outcome;
        if outcome.is_terminal() {
            self.active = false;
            self.ai_polling = false;
        }
    }

    /// Back to the disconnected default, keeping the mode label.
    pub fn reset_to_disconnected(&mut self) {
        *self = Self::new(self.mode);
    }

    /// Check the state invariants, returning a description of the first violation.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.outcome.is_terminal() && self.active {
            return Err(format!("outcome {} but game still active", self.outcome));
        }
        if self.ai_polling
            && (!self.is_connected() || !self.mode.is_autonomous() || !self.active)
        {
            return Err("AI polling outside a connected, active AI vs AI game".to_string());
        }
        if self.link == LinkState::Disconnected && self.session_id.is_some() {
            return Err("session id present while disconnected".to_string());
        }
        Ok(())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(GameMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Player;

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new();
        assert_eq!(format!("{id}").len(), 36);
    }

    #[test]
    fn test_game_mode_codes() {
        for mode in GameMode::ALL {
            assert_eq!(GameMode::from_code(mode.code()).unwrap(), mode);
        }
        assert!(matches!(
            GameMode::from_code(4),
            Err(Error::InvalidParameter(_))
        ));
        assert!(GameMode::from_code(0).is_err());
    }

    #[test]
    fn test_game_mode_serde_accepts_labels() {
        let mode: GameMode = serde_json::from_str(r#""ai-vs-ai""#).unwrap();
        assert_eq!(mode, GameMode::AiVsAi);
        let mode: GameMode = serde_json::from_str(r#""Man vs AI""#).unwrap();
        assert_eq!(mode, GameMode::HumanVsAi);
        assert_eq!(
            serde_json::to_string(&GameMode::HumanVsHuman).unwrap(),
            r#""human-vs-human""#
        );
    }

    #[test]
    fn test_new_state_defaults() {
        let state = SessionState::new(GameMode::HumanVsAi);
        assert_eq!(state.link, LinkState::Disconnected);
        assert_eq!(state.mode, GameMode::HumanVsAi);
        assert!(state.board.is_empty());
        assert_eq!(state.outcome, GameOutcome::InProgress);
        assert!(state.active);
        assert!(!state.ai_polling);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_apply_terminal_board_deactivates() {
        let mut state = SessionState::new(GameMode::AiVsAi);
        state.link = LinkState::Connected;
        state.session_id = Some(SessionId::new());
        state.ai_polling = true;

        let board = Board::from_wire("111220000").unwrap();
        state.apply_board(board, GameOutcome::Win(Player::X));

        assert!(!state.active);
        assert!(!state.ai_polling);
        assert_eq!(state.board, board);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_reset_to_disconnected_keeps_mode() {
        let mut state = SessionState::new(GameMode::AiVsAi);
        state.link = LinkState::Connected;
        state.address = Some("PORT1".to_string());
        state.board = Board::from_wire("120000000").unwrap();

        state.reset_to_disconnected();

        assert_eq!(state.link, LinkState::Disconnected);
        assert_eq!(state.mode, GameMode::AiVsAi);
        assert!(state.board.is_empty());
        assert!(state.address.is_none());
    }

    #[test]
    fn test_invariant_violation_detected() {
        let mut state = SessionState::default();
        state.outcome = GameOutcome::Draw;
        assert!(state.check_invariants().is_err());

        let mut state = SessionState::new(GameMode::AiVsAi);
        state.ai_polling = true;
        assert!(state.check_invariants().is_err());
    }
}
