//! Wire codec for the newline-delimited ASCII device protocol.
//!
//! Outbound frames are single lines terminated by `\n`:
//!
//! ```text
//! RESET        request board reset
//! MODE{1|2|3}  set game mode
//! MOVE{0-8}    place a mark
//! (empty)      keepalive probe
//! ```
//!
//! Inbound lines decode to a [`Reply`]. Decoding never fails: anything the
//! codec does not understand becomes [`Reply::Unrecognized`] so the caller can
//! log and drop it.

use serde::Serialize;

use crate::{Board, CellIndex, GameMode, GameOutcome, Player};

const BOARD_PREFIX: &str = "BOARD:";
const ERR_PREFIX: &str = "ERR:";
const ACK_RESET: &str = "OK:RESET";
const ACK_MODE_SET: &str = "OK:MODE_SET";

/// Outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reset the board
    Reset,
    /// Switch game mode
    SetMode(GameMode),
    /// Place a mark
    Move(CellIndex),
    /// Writability probe; no reply expected
    Keepalive,
}

impl Command {
    /// Encode to a complete frame, including the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            Command::Reset => "RESET\n".to_string(),
            Command::SetMode(mode) => format!("MODE{}\n", mode.code()),
            Command::Move(index) => format!("MOVE{}\n", index.get()),
            Command::Keepalive => "\n".to_string(),
        }
    }

    /// The acknowledgement this command waits for, if it is an ack-style command.
    pub fn expected_ack(&self) -> Option<Ack> {
        match self {
            Command::Reset => Some(Ack::Reset),
            Command::SetMode(_) => Some(Ack::ModeSet),
            Command::Move(_) | Command::Keepalive => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

/// Acknowledgement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Ack {
    /// `OK:RESET`
    Reset,
    /// `OK:MODE_SET`
    ModeSet,
}

/// Decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Reply {
    /// Command acknowledged
    Ack(Ack),
    /// Authoritative board and outcome
    BoardUpdate {
        /// New board
        board: Board,
        /// New outcome
        outcome: GameOutcome,
    },
    /// Device rejected the command
    Err(String),
    /// Anything else (kept for logging)
    Unrecognized(String),
}

impl Reply {
    /// Whether the line carried no meaning for the protocol.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Reply::Unrecognized(_))
    }
}

/// Decode one inbound line. Trailing line terminators are ignored.
pub fn decode(line: &str) -> Reply {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == ACK_RESET {
        return Reply::Ack(Ack::Reset);
    }
    if line == ACK_MODE_SET {
        return Reply::Ack(Ack::ModeSet);
    }
    if let Some(text) = line.strip_prefix(ERR_PREFIX) {
        return Reply::Err(text.to_string());
    }
    if line.starts_with(BOARD_PREFIX) {
        return decode_board(line).unwrap_or_else(|| Reply::Unrecognized(line.to_string()));
    }

    Reply::Unrecognized(line.to_string())
}

/// `BOARD:{9 cells}[:WIN:{1|2}|:DRAW|:CONTINUE]`
fn decode_board(line: &str) -> Option<Reply> {
    let fields: Vec<&str> = line.split(':').collect();
    let board = Board::from_wire(fields.get(1)?)?;

    // WIN is checked before DRAW when a line carries both tokens.
    let suffix = &line[BOARD_PREFIX.len() + fields[1].len()..];
    let outcome = if suffix.contains("WIN") {
        let winner = if fields.get(3) == Some(&"1") {
            Player::X
        } else {
            Player::O
        };
        GameOutcome::Win(winner)
    } else if suffix.contains("DRAW") {
        GameOutcome::Draw
    } else {
        GameOutcome::InProgress
    };

    Some(Reply::BoardUpdate { board, outcome })
}
