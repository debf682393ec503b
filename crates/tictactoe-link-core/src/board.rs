//! Board types mirroring the device's authoritative game state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of cells on a board.
pub const BOARD_CELLS: usize = 9;

/// A player mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Player {
    /// Player X (wire code `1`)
    X,
    /// Player O (wire code `2`)
    O,
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::X => write!(f, "X"),
            Player::O => write!(f, "O"),
        }
    }
}

/// State of a single board cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    /// No mark
    #[default]
    Empty,
    /// Marked by X
    X,
    /// Marked by O
    O,
}

impl CellState {
    /// Classify one wire character: `0` is empty, `1` is X, anything else is O.
    pub fn from_wire(c: char) -> Self {
        match c {
            '0' => CellState::Empty,
            '1' => CellState::X,
            _ => CellState::O,
        }
    }

    /// Canonical wire character for this cell.
    pub fn to_wire(self) -> char {
        match self {
            CellState::Empty => '0',
            CellState::X => '1',
            CellState::O => '2',
        }
    }

    /// Display symbol (`' '`, `'X'` or `'O'`).
    pub fn symbol(self) -> char {
        match self {
            CellState::Empty => ' ',
            CellState::X => 'X',
            CellState::O => 'O',
        }
    }
}

/// Validated cell position, `0..=8`, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct CellIndex(u8);

impl CellIndex {
    /// Create a cell index, rejecting anything outside the board.
    pub fn new(pos: u8) -> Result<Self> {
        if usize::from(pos) < BOARD_CELLS {
            Ok(Self(pos))
        } else {
            Err(Error::InvalidParameter(format!(
                "cell position {pos} out of range 0-8"
            )))
        }
    }

    /// Raw position.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CellIndex {
    type Error = Error;

    fn try_from(pos: u8) -> Result<Self> {
        Self::new(pos)
    }
}

impl std::fmt::Display for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 3x3 board in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub struct Board {
    /// Cells, index 0-8
    cells: [CellState; BOARD_CELLS],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the 9-character wire segment. Returns `None` unless it is exactly 9 characters.
    pub fn from_wire(segment: &str) -> Option<Self> {
        if segment.chars().count() != BOARD_CELLS {
            return None;
        }
        let mut cells = [CellState::Empty; BOARD_CELLS];
        for (cell, c) in cells.iter_mut().zip(segment.chars()) {
            *cell = CellState::from_wire(c);
        }
        Some(Self { cells })
    }

    /// Canonical 9-character wire form.
    pub fn to_wire(&self) -> String {
        self.cells.iter().map(|c| c.to_wire()).collect()
    }

    /// Cell at a position, or `None` past the end.
    pub fn get(&self, pos: usize) -> Option<CellState> {
        self.cells.get(pos).copied()
    }

    /// All cells.
    pub fn cells(&self) -> &[CellState; BOARD_CELLS] {
        &self.cells
    }

    /// True when no cell is marked.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| *c == CellState::Empty)
    }

    /// Number of marked cells.
    pub fn marked_count(&self) -> usize {
        self.cells.iter().filter(|c| **c != CellState::Empty).count()
    }

    /// Render as a three-line text grid, empty cells shown by their index.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..3 {
            if row > 0 {
                out.push_str("\n---+---+---\n");
            }
            for col in 0..3 {
                let pos = row * 3 + col;
                if col > 0 {
                    out.push('|');
                }
                let symbol = match self.cells[pos] {
                    CellState::Empty => char::from(b'0' + pos as u8),
                    other => other.symbol(),
                };
                out.push(' ');
                out.push(symbol);
                out.push(' ');
            }
        }
        out
    }
}

/// Game outcome as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", content = "winner", rename_all = "snake_case")]
pub enum GameOutcome {
    /// Game still running
    #[default]
    InProgress,
    /// A player completed a line
    Win(Player),
    /// Board full without a winner
    Draw,
}

impl GameOutcome {
    /// Whether the game is over.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameOutcome::InProgress)
    }
}

impl std::fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameOutcome::InProgress => write!(f, "in progress"),
            GameOutcome::Win(player) => write!(f, "player {player} wins"),
            GameOutcome::Draw => write!(f, "draw"),
        }
    }
}
