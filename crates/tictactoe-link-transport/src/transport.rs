//! Transport traits shared by the serial link and the scripted test device.

use std::sync::Arc;
use std::time::Duration;

use tictactoe_link_core::Result;

/// Outcome of a bounded line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, terminator stripped
    Line(String),
    /// No complete line arrived before the deadline
    Timeout,
}

/// An open, line-oriented, bidirectional link.
///
/// Every method takes `&self` so that [`close`](LinkTransport::close) can run
/// from another thread while a [`read_line`](LinkTransport::read_line) is
/// blocked; the blocked read then fails with `LinkBroken`.
pub trait LinkTransport: Send + Sync + std::fmt::Debug {
    /// Address this link was opened on.
    fn address(&self) -> &str;

    /// Write one complete frame (including its newline) and flush.
    fn write_line(&self, frame: &[u8]) -> Result<()>;

    /// Block for at most `timeout` waiting for one line.
    fn read_line(&self, timeout: Duration) -> Result<LineRead>;

    /// Whether unread input is buffered. Never blocks.
    fn bytes_pending(&self) -> Result<bool>;

    /// Close the link. Idempotent.
    fn close(&self);

    /// Whether the link is still open.
    fn is_open(&self) -> bool;
}

/// Opens links by address.
pub trait LinkConnector: Send + Sync {
    /// Addresses that can currently be opened.
    fn available_addresses(&self) -> Result<Vec<String>>;

    /// Open `address` at `baud_rate`.
    ///
    /// Fails with `InvalidParameter` for an unsupported rate and with
    /// `LinkUnavailable` if the address is missing or claimed elsewhere.
    fn open(&self, address: &str, baud_rate: u32) -> Result<Arc<dyn LinkTransport>>;
}

/// Longest partial line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 4096;

/// Drop an unterminated run longer than [`MAX_LINE_BYTES`]. Returns the
/// number of bytes dropped.
pub(crate) fn discard_overlong(buffer: &mut Vec<u8>) -> usize {
    if buffer.len() <= MAX_LINE_BYTES || buffer.contains(&b'\n') {
        return 0;
    }
    let dropped = buffer.len();
    buffer.clear();
    dropped
}

/// Split the first complete line off `buffer`, stripping `\r\n`.
pub(crate) fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=newline).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_strips_terminators() {
        let mut buffer = b"OK:RESET\r\nBOARD:".to_vec();
        assert_eq!(take_line(&mut buffer).as_deref(), Some("OK:RESET"));
        assert_eq!(buffer, b"BOARD:");
        assert_eq!(take_line(&mut buffer), None);
    }

    #[test]
    fn test_take_line_empty_line() {
        let mut buffer = b"\n\r\nx\n".to_vec();
        assert_eq!(take_line(&mut buffer).as_deref(), Some(""));
        assert_eq!(take_line(&mut buffer).as_deref(), Some(""));
        assert_eq!(take_line(&mut buffer).as_deref(), Some("x"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_discard_overlong_keeps_short_and_terminated_runs() {
        let mut buffer = b"BOARD:0100".to_vec();
        assert_eq!(discard_overlong(&mut buffer), 0);
        assert_eq!(buffer, b"BOARD:0100");

        let mut buffer = vec![b'1'; MAX_LINE_BYTES + 10];
        buffer.push(b'\n');
        assert_eq!(discard_overlong(&mut buffer), 0);
        assert!(take_line(&mut buffer).is_some());
    }

    #[test]
    fn test_discard_overlong_drops_unterminated_stream() {
        let mut buffer = vec![b'x'; MAX_LINE_BYTES + 1];
        assert_eq!(discard_overlong(&mut buffer), MAX_LINE_BYTES + 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_take_line_invalid_utf8_is_lossy() {
        let mut buffer = vec![b'E', 0xff, b'\n'];
        let line = take_line(&mut buffer).unwrap();
        assert!(line.starts_with('E'));
    }
}
