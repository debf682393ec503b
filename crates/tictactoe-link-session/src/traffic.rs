//! Bounded log of raw frames exchanged with the device.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use schemars::JsonSchema;
use serde::Serialize;

/// Default number of frames kept.
pub const TRAFFIC_CAPACITY: usize = 256;

/// Which way a frame travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Written to the device
    Sent,
    /// Read from the device
    Received,
}

/// One logged frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct FrameRecord {
    /// Monotonic sequence number
    pub seq: u64,
    /// Direction
    pub direction: Direction,
    /// Line text without terminator
    pub line: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

#[derive(Debug)]
struct Ring {
    records: VecDeque<FrameRecord>,
    next_seq: u64,
}

/// Ring buffer of recent frames, oldest dropped first.
#[derive(Debug)]
pub struct TrafficLog {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl TrafficLog {
    /// Create a log holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(Ring {
                records: VecDeque::with_capacity(capacity.max(1)),
                next_seq: 0,
            }),
        }
    }

    /// Record a frame.
    pub fn record(&self, direction: Direction, line: &str) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.records.len() == self.capacity {
            ring.records.pop_front();
        }
        let seq = ring.next_seq;
        ring.next_seq += 1;
        ring.records.push_back(FrameRecord {
            seq,
            direction,
            line: line.trim_end_matches(['\r', '\n']).to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// All retained frames, oldest first.
    pub fn snapshot(&self) -> Vec<FrameRecord> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.records.iter().cloned().collect()
    }

    /// Retained frames with `seq >= since`, oldest first.
    pub fn since(&self, since: u64) -> Vec<FrameRecord> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        ring.records
            .iter()
            .filter(|r| r.seq >= since)
            .cloned()
            .collect()
    }

    /// The last `count` frames, oldest first.
    pub fn tail(&self, count: usize) -> Vec<FrameRecord> {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = ring.records.len().saturating_sub(count);
        ring.records.iter().skip(skip).cloned().collect()
    }

    /// Number of retained frames.
    pub fn len(&self) -> usize {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    /// True when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained frames. Sequence numbers keep counting.
    pub fn clear(&self) {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clear();
    }
}

impl Default for TrafficLog {
    fn default() -> Self {
        Self::new(TRAFFIC_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_log_new() {
        let log = TrafficLog::default();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), TRAFFIC_CAPACITY);
    }

    #[test]
    fn test_record_strips_terminator() {
        let log = TrafficLog::default();
        log.record(Direction::Sent, "RESET\n");
        log.record(Direction::Received, "OK:RESET\r\n");

        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, "RESET");
        assert_eq!(records[0].direction, Direction::Sent);
        assert_eq!(records[1].line, "OK:RESET");
        assert_eq!(records[1].seq, 1);
    }

    #[test]
    fn test_oldest_dropped_when_full() {
        let log = TrafficLog::new(3);
        for i in 0..5 {
            log.record(Direction::Sent, &format!("MOVE{i}"));
        }
        let lines: Vec<String> = log.snapshot().into_iter().map(|r| r.line).collect();
        assert_eq!(lines, vec!["MOVE2", "MOVE3", "MOVE4"]);
    }

    #[test]
    fn test_since_and_tail() {
        let log = TrafficLog::new(10);
        for i in 0..4 {
            log.record(Direction::Received, &format!("L{i}"));
        }
        assert_eq!(log.since(2).len(), 2);
        assert_eq!(log.since(2)[0].line, "L2");
        assert_eq!(log.tail(1)[0].line, "L3");
        assert_eq!(log.tail(100).len(), 4);
    }

    #[test]
    fn test_clear_keeps_sequence() {
        let log = TrafficLog::new(10);
        log.record(Direction::Sent, "RESET");
        log.clear();
        assert!(log.is_empty());
        log.record(Direction::Sent, "MODE3");
        assert_eq!(log.snapshot()[0].seq, 1);
    }

    #[test]
    fn test_record_serialization() {
        let log = TrafficLog::default();
        log.record(Direction::Sent, "MOVE4");
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["direction"], "sent");
        assert_eq!(json["line"], "MOVE4");
        assert!(json["timestamp"].is_string());
    }
}
