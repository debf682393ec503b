//! Serial port link backed by the `serialport` crate.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info, warn};

use tictactoe_link_core::{validate_baud_rate, Error, Result};

use crate::transport::{discard_overlong, take_line, LineRead, LinkConnector, LinkTransport};

/// Longest single blocking read. A close is noticed within one slice.
const READ_SLICE: Duration = Duration::from_millis(20);

/// Read half of the port plus bytes received past the last full line.
struct ReadHalf {
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

/// An open serial port, exclusively claimed.
pub struct SerialLink {
    address: String,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    reader: Mutex<ReadHalf>,
    closed: AtomicBool,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("address", &self.address)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    /// Open `address` at `baud_rate`, 8N1, no flow control.
    pub fn open(address: &str, baud_rate: u32) -> Result<Self> {
        validate_baud_rate(baud_rate)?;
        info!("Opening serial link: address='{}' baud={}", address, baud_rate);

        let port = serialport::new(address, baud_rate)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| {
                warn!("Failed to open serial port '{}': {}", address, e);
                Error::LinkUnavailable(format!("{address}: {e}"))
            })?;

        let reader = port.try_clone().map_err(|e| {
            Error::LinkUnavailable(format!("{address}: failed to clone port handle: {e}"))
        })?;

        Ok(Self {
            address: address.to_string(),
            writer: Mutex::new(Some(port)),
            reader: Mutex::new(ReadHalf {
                port: Some(reader),
                pending: Vec::new(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    fn broken(&self, what: &str) -> Error {
        Error::LinkBroken(format!("{}: {what}", self.address))
    }
}

impl LinkTransport for SerialLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn write_line(&self, frame: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.broken("link closed"));
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let port = writer
            .as_mut()
            .ok_or_else(|| self.broken("link closed"))?;

        port.write_all(frame)
            .and_then(|()| port.flush())
            .map_err(|e| self.broken(&format!("write failed: {e}")))?;
        debug!("Wrote {} bytes to {}", frame.len(), self.address);
        Ok(())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead> {
        let deadline = Instant::now() + timeout;
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chunk = [0u8; 256];

        loop {
            if self.closed.load(Ordering::SeqCst) {
                reader.port = None;
                return Err(self.broken("link closed"));
            }
            if let Some(line) = take_line(&mut reader.pending) {
                return Ok(LineRead::Line(line));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(LineRead::Timeout);
            }
            let slice = READ_SLICE.min(deadline - now);

            let ReadHalf { port, pending } = &mut *reader;
            let port = port.as_mut().ok_or_else(|| self.broken("link closed"))?;
            port.set_timeout(slice)
                .map_err(|e| self.broken(&format!("set timeout failed: {e}")))?;

            match port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    let dropped = discard_overlong(pending);
                    if dropped > 0 {
                        warn!(
                            "Dropped {} bytes without a line break from {}",
                            dropped, self.address
                        );
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.broken(&format!("read failed: {e}"))),
            }
        }
    }

    fn bytes_pending(&self) -> Result<bool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.broken("link closed"));
        }
        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if !reader.pending.is_empty() {
            return Ok(true);
        }
        let port = reader
            .port
            .as_ref()
            .ok_or_else(|| self.broken("link closed"))?;
        let waiting = port
            .bytes_to_read()
            .map_err(|e| self.broken(&format!("status query failed: {e}")))?;
        Ok(waiting > 0)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing serial link: {}", self.address);
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // A blocked reader drops its own handle once it sees the flag
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.port = None;
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connector for the host's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl SerialConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

impl LinkConnector for SerialConnector {
    fn available_addresses(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports()
            .map_err(|e| Error::Other(format!("Failed to enumerate serial ports: {e}")))?;
        let mut names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
        names.sort();
        debug!("Found {} serial ports", names.len());
        Ok(names)
    }

    fn open(&self, address: &str, baud_rate: u32) -> Result<Arc<dyn LinkTransport>> {
        Ok(Arc::new(SerialLink::open(address, baud_rate)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_baud_rate_rejected_before_open() {
        let err = SerialLink::open("/dev/does-not-exist", 1234).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_missing_port_is_unavailable() {
        let err = SerialLink::open("/dev/tictactoe-link-missing", 9600).unwrap_err();
        assert!(matches!(err, Error::LinkUnavailable(_)));
    }

    #[test]
    fn test_enumeration_is_sorted() {
        // An empty list is fine on machines without serial hardware
        if let Ok(names) = SerialConnector::new().available_addresses() {
            assert!(names.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    #[ignore = "requires a device on TICTACTOE_PORT"]
    fn test_real_device_reset() {
        let address = std::env::var("TICTACTOE_PORT").unwrap();
        let link = SerialLink::open(&address, 9600).unwrap();
        // Boards that reset on open need a moment before they listen
        std::thread::sleep(Duration::from_secs(2));
        link.write_line(b"RESET\n").unwrap();
        let reply = link.read_line(Duration::from_secs(2)).unwrap();
        assert_eq!(reply, LineRead::Line("OK:RESET".to_string()));
        link.close();
        assert!(!link.is_open());
    }
}
