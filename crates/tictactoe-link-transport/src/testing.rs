//! In-memory scripted device for exercising the session layer without hardware.
//!
//! A [`ScriptedDevice`] records every frame written to it and answers through a
//! responder closure. Tests can also inject unsolicited lines and break the
//! link to simulate a vanished device.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tictactoe_link_core::{validate_baud_rate, Error, Result};

use crate::transport::{LineRead, LinkConnector, LinkTransport};

/// Maps one received line (terminator stripped) to the lines sent back.
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

struct DeviceState {
    open: bool,
    broken: bool,
    inbound: VecDeque<String>,
    written: Vec<String>,
    responder: Option<Responder>,
    close_count: usize,
    baud_rate: Option<u32>,
}

/// Scripted stand-in for the microcontroller.
pub struct ScriptedDevice {
    address: String,
    state: Mutex<DeviceState>,
    ready: Condvar,
}

impl std::fmt::Debug for ScriptedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDevice")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl ScriptedDevice {
    /// A device that never answers.
    pub fn silent(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            state: Mutex::new(DeviceState {
                open: false,
                broken: false,
                inbound: VecDeque::new(),
                written: Vec::new(),
                responder: None,
                close_count: 0,
                baud_rate: None,
            }),
            ready: Condvar::new(),
        })
    }

    /// A device answering through `responder`.
    pub fn with_responder<F>(address: &str, responder: F) -> Arc<Self>
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let device = Self::silent(address);
        device.set_responder(responder);
        device
    }

    /// A device that acknowledges `RESET` and `MODEn` and plays moves with
    /// alternating marks, rejecting occupied cells. It never declares a winner.
    pub fn firmware(address: &str) -> Arc<Self> {
        let mut cells = [b'0'; 9];
        let mut next = b'1';
        Self::with_responder(address, move |line| {
            if line == "RESET" {
                cells = [b'0'; 9];
                next = b'1';
                return vec!["OK:RESET".to_string()];
            }
            if line.starts_with("MODE") {
                cells = [b'0'; 9];
                next = b'1';
                return vec!["OK:MODE_SET".to_string()];
            }
            let Some(pos) = line
                .strip_prefix("MOVE")
                .and_then(|p| p.parse::<usize>().ok())
                .filter(|p| *p < 9)
            else {
                return Vec::new();
            };
            if cells[pos] != b'0' {
                return vec!["ERR:Cell occupied".to_string()];
            }
            cells[pos] = next;
            next = if next == b'1' { b'2' } else { b'1' };
            let board = String::from_utf8_lossy(&cells).into_owned();
            let suffix = if cells.iter().all(|c| *c != b'0') {
                "DRAW"
            } else {
                "CONTINUE"
            };
            vec![format!("BOARD:{board}:{suffix}")]
        })
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Queue an unsolicited line from the device.
    pub fn push_line(&self, line: &str) {
        self.lock().inbound.push_back(line.to_string());
        self.ready.notify_all();
    }

    /// Frames written so far, terminators stripped (a keepalive shows as `""`).
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Forget recorded frames.
    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Make every further operation fail with `LinkBroken`, as if unplugged.
    pub fn break_link(&self) {
        self.lock().broken = true;
        self.ready.notify_all();
    }

    /// How many times the link was closed.
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Baud rate of the last open.
    pub fn baud_rate(&self) -> Option<u32> {
        self.lock().baud_rate
    }

    fn claim(&self, baud_rate: u32) -> Result<()> {
        let mut state = self.lock();
        if state.open {
            return Err(Error::LinkUnavailable(format!(
                "{}: already in use",
                self.address
            )));
        }
        state.open = true;
        state.broken = false;
        state.inbound.clear();
        state.baud_rate = Some(baud_rate);
        Ok(())
    }

    fn check_usable(&self, state: &DeviceState) -> Result<()> {
        if state.broken {
            Err(Error::LinkBroken(format!("{}: device vanished", self.address)))
        } else if !state.open {
            Err(Error::LinkBroken(format!("{}: link closed", self.address)))
        } else {
            Ok(())
        }
    }
}

impl LinkTransport for ScriptedDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn write_line(&self, frame: &[u8]) -> Result<()> {
        let mut state = self.lock();
        self.check_usable(&state)?;

        let text = String::from_utf8_lossy(frame);
        let line = text.trim_end_matches(['\r', '\n']).to_string();
        state.written.push(line.clone());

        let replies = match state.responder.as_mut() {
            Some(responder) => responder(&line),
            None => Vec::new(),
        };
        if !replies.is_empty() {
            state.inbound.extend(replies);
            self.ready.notify_all();
        }
        Ok(())
    }

    fn read_line(&self, timeout: Duration) -> Result<LineRead> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            self.check_usable(&state)?;
            if let Some(line) = state.inbound.pop_front() {
                return Ok(LineRead::Line(line));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(LineRead::Timeout);
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn bytes_pending(&self) -> Result<bool> {
        let state = self.lock();
        self.check_usable(&state)?;
        Ok(!state.inbound.is_empty())
    }

    fn close(&self) {
        let mut state = self.lock();
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
        drop(state);
        self.ready.notify_all();
    }

    fn is_open(&self) -> bool {
        let state = self.lock();
        state.open && !state.broken
    }
}

/// Connector over a fixed set of scripted devices.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    devices: Mutex<HashMap<String, Arc<ScriptedDevice>>>,
    busy: Mutex<HashSet<String>>,
}

impl ScriptedConnector {
    /// Create a connector with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connector serving one device.
    pub fn with_device(device: Arc<ScriptedDevice>) -> Self {
        let connector = Self::new();
        connector.add_device(device);
        connector
    }

    /// Make a device reachable at its address.
    pub fn add_device(&self, device: Arc<ScriptedDevice>) {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.address.clone(), device);
    }

    /// Mark an address as claimed by another process.
    pub fn set_busy(&self, address: &str, busy: bool) {
        let mut set = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if busy {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }
}

impl LinkConnector for ScriptedConnector {
    fn available_addresses(&self) -> Result<Vec<String>> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        let mut addresses: Vec<String> = devices.keys().cloned().collect();
        addresses.sort();
        Ok(addresses)
    }

    fn open(&self, address: &str, baud_rate: u32) -> Result<Arc<dyn LinkTransport>> {
        validate_baud_rate(baud_rate)?;
        if self
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
        {
            return Err(Error::LinkUnavailable(format!(
                "{address}: claimed by another process"
            )));
        }
        let device = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| Error::LinkUnavailable(format!("{address}: no such port")))?;
        device.claim(baud_rate)?;
        Ok(device)
    }
}
