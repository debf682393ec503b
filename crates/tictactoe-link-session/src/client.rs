//! Session client: the single owner of the link and the authoritative state.
//!
//! All link traffic goes through one critical section ([`LinkSlot`]). Commands
//! from the front end, AI poll ticks and keepalive probes take turns on it, so
//! at most one command is ever in flight. Readers use the published snapshot
//! from [`SessionClient::state`] and never wait for I/O.
//!
//! `disconnect` does not wait for the critical section before cutting the link:
//! it bumps the session epoch and closes the transport through a side handle,
//! which fails any blocked read. The interrupted operation sees the epoch moved
//! and returns [`Error::Cancelled`] without touching state; the next holder of
//! the critical section finishes the teardown.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use tictactoe_link_core::{
    codec, validate_baud_rate, CellIndex, ClientConfig, Command, Error, GameMode,
    LinkState, Reply, Result, SessionId, SessionState,
};
use tictactoe_link_transport::{LineRead, LinkConnector, LinkTransport};

use crate::events::{EventBus, SessionEvent, SessionObserver};
use crate::liveness::{KeepaliveMonitor, DEFAULT_KEEPALIVE_INTERVAL};
use crate::poller::{AiPoller, DEFAULT_AI_POLL_INTERVAL};
use crate::ticker::TickToken;
use crate::traffic::{Direction, TrafficLog, TRAFFIC_CAPACITY};

/// Upper bound on unsolicited lines drained before one command.
const MAX_DRAIN_LINES: usize = 32;

/// Session client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClientConfig {
    /// Reply deadline per command
    pub read_timeout: Duration,
    /// AI poll tick
    pub ai_poll_interval: Duration,
    /// Keepalive probe period
    pub keepalive_interval: Duration,
    /// Mode label before the first successful `set_mode`
    pub initial_mode: GameMode,
    /// Baud rate reported by `last_baud_rate` before the first connect
    pub default_baud_rate: u32,
    /// Frames kept by the traffic log
    pub traffic_capacity: usize,
}

impl Default for SessionClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            ai_poll_interval: DEFAULT_AI_POLL_INTERVAL,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            initial_mode: GameMode::default(),
            default_baud_rate: 9600,
            traffic_capacity: TRAFFIC_CAPACITY,
        }
    }
}

impl From<&ClientConfig> for SessionClientConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            read_timeout: config.serial.read_timeout(),
            ai_poll_interval: config.timing.ai_poll_interval(),
            keepalive_interval: config.timing.keepalive_interval(),
            initial_mode: config.game.default_mode,
            default_baud_rate: config.serial.baud_rate,
            traffic_capacity: TRAFFIC_CAPACITY,
        }
    }
}

/// Why a move was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The device is playing itself
    AutonomousMode,
    /// The game already has an outcome
    GameOver,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::AutonomousMode => write!(f, "moves are disabled in AI vs AI mode"),
            IgnoreReason::GameOver => write!(f, "the game is over; reset to play again"),
        }
    }
}

/// Result of [`SessionClient::make_move`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MoveResult {
    /// The device answered with a board update
    Applied {
        /// State after the update
        state: SessionState,
    },
    /// Nothing was written
    Ignored {
        /// Why
        reason: IgnoreReason,
    },
}

/// How a reply wait treats one decoded line.
enum Verdict {
    Accept,
    Skip(&'static str),
    Unexpected,
}

/// The critical section: the open link and the authoritative state.
struct LinkSlot {
    transport: Option<Arc<dyn LinkTransport>>,
    /// Epoch the current transport belongs to
    link_epoch: u64,
    state: SessionState,
}

struct Shared {
    connector: Arc<dyn LinkConnector>,
    config: SessionClientConfig,
    slot: Mutex<LinkSlot>,
    published: RwLock<SessionState>,
    epoch: AtomicU64,
    /// Side handle for `disconnect`, tagged with the epoch the link was opened in
    cancel: Mutex<Option<(u64, Arc<dyn LinkTransport>)>>,
    last_baud_rate: AtomicU32,
    poller: AiPoller,
    keepalive: KeepaliveMonitor,
    events: EventBus,
    traffic: TrafficLog,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.poller.stop();
        self.keepalive.stop();
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(link) = slot.transport.take() {
            link.close();
        }
    }
}

/// Client for one device link. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a disconnected client.
    pub fn new(connector: Arc<dyn LinkConnector>, config: SessionClientConfig) -> Self {
        let state = SessionState::new(config.initial_mode);
        let shared = Shared {
            connector,
            slot: Mutex::new(LinkSlot {
                transport: None,
                link_epoch: 0,
                state: state.clone(),
            }),
            published: RwLock::new(state),
            epoch: AtomicU64::new(0),
            cancel: Mutex::new(None),
            last_baud_rate: AtomicU32::new(config.default_baud_rate),
            poller: AiPoller::new(config.ai_poll_interval),
            keepalive: KeepaliveMonitor::new(config.keepalive_interval),
            events: EventBus::default(),
            traffic: TrafficLog::new(config.traffic_capacity),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Open `address` and synchronise with the device through an implicit reset.
    pub fn connect(&self, address: &str, baud_rate: u32) -> Result<SessionState> {
        let mut txn = self.begin();
        let result = txn.connect(address, baud_rate);
        txn.finish(result)
    }

    /// Close the link. Safe to call at any time, from any thread, any number of times.
    pub fn disconnect(&self) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = {
            let mut cancel = self
                .shared
                .cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // A link opened after the bump belongs to a newer connect
            match cancel.as_ref() {
                Some((opened, _)) if *opened < epoch => cancel.take(),
                _ => None,
            }
        };
        if let Some((_, link)) = pending {
            info!("Disconnecting from {}", link.address());
            link.close();
        }
        // Taking the critical section completes the teardown
        self.begin().end();
    }

    /// Ask the device to switch game mode.
    pub fn set_mode(&self, mode: GameMode) -> Result<SessionState> {
        let mut txn = self.begin();
        let result = txn.set_mode(mode);
        txn.finish(result)
    }

    /// Place a mark at `pos` (0-8, row-major).
    pub fn make_move(&self, pos: u8) -> Result<MoveResult> {
        let index = CellIndex::new(pos)?;
        let mut txn = self.begin();
        let result = txn.make_move(index);
        txn.finish(result)
    }

    /// Start a new game. While disconnected this only clears the displayed board.
    pub fn reset(&self) -> Result<SessionState> {
        let mut txn = self.begin();
        let result = txn.reset();
        txn.finish(result)
    }

    /// Consume one unsolicited line if one is buffered. Never writes.
    pub fn poll_unsolicited(&self) -> Result<Option<Reply>> {
        let mut txn = self.begin();
        let result = txn.poll_unsolicited();
        txn.finish(result)
    }

    /// Probe the link with a keepalive frame.
    ///
    /// Returns `Ok(false)` without probing when disconnected or when a command
    /// currently owns the link.
    pub fn check_link(&self) -> Result<bool> {
        match self.try_begin() {
            Some(mut txn) => {
                let result = txn.check_link();
                txn.finish(result)
            }
            None => Ok(false),
        }
    }

    /// Latest published state.
    pub fn state(&self) -> SessionState {
        self.shared
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Register an observer.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.shared.events.add_observer(observer);
    }

    /// Frames exchanged with the device.
    pub fn traffic(&self) -> &TrafficLog {
        &self.shared.traffic
    }

    /// Addresses the connector can open.
    pub fn available_addresses(&self) -> Result<Vec<String>> {
        self.shared.connector.available_addresses()
    }

    /// Baud rate of the last successful connect, or the configured default.
    pub fn last_baud_rate(&self) -> u32 {
        self.shared.last_baud_rate.load(Ordering::SeqCst)
    }

    /// Client settings.
    pub fn config(&self) -> &SessionClientConfig {
        &self.shared.config
    }

    /// Whether the AI poller thread is active.
    pub fn is_polling(&self) -> bool {
        self.shared.poller.is_running()
    }

    /// Whether the keepalive thread is active.
    pub fn is_probing(&self) -> bool {
        self.shared.keepalive.is_running()
    }

    fn begin(&self) -> Txn<'_> {
        let slot = self
            .shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Txn::open(&self.shared, slot)
    }

    fn try_begin(&self) -> Option<Txn<'_>> {
        let slot = match self.shared.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(Txn::open(&self.shared, slot))
    }

    fn poll_tick(&self, token: &TickToken) -> ControlFlow<()> {
        let mut txn = self.begin();
        if !token.is_current() {
            txn.end();
            return ControlFlow::Break(());
        }
        if let Err(e) = txn.poll_unsolicited() {
            debug!("AI poll tick failed: {}", e);
        }
        let current = token.is_current();
        txn.end();
        if current {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    fn keepalive_tick(&self, token: &TickToken) -> ControlFlow<()> {
        let Some(mut txn) = self.try_begin() else {
            trace!("Link busy, skipping keepalive");
            return ControlFlow::Continue(());
        };
        if !token.is_current() {
            txn.end();
            return ControlFlow::Break(());
        }
        if let Err(e) = txn.check_link() {
            debug!("Keepalive probe failed: {}", e);
        }
        let current = token.is_current();
        txn.end();
        if current {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }
}

/// One turn in the critical section. Events queue up and are dispatched by
/// [`Txn::finish`] after the lock is released.
struct Txn<'a> {
    shared: &'a Arc<Shared>,
    slot: MutexGuard<'a, LinkSlot>,
    events: Vec<SessionEvent>,
}

impl<'a> Txn<'a> {
    fn open(shared: &'a Arc<Shared>, slot: MutexGuard<'a, LinkSlot>) -> Self {
        let mut txn = Self {
            shared,
            slot,
            events: Vec::new(),
        };
        txn.reap_stale();
        txn
    }

    fn finish<T>(self, result: Result<T>) -> Result<T> {
        self.end();
        result
    }

    fn end(self) {
        let Txn {
            shared,
            slot,
            events,
        } = self;
        drop(slot);
        shared.events.dispatch(events);
    }

    fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    /// Finish a disconnect whose side-handle close already happened.
    fn reap_stale(&mut self) {
        if self.slot.transport.is_some() && self.slot.link_epoch != self.epoch() {
            debug!("Completing pending disconnect");
            self.teardown();
        }
    }

    fn publish(&mut self) {
        let state = self.slot.state.clone();
        if let Err(violation) = state.check_invariants() {
            error!("Session state invariant violated: {}", violation);
        }
        *self
            .shared
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state.clone();
        self.events.push(SessionEvent::StateChanged { state });
    }

    fn surface_error(&mut self, message: String) {
        self.events.push(SessionEvent::Error { message });
    }

    fn teardown(&mut self) {
        self.shared.poller.stop();
        self.shared.keepalive.stop();
        if let Some(link) = self.slot.transport.take() {
            link.close();
        }
        self.shared
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let before = self.slot.state.clone();
        self.slot.state.reset_to_disconnected();
        if before != self.slot.state {
            info!("Link state: Disconnected");
            self.publish();
        }
    }

    /// Route an I/O or protocol failure. Returns the error the caller reports.
    fn fail(&mut self, err: Error) -> Error {
        if self.slot.transport.is_some() && self.slot.link_epoch != self.epoch() {
            debug!("Operation interrupted by disconnect: {}", err);
            return Error::Cancelled;
        }
        if err.forces_disconnect() {
            warn!("Link lost: {}", err);
            self.surface_error(err.to_string());
            self.teardown();
        }
        err
    }

    fn link(&self) -> Result<Arc<dyn LinkTransport>> {
        self.slot
            .transport
            .clone()
            .ok_or_else(|| Error::LinkUnavailable("not connected".to_string()))
    }

    fn require_connected(&self) -> Result<()> {
        if self.slot.state.is_connected() {
            Ok(())
        } else {
            Err(Error::LinkUnavailable("not connected".to_string()))
        }
    }

    fn read_line(&mut self, link: &Arc<dyn LinkTransport>, timeout: Duration) -> Result<LineRead> {
        let read = link.read_line(timeout).map_err(|e| self.fail(e))?;
        if let LineRead::Line(line) = &read {
            trace!("<- {:?}", line);
            self.shared.traffic.record(Direction::Received, line);
        }
        Ok(read)
    }

    fn write(&mut self, link: &Arc<dyn LinkTransport>, command: Command) -> Result<()> {
        let frame = command.encode();
        trace!("-> {:?}", frame);
        self.shared.traffic.record(Direction::Sent, &frame);
        link.write_line(frame.as_bytes()).map_err(|e| self.fail(e))
    }

    fn pending(&mut self, link: &Arc<dyn LinkTransport>) -> Result<bool> {
        link.bytes_pending().map_err(|e| self.fail(e))
    }

    /// Apply lines that arrived unasked, so the next reply belongs to the next command.
    fn drain_unsolicited(&mut self, link: &Arc<dyn LinkTransport>) -> Result<()> {
        for _ in 0..MAX_DRAIN_LINES {
            if !self.pending(link)? {
                break;
            }
            let timeout = self.shared.config.read_timeout;
            match self.read_line(link, timeout)? {
                LineRead::Line(line) => {
                    debug!("Draining unsolicited line {:?}", line);
                    if let Err(e) = self.apply(&codec::decode(&line)) {
                        debug!("Unsolicited line reported: {}", e);
                    }
                }
                LineRead::Timeout => break,
            }
        }
        Ok(())
    }

    /// Drain, send `command` and wait for the reply it expects.
    fn command(&mut self, command: Command) -> Result<Reply> {
        let link = self.link()?;
        self.drain_unsolicited(&link)?;
        self.exchange(&link, command)
    }

    /// Send `command` and wait for its reply: the expected ack for ack-style
    /// commands, a board update or device error otherwise.
    fn exchange(&mut self, link: &Arc<dyn LinkTransport>, command: Command) -> Result<Reply> {
        let expected = command.expected_ack();
        self.write(link, command)?;

        let timeout = self.shared.config.read_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let err = Error::LinkBroken(format!("no reply to {command} within {timeout:?}"));
                return Err(self.fail(err));
            }
            let line = match self.read_line(link, remaining)? {
                LineRead::Line(line) => line,
                LineRead::Timeout => continue,
            };

            let reply = codec::decode(&line);
            let verdict = match (expected, &reply) {
                (_, Reply::Unrecognized(_)) => Verdict::Skip("unrecognized line"),
                (Some(wanted), Reply::Ack(got)) if wanted == *got => Verdict::Accept,
                (Some(_), Reply::BoardUpdate { .. }) => Verdict::Skip("board update"),
                (Some(_), Reply::Ack(_) | Reply::Err(_)) => Verdict::Unexpected,
                (None, Reply::BoardUpdate { .. } | Reply::Err(_)) => Verdict::Accept,
                (None, Reply::Ack(_)) => Verdict::Skip("stray acknowledgement"),
            };
            match verdict {
                Verdict::Accept => return Ok(reply),
                Verdict::Skip(what) => {
                    debug!("Skipping {} {:?} while awaiting reply to {}", what, line, command);
                }
                Verdict::Unexpected => {
                    let err = Error::ProtocolError(format!(
                        "expected {expected:?} in reply to {command}, got {line:?}"
                    ));
                    return Err(self.fail(err));
                }
            }
        }
    }

    /// Shared event application for replies and unsolicited lines.
    fn apply(&mut self, reply: &Reply) -> Result<()> {
        match reply {
            Reply::BoardUpdate { board, outcome } => {
                self.slot.state.apply_board(*board, *outcome);
                if outcome.is_terminal() {
                    info!("Game over: {}", outcome);
                }
                self.sync_polling();
                self.publish();
                Ok(())
            }
            Reply::Err(text) => {
                warn!("Device rejected command: {}", text);
                self.surface_error(text.clone());
                Err(Error::GameError(text.clone()))
            }
            Reply::Ack(ack) => {
                debug!("Ignoring unexpected {:?} acknowledgement", ack);
                Ok(())
            }
            Reply::Unrecognized(line) => {
                debug!("Ignoring unrecognized line {:?}", line);
                Ok(())
            }
        }
    }

    /// Start or stop the AI poller so it runs exactly while the state calls for it.
    fn sync_polling(&mut self) {
        let state = &self.slot.state;
        let wanted = state.is_connected() && state.mode.is_autonomous() && state.active;
        if wanted && !self.shared.poller.is_running() {
            let weak = Arc::downgrade(self.shared);
            self.shared.poller.start(move |token| match weak.upgrade() {
                Some(shared) => SessionClient { shared }.poll_tick(token),
                None => ControlFlow::Break(()),
            });
        } else if !wanted {
            self.shared.poller.stop();
        }
        self.slot.state.ai_polling = wanted;
    }

    fn start_keepalive(&mut self) {
        let weak = Arc::downgrade(self.shared);
        self.shared.keepalive.start(move |token| match weak.upgrade() {
            Some(shared) => SessionClient { shared }.keepalive_tick(token),
            None => ControlFlow::Break(()),
        });
    }

    fn connect(&mut self, address: &str, baud_rate: u32) -> Result<SessionState> {
        if let Some(link) = &self.slot.transport {
            return Err(Error::InvalidParameter(format!(
                "already connected to {}",
                link.address()
            )));
        }
        if address.trim().is_empty() {
            return Err(Error::InvalidParameter("no port selected".to_string()));
        }
        validate_baud_rate(baud_rate)?;

        let epoch = self.epoch();
        info!("Connecting to {} at {} baud", address, baud_rate);
        self.slot.state.link = LinkState::Connecting;
        self.slot.state.address = Some(address.to_string());
        self.publish();

        let link = match self.shared.connector.open(address, baud_rate) {
            Ok(link) => link,
            Err(e) => {
                warn!("Failed to open {}: {}", address, e);
                self.slot.state.reset_to_disconnected();
                self.publish();
                self.surface_error(e.to_string());
                return Err(e);
            }
        };

        self.slot.transport = Some(Arc::clone(&link));
        self.slot.link_epoch = epoch;
        *self
            .shared
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((epoch, Arc::clone(&link)));
        if self.epoch() != epoch {
            // disconnect() ran while the port was opening
            link.close();
            return Err(Error::Cancelled);
        }

        if let Err(e) = self.command(Command::Reset) {
            if matches!(e, Error::Cancelled) {
                return Err(e);
            }
            let surfaced = e.forces_disconnect();
            self.teardown();
            let err = Error::ProtocolError(format!("implicit reset failed: {e}"));
            if !surfaced {
                self.surface_error(err.to_string());
            }
            return Err(err);
        }

        let session_id = SessionId::new();
        self.slot.state.link = LinkState::Connected;
        self.slot.state.session_id = Some(session_id);
        self.slot.state.reset_game();
        self.shared.last_baud_rate.store(baud_rate, Ordering::SeqCst);
        self.start_keepalive();
        self.sync_polling();
        self.publish();
        info!(
            "Link state: Connected to {} (session {}, mode {})",
            address, session_id, self.slot.state.mode
        );
        Ok(self.slot.state.clone())
    }

    fn set_mode(&mut self, mode: GameMode) -> Result<SessionState> {
        self.require_connected()?;
        info!("Setting game mode: {}", mode);
        match self.command(Command::SetMode(mode)) {
            Ok(_) => {}
            Err(Error::LinkBroken(message)) => return Err(Error::ProtocolError(message)),
            Err(e) => return Err(e),
        }
        self.slot.state.mode = mode;
        self.slot.state.reset_game();
        self.sync_polling();
        self.publish();
        Ok(self.slot.state.clone())
    }

    fn make_move(&mut self, index: CellIndex) -> Result<MoveResult> {
        self.require_connected()?;
        // A buffered update may end the game; apply it before deciding to send
        let link = self.link()?;
        self.drain_unsolicited(&link)?;
        if self.slot.state.mode.is_autonomous() {
            debug!("Ignoring move {} in {} mode", index, self.slot.state.mode);
            return Ok(MoveResult::Ignored {
                reason: IgnoreReason::AutonomousMode,
            });
        }
        if !self.slot.state.active {
            debug!("Ignoring move {} after game over", index);
            return Ok(MoveResult::Ignored {
                reason: IgnoreReason::GameOver,
            });
        }

        debug!("Sending move {}", index);
        let reply = self.exchange(&link, Command::Move(index))?;
        self.apply(&reply)?;
        Ok(MoveResult::Applied {
            state: self.slot.state.clone(),
        })
    }

    fn reset(&mut self) -> Result<SessionState> {
        if self.slot.transport.is_none() {
            self.slot.state.reset_game();
            self.publish();
            return Ok(self.slot.state.clone());
        }
        self.require_connected()?;
        info!("Resetting game");
        self.command(Command::Reset)?;
        self.slot.state.reset_game();
        self.shared.poller.stop();
        self.sync_polling();
        self.publish();
        Ok(self.slot.state.clone())
    }

    fn poll_unsolicited(&mut self) -> Result<Option<Reply>> {
        if !self.slot.state.is_connected() {
            return Ok(None);
        }
        let link = self.link()?;
        if !self.pending(&link)? {
            return Ok(None);
        }
        let timeout = self.shared.config.read_timeout;
        match self.read_line(&link, timeout)? {
            LineRead::Line(line) => {
                let reply = codec::decode(&line);
                self.apply(&reply)?;
                Ok(Some(reply))
            }
            LineRead::Timeout => {
                debug!("Partial line pending, retrying on next poll");
                Ok(None)
            }
        }
    }

    fn check_link(&mut self) -> Result<bool> {
        if !self.slot.state.is_connected() {
            return Ok(false);
        }
        let link = self.link()?;
        self.write(&link, Command::Keepalive)?;
        Ok(true)
    }
}
