//! tictactoe-link MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! It routes MCP tool calls to the underlying [`SessionClient`]. Client calls
//! block on serial I/O, so every link-touching tool runs them on the blocking
//! thread pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use tictactoe_link_core::{Error, LinkState, SUPPORTED_BAUD_RATES};
use tictactoe_link_session::{MoveResult, SessionClient, SessionClientConfig, SessionEvent};
use tictactoe_link_transport::{LinkConnector, SerialConnector};

use crate::tools::*;

/// Map a client error onto an MCP error.
///
/// Bad input and wrong-state calls are the caller's problem (`-32602`);
/// everything else is reported as an internal error (`-32603`).
fn to_mcp_error(what: &str, err: Error) -> McpError {
    let code = if err.is_caller_error() {
        ErrorCode(-32602)
    } else {
        ErrorCode(-32603)
    };
    McpError::new(code, format!("{what}: {err}"), None)
}

/// Serialize a response as pretty JSON text content.
fn json_result<T: Serialize>(response: &T, fallback: &str) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(response).unwrap_or_else(|_| fallback.to_string()),
    )])
}

/// tictactoe-link MCP Server
///
/// Owns one session client and exposes it via MCP tools.
#[derive(Clone)]
pub struct TicTacToeLinkServer {
    /// Session client shared with every tool call
    client: SessionClient,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TicTacToeLinkServer {
    /// Create a server talking to the host's serial ports
    pub fn new(config: SessionClientConfig) -> Self {
        Self::with_connector(Arc::new(SerialConnector::new()), config)
    }

    /// Create a server using the given connector
    pub fn with_connector(connector: Arc<dyn LinkConnector>, config: SessionClientConfig) -> Self {
        Self {
            client: SessionClient::new(connector, config),
            tool_router: Self::tool_router(),
        }
    }

    /// The session client behind the tools
    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Run a blocking client call on the blocking thread pool
    async fn blocking<T, F>(&self, what: &str, call: F) -> Result<tictactoe_link_core::Result<T>, McpError>
    where
        T: Send + 'static,
        F: FnOnce(SessionClient) -> tictactoe_link_core::Result<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || call(client))
            .await
            .map_err(|e| {
                error!("{} task panicked: {}", what, e);
                McpError::new(ErrorCode(-32603), format!("{what} task failed: {e}"), None)
            })
    }

    /// List serial ports
    #[tool(description = "List serial ports the device may be attached to")]
    #[instrument(skip_all)]
    async fn link_list_ports(
        &self,
        Parameters(_params): Parameters<ListPortsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Listing serial ports");

        let ports = self
            .blocking("List ports", |client| client.available_addresses())
            .await?
            .map_err(|e| {
                error!("Failed to list serial ports: {}", e);
                to_mcp_error("Failed to list serial ports", e)
            })?;

        info!("Found {} serial ports", ports.len());

        let response = ListPortsResponse {
            count: ports.len(),
            ports,
            supported_baud_rates: SUPPORTED_BAUD_RATES.to_vec(),
        };

        Ok(json_result(&response, "Ports listed"))
    }

    /// Open the link
    #[tool(
        description = "Open the serial link to the device and start a fresh game. Fails if a link is already open."
    )]
    #[instrument(skip_all)]
    async fn link_connect(
        &self,
        Parameters(params): Parameters<ConnectParams>,
    ) -> Result<CallToolResult, McpError> {
        let baud_rate = params
            .baud_rate
            .unwrap_or_else(|| self.client.last_baud_rate());

        info!(
            "Connecting: address='{}', baud_rate={}",
            params.address, baud_rate
        );

        let address = params.address.clone();
        let state = self
            .blocking("Connect", move |client| client.connect(&address, baud_rate))
            .await?
            .map_err(|e| {
                warn!("Failed to connect to '{}': {}", params.address, e);
                to_mcp_error("Failed to connect", e)
            })?;

        info!("Connected to '{}' in {} mode", params.address, state.mode);

        let response = ConnectResponse {
            baud_rate,
            message: format!(
                "Connected to {} at {} baud ({})",
                params.address, baud_rate, state.mode
            ),
            view: state.into(),
        };

        Ok(json_result(&response, "Connected"))
    }

    /// Close the link
    #[tool(description = "Close the serial link. Safe to call when already disconnected.")]
    #[instrument(skip_all)]
    async fn link_disconnect(
        &self,
        Parameters(_params): Parameters<DisconnectParams>,
    ) -> Result<CallToolResult, McpError> {
        let was_connected = self.client.state().link != LinkState::Disconnected;
        debug!("Disconnecting (was_connected={})", was_connected);

        self.blocking("Disconnect", |client| {
            client.disconnect();
            Ok(())
        })
        .await?
        .map_err(|e| to_mcp_error("Failed to disconnect", e))?;

        let response = DisconnectResponse {
            was_connected,
            message: if was_connected {
                "Disconnected".to_string()
            } else {
                "No link was open".to_string()
            },
        };

        Ok(json_result(&response, "Disconnected"))
    }

    /// Switch game mode
    #[tool(
        description = "Switch game mode (human-vs-human, human-vs-ai, ai-vs-ai). In ai-vs-ai mode the device plays itself and the server follows along."
    )]
    #[instrument(skip_all)]
    async fn game_set_mode(
        &self,
        Parameters(params): Parameters<SetModeParams>,
    ) -> Result<CallToolResult, McpError> {
        let mode = params.mode;
        info!("Setting game mode: {}", mode);

        let state = self
            .blocking("Set mode", move |client| client.set_mode(mode))
            .await?
            .map_err(|e| {
                warn!("Failed to set mode {}: {}", mode, e);
                to_mcp_error("Failed to set mode", e)
            })?;

        let response = StateResponse {
            message: format!("Mode set to {}", state.mode),
            view: state.into(),
        };

        Ok(json_result(&response, "Mode set"))
    }

    /// Place a mark
    #[tool(
        description = "Place a mark at a cell (0-8, row-major from the top-left). Moves are ignored in ai-vs-ai mode and after the game ends."
    )]
    #[instrument(skip_all)]
    async fn game_move(
        &self,
        Parameters(params): Parameters<MoveParams>,
    ) -> Result<CallToolResult, McpError> {
        let position = params.position;
        debug!("Move requested: position={}", position);

        let result = self
            .blocking("Move", move |client| client.make_move(position))
            .await?;

        let response = match result {
            Ok(MoveResult::Applied { state }) => {
                info!("Move {} applied: {}", position, state.outcome);
                MoveResponse {
                    position,
                    sent: true,
                    rejected: false,
                    ignored: None,
                    message: format!("Move {} played, game {}", position, state.outcome),
                    view: state.into(),
                }
            }
            Ok(MoveResult::Ignored { reason }) => {
                debug!("Move {} ignored: {}", position, reason);
                MoveResponse {
                    position,
                    sent: false,
                    rejected: false,
                    ignored: Some(reason),
                    message: format!("Move not sent: {reason}"),
                    view: self.client.state().into(),
                }
            }
            // The device refused the move; the board is unchanged and play goes on
            Err(Error::GameError(text)) => {
                info!("Move {} rejected by device: {}", position, text);
                MoveResponse {
                    position,
                    sent: true,
                    rejected: true,
                    ignored: None,
                    message: format!("Device rejected move: {text}"),
                    view: self.client.state().into(),
                }
            }
            Err(e) => {
                warn!("Move {} failed: {}", position, e);
                return Err(to_mcp_error("Failed to play move", e));
            }
        };

        Ok(json_result(&response, "Move processed"))
    }

    /// Reset the board
    #[tool(description = "Start a new game. While disconnected this only clears the local board.")]
    #[instrument(skip_all)]
    async fn game_reset(
        &self,
        Parameters(_params): Parameters<ResetParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Resetting game");

        let state = self
            .blocking("Reset", |client| client.reset())
            .await?
            .map_err(|e| {
                warn!("Failed to reset: {}", e);
                to_mcp_error("Failed to reset", e)
            })?;

        let response = StateResponse {
            message: if state.is_connected() {
                "New game started".to_string()
            } else {
                "Board cleared (not connected)".to_string()
            },
            view: state.into(),
        };

        Ok(json_result(&response, "Game reset"))
    }

    /// Read the current state
    #[tool(description = "Get the current link and game state without touching the link")]
    #[instrument(skip_all)]
    async fn game_state(
        &self,
        Parameters(_params): Parameters<StateParams>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.client.state();
        let response = StateResponse {
            message: format!("{:?}, {}, {}", state.link, state.mode, state.outcome),
            view: state.into(),
        };

        Ok(json_result(&response, "State captured"))
    }

    /// Wait for the next state change
    #[tool(
        description = "Wait until the session state changes (e.g. an ai-vs-ai move arrives) or the timeout expires"
    )]
    #[instrument(skip_all)]
    async fn game_wait_for_update(
        &self,
        Parameters(params): Parameters<WaitForUpdateParams>,
    ) -> Result<CallToolResult, McpError> {
        let timeout_ms = params.timeout_ms.min(MAX_WAIT_TIMEOUT_MS);
        debug!("Waiting for update: timeout={}ms", timeout_ms);

        let mut events = self.client.subscribe();
        let started = Instant::now();

        let (updated, error) =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), events.recv()).await {
                Ok(Ok(SessionEvent::StateChanged { .. })) => (true, None),
                Ok(Ok(SessionEvent::Error { message })) => (true, Some(message)),
                // Missed events still mean something happened
                Ok(Err(RecvError::Lagged(n))) => {
                    debug!("Update waiter lagged by {} events", n);
                    (true, None)
                }
                Ok(Err(RecvError::Closed)) => (false, None),
                Err(_) => (false, None),
            };

        let waited_ms = started.elapsed().as_millis() as u64;
        if updated {
            info!("Update received after {}ms", waited_ms);
        } else {
            debug!("No update within {}ms", waited_ms);
        }

        let response = WaitForUpdateResponse {
            updated,
            error,
            waited_ms,
            view: self.client.state().into(),
        };

        Ok(json_result(&response, "Wait finished"))
    }

    /// Read recent link traffic
    #[tool(description = "Get the most recent raw frames exchanged with the device")]
    #[instrument(skip_all)]
    async fn link_traffic(
        &self,
        Parameters(params): Parameters<TrafficParams>,
    ) -> Result<CallToolResult, McpError> {
        let traffic = self.client.traffic();
        let mut frames = match params.since {
            Some(since) => traffic.since(since),
            None => traffic.tail(params.limit),
        };
        if frames.len() > params.limit {
            frames.drain(..frames.len() - params.limit);
        }

        let next_since = frames.last().map(|f| f.seq + 1).or(params.since);
        debug!("Returning {} traffic frames", frames.len());

        let response = TrafficResponse { frames, next_since };

        Ok(json_result(&response, "Traffic captured"))
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for TicTacToeLinkServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Play tic-tac-toe against a microcontroller over a serial link. \
                 Use link_list_ports and link_connect to open the link, game_set_mode \
                 to pick a mode, game_move to place marks (cells 0-8, row-major), and \
                 game_state or game_wait_for_update to follow the board. In ai-vs-ai \
                 mode the device plays itself; call game_wait_for_update to watch."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
