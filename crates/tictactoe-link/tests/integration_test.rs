//! Integration tests for the tictactoe-link front end.

use std::sync::Arc;
use std::time::Duration;

use tictactoe_link::{
    write_back, ConnectParams, MoveParams, SetModeParams, StateView, TicTacToeLinkServer,
    TrafficParams, WaitForUpdateParams, DEFAULT_TRAFFIC_LIMIT, DEFAULT_WAIT_TIMEOUT_MS,
};
use tictactoe_link_core::{ClientConfig, GameMode, GameOutcome, LinkState, SessionState};
use tictactoe_link_session::{SessionClientConfig, SessionEvent};
use tictactoe_link_transport::testing::{ScriptedConnector, ScriptedDevice};

fn server(device: Arc<ScriptedDevice>) -> TicTacToeLinkServer {
    TicTacToeLinkServer::with_connector(
        Arc::new(ScriptedConnector::with_device(device)),
        SessionClientConfig {
            read_timeout: Duration::from_millis(200),
            ai_poll_interval: Duration::from_millis(10),
            keepalive_interval: Duration::from_secs(3600),
            ..SessionClientConfig::default()
        },
    )
}

#[test]
fn test_connect_params_default_baud_rate() {
    let params: ConnectParams = serde_json::from_str(r#"{"address": "/dev/ttyACM0"}"#).unwrap();
    assert_eq!(params.address, "/dev/ttyACM0");
    assert_eq!(params.baud_rate, None);

    let params: ConnectParams =
        serde_json::from_str(r#"{"address": "COM3", "baud_rate": 115200}"#).unwrap();
    assert_eq!(params.baud_rate, Some(115200));
}

#[test]
fn test_set_mode_params_accept_kebab_and_labels() {
    let params: SetModeParams = serde_json::from_str(r#"{"mode": "ai-vs-ai"}"#).unwrap();
    assert_eq!(params.mode, GameMode::AiVsAi);

    let params: SetModeParams = serde_json::from_str(r#"{"mode": "Man vs AI"}"#).unwrap();
    assert_eq!(params.mode, GameMode::HumanVsAi);

    assert!(serde_json::from_str::<SetModeParams>(r#"{"mode": "solo"}"#).is_err());
}

#[test]
fn test_move_params_reject_negative() {
    assert!(serde_json::from_str::<MoveParams>(r#"{"position": -1}"#).is_err());
    let params: MoveParams = serde_json::from_str(r#"{"position": 8}"#).unwrap();
    assert_eq!(params.position, 8);
}

#[test]
fn test_optional_params_defaults() {
    let params: WaitForUpdateParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);

    let params: TrafficParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params.since, None);
    assert_eq!(params.limit, DEFAULT_TRAFFIC_LIMIT);
}

#[test]
fn test_state_view_renders_board() {
    let view = StateView::from(SessionState::new(GameMode::HumanVsAi));
    assert_eq!(view.status, "disconnected");
    assert!(view.board_text.starts_with(" 0 | 1 | 2 "));

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["state"]["mode"], "human-vs-ai");
    assert_eq!(json["state"]["link"], "disconnected");
}

#[test]
fn test_session_client_config_from_settings() {
    let yaml = r#"
serial:
  baud_rate: 115200
  read_timeout_ms: 250
game:
  default_mode: ai-vs-ai
timing:
  ai_poll_interval_ms: 50
"#;
    let settings = ClientConfig::from_yaml(yaml).unwrap();
    let config = SessionClientConfig::from(&settings);
    assert_eq!(config.read_timeout, Duration::from_millis(250));
    assert_eq!(config.ai_poll_interval, Duration::from_millis(50));
    assert_eq!(config.keepalive_interval, Duration::from_millis(1000));
    assert_eq!(config.initial_mode, GameMode::AiVsAi);
    assert_eq!(config.default_baud_rate, 115200);
}

#[test]
fn test_settings_write_back_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tictactoe.yaml");

    let mut settings = ClientConfig::load_or_create(&path).unwrap();
    assert!(path.exists());

    let device = ScriptedDevice::firmware("SIM0");
    let server = server(device.clone());
    let client = server.client();
    client.connect("SIM0", 19200).unwrap();
    client.set_mode(GameMode::HumanVsAi).unwrap();

    write_back(client, &mut settings, &path).unwrap();
    assert_eq!(client.state().link, LinkState::Disconnected);
    assert_eq!(device.close_count(), 1);

    let reloaded = ClientConfig::from_file(&path).unwrap();
    assert_eq!(reloaded.game.default_mode, GameMode::HumanVsAi);
    assert_eq!(reloaded.serial.baud_rate, 19200);
}

#[test]
fn test_settings_write_back_after_link_lost() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tictactoe.yaml");
    let mut settings = ClientConfig::load_or_create(&path).unwrap();

    let device = ScriptedDevice::firmware("SIM0");
    let server = server(device.clone());
    let client = server.client();
    client.connect("SIM0", 57600).unwrap();
    client.set_mode(GameMode::AiVsAi).unwrap();
    client.disconnect();

    // Shutting down with the link already gone still saves the session
    write_back(client, &mut settings, &path).unwrap();
    assert_eq!(device.close_count(), 1);

    let reloaded = ClientConfig::from_file(&path).unwrap();
    assert_eq!(reloaded.game.default_mode, GameMode::AiVsAi);
    assert_eq!(reloaded.serial.baud_rate, 57600);
}

#[tokio::test]
async fn test_wait_for_update_sees_ai_move() {
    let device = ScriptedDevice::firmware("SIM0");
    let server = server(device.clone());
    let client = server.client().clone();

    tokio::task::spawn_blocking({
        let client = client.clone();
        move || {
            client.connect("SIM0", 9600).unwrap();
            client.set_mode(GameMode::AiVsAi).unwrap();
        }
    })
    .await
    .unwrap();

    let mut events = client.subscribe();
    device.push_line("BOARD:100000000:CONTINUE");

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        SessionEvent::StateChanged { state } => {
            assert_eq!(state.board.marked_count(), 1);
            assert_eq!(state.outcome, GameOutcome::InProgress);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    tokio::task::spawn_blocking(move || client.disconnect())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_disconnect_from_async_context_closes_link() {
    let device = ScriptedDevice::firmware("SIM0");
    let server = server(device.clone());
    let client = server.client().clone();

    tokio::task::spawn_blocking({
        let client = client.clone();
        move || client.connect("SIM0", 9600)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(client.state().link, LinkState::Connected);

    tokio::task::spawn_blocking({
        let client = client.clone();
        move || client.disconnect()
    })
    .await
    .unwrap();

    assert_eq!(client.state().link, LinkState::Disconnected);
    assert_eq!(device.close_count(), 1);
}
