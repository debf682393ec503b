//! # tictactoe-link MCP Server
//!
//! Model Context Protocol server that lets AI agents play tic-tac-toe against
//! a microcontroller over a serial link.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Link management (list ports, connect, disconnect, raw traffic)
//! - Game control (set mode, move, reset)
//! - State observation (current state, wait for the next update)
//!
//! ## Architecture
//!
//! This is the top layer - the MCP server binary that ties together:
//! - tictactoe-link-core: Core types, codec and settings
//! - tictactoe-link-transport: Serial link
//! - tictactoe-link-session: Session state machine and tickers

use std::path::PathBuf;

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use tictactoe_link::{write_back, TicTacToeLinkServer};
use tictactoe_link_core::ClientConfig;
use tictactoe_link_session::SessionClientConfig;

const DEFAULT_CONFIG_PATH: &str = "tictactoe.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| {
            args.get(i + 1)
                .map(PathBuf::from)
                .context("--config requires a path")
        })
        .transpose()?
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut settings = ClientConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    // Initialize logging; stdout carries the MCP stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "tictactoe-link v{} starting (settings: {})",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let server = TicTacToeLinkServer::new(SessionClientConfig::from(&settings));
    let client = server.client().clone();

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("tictactoe-link running on stdio");

    // Wait for the service to complete; settings are saved either way
    let served = service.waiting().await;

    tracing::info!("tictactoe-link shutting down");

    let saved = tokio::task::spawn_blocking(move || {
        write_back(&client, &mut settings, &config_path)
    })
    .await;
    match saved {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to save settings: {}", e),
        Err(e) => tracing::warn!("Settings write-back task failed: {}", e),
    }

    served?;
    Ok(())
}
