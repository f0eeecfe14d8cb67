//! # Basic Lobby Example
//!
//! Demonstrates a complete lobby client lifecycle over WebSocket:
//!
//! 1. Connect to a Blazium lobby server
//! 2. Wait for the server to assign the local peer
//! 3. Create a lobby and mark ourselves ready
//! 4. React to lobby events (peers joining, chat, ready state)
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! The client is tick-driven: the loop below calls `poll()` every 50 ms, the
//! way a game would from its frame update.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example basic_lobby
//!
//! # Override the server URL and game id:
//! LOBBY_URL=ws://localhost:8080/connect LOBBY_GAME_ID=my-game cargo run --example basic_lobby
//! ```

use std::time::Duration;

use blazium_lobby_client::{
    CreateLobbyParams, LobbyClient, LobbyConfig, LobbyEvent, LobbyResponse, ViewLobbyResult,
    WebSocketTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let game_id = std::env::var("LOBBY_GAME_ID").unwrap_or_else(|_| "example-game".to_string());
    let mut config = LobbyConfig::new(game_id);
    if let Ok(url) = std::env::var("LOBBY_URL") {
        config = config.with_server_url(url);
    }

    // ── Connect ─────────────────────────────────────────────────────
    let (mut client, mut event_rx) = LobbyClient::new(WebSocketTransport::new(), config);
    client.connect_to_lobby()?;

    let mut create: Option<LobbyResponse<ViewLobbyResult>> = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    // ── Tick loop ───────────────────────────────────────────────────
    'outer: loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }

        client.poll();

        if let Some(result) = create.as_mut().and_then(LobbyResponse::try_result) {
            create = None;
            match result {
                Ok(view) => {
                    tracing::info!(
                        "Created lobby {} ({}/{} players)",
                        view.lobby.id,
                        view.lobby.players,
                        view.lobby.max_players
                    );
                    // Fire and forget: the peer_ready event confirms it.
                    drop(client.lobby_ready(true));
                }
                Err(err) => {
                    tracing::error!("Could not create lobby: {err}");
                    break;
                }
            }
        }

        while let Ok(event) = event_rx.try_recv() {
            match event {
                LobbyEvent::ConnectedToLobby { peer, .. } => {
                    tracing::info!("Assigned peer id {}", peer.id);
                    create = Some(client.create_lobby(
                        CreateLobbyParams::new("Rust example lobby").with_max_players(4),
                    ));
                }
                LobbyEvent::PeerJoined { peer } => {
                    tracing::info!("Peer joined: {} ({})", peer.name, peer.id);
                }
                LobbyEvent::PeerLeft { peer, kicked } => {
                    tracing::info!("Peer left: {} (kicked={kicked})", peer.id);
                }
                LobbyEvent::PeerReady { peer, ready } => {
                    tracing::info!("{} ready={ready}", peer.name);
                }
                LobbyEvent::PeerMessaged { peer, chat } => {
                    tracing::info!("[{}] {chat}", peer.name);
                }
                LobbyEvent::DisconnectedFromLobby { reason } => {
                    tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                    break 'outer;
                }
                LobbyEvent::Log { command, message } => {
                    tracing::debug!("{command}: {message}");
                }
                other => {
                    tracing::debug!("Event: {other:?}");
                }
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.disconnect_from_lobby();
    client.poll();
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}
