//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] trait with an in-process fake
//! lobby server. This is useful for:
//!
//! - **Testing** — exercise your game logic without a real server
//! - **Custom backends** — adapt any I/O layer (TCP, QUIC, WebRTC data channels)
//!
//! The client never blocks on the transport, so the whole example runs on a
//! plain thread without an async runtime.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::collections::VecDeque;

use blazium_lobby_client::error::LobbyError;
use blazium_lobby_client::protocol::parse_command;
use blazium_lobby_client::{
    ClientCommand, CreateLobbyParams, LobbyClient, LobbyConfig, LobbyEvent, ReadyState, Transport,
};
use serde_json::{json, Value};

// ─────────────────────────────────────────────────────────────────────
// Step 1: A transport that answers like a tiny lobby server
// ─────────────────────────────────────────────────────────────────────

/// Loopback transport: every frame the client sends is handled in-process
/// and the replies are queued for the next poll.
#[derive(Default)]
struct LoopbackTransport {
    state: ReadyState,
    inbox: VecDeque<String>,
    lobbies_created: u32,
}

impl LoopbackTransport {
    fn reply(&mut self, frame: Value) {
        self.inbox.push_back(frame.to_string());
    }

    fn handle(&mut self, id: &str, command: ClientCommand) {
        match command {
            ClientCommand::CreateLobby {
                name, max_players, ..
            } => {
                self.lobbies_created += 1;
                let lobby_id = format!("L{}", self.lobbies_created);
                self.reply(json!({
                    "command": "lobby_created",
                    "data": {
                        "id": id,
                        "lobby": {
                            "id": lobby_id,
                            "name": name,
                            "host": "local",
                            "host_name": "Local",
                            "max_players": max_players,
                        },
                        "peers": [{"id": "local", "name": "Local"}]
                    }
                }));
            }
            ClientCommand::ChatLobby { chat } => {
                self.reply(json!({
                    "command": "peer_chat",
                    "data": {"id": id, "from_peer": "local", "chat_data": chat}
                }));
            }
            other => {
                self.reply(json!({
                    "command": "error",
                    "message": format!("{} is not supported here", other.name()),
                    "data": {"id": id}
                }));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

impl Transport for LoopbackTransport {
    fn connect(&mut self, url: &str, protocols: &[String]) -> Result<(), LobbyError> {
        tracing::info!("loopback connect to {url} offering {protocols:?}");
        self.state = ReadyState::Open;
        self.reply(json!({
            "command": "peer_state",
            "data": {"peer": {"id": "local", "name": "Local", "reconnection_token": "loopback"}}
        }));
        Ok(())
    }

    fn poll(&mut self) {}

    fn ready_state(&self) -> ReadyState {
        self.state
    }

    fn available_message_count(&self) -> usize {
        self.inbox.len()
    }

    fn next_message(&mut self) -> Option<String> {
        self.inbox.pop_front()
    }

    fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.state != ReadyState::Open {
            return Err(LobbyError::TransportClosed);
        }
        let (id, command) = parse_command(&message)?;
        self.handle(&id, command);
        Ok(())
    }

    fn close(&mut self, _code: u16, _reason: &str) {
        self.state = ReadyState::Closed;
    }

    fn close_reason(&self) -> Option<String> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Drive the client
// ─────────────────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = LobbyConfig::new("loopback-game").with_server_url("loopback://local");
    let (mut client, mut event_rx) = LobbyClient::new(LoopbackTransport::default(), config);
    client.connect_to_lobby()?;

    // First poll sees the socket open and the assigned peer.
    client.poll();

    let mut create = client.create_lobby(CreateLobbyParams::new("Loopback lobby"));
    client.poll();
    let view = create.try_result().ok_or("no reply to create_lobby")??;
    tracing::info!("created {} hosted by {}", view.lobby.id, view.lobby.host_name);

    drop(client.lobby_chat("hello from the loopback"));
    let mut kick = client.kick_peer("nobody");
    client.poll();
    if let Some(Err(err)) = kick.try_result() {
        tracing::info!("kick failed as expected: {err}");
    }

    client.disconnect_from_lobby();

    while let Ok(event) = event_rx.try_recv() {
        match event {
            LobbyEvent::Log { command, message } => tracing::debug!("{command}: {message}"),
            other => tracing::info!("event: {other:?}"),
        }
    }
    Ok(())
}
