#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for lobby client integration tests.
//!
//! Provides a polled [`MockTransport`] whose socket is scripted from the test
//! through a [`MockHandle`], and helpers for building server frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use blazium_lobby_client::error::LobbyError;
use blazium_lobby_client::protocol::parse_command;
use blazium_lobby_client::{
    ClientCommand, LobbyClient, LobbyConfig, LobbyEvent, ReadyState, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// Socket state shared between the transport and its handle.
#[derive(Debug, Default)]
pub struct MockSocket {
    pub ready: ReadyState,
    pub inbox: VecDeque<String>,
    pub sent: Vec<String>,
    pub connects: Vec<(String, Vec<String>)>,
    pub closes: Vec<(u16, String)>,
    pub close_reason: Option<String>,
    pub fail_connect: bool,
    pub fail_send: bool,
}

/// A transport that never touches the network.
///
/// `connect` moves it to `Connecting`; the test decides when the socket
/// opens, what the server says and when it hangs up.
#[derive(Debug)]
pub struct MockTransport {
    socket: Arc<StdMutex<MockSocket>>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    socket: Arc<StdMutex<MockSocket>>,
}

impl MockTransport {
    /// Create a transport and the handle used to script it.
    pub fn new() -> (Self, MockHandle) {
        let socket = Arc::new(StdMutex::new(MockSocket::default()));
        (
            Self {
                socket: Arc::clone(&socket),
            },
            MockHandle { socket },
        )
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, url: &str, protocols: &[String]) -> Result<(), LobbyError> {
        let mut socket = self.socket.lock().unwrap();
        socket.connects.push((url.to_string(), protocols.to_vec()));
        if socket.fail_connect {
            return Err(LobbyError::TransportConnect("connection refused".into()));
        }
        socket.ready = ReadyState::Connecting;
        socket.close_reason = None;
        socket.inbox.clear();
        Ok(())
    }

    fn poll(&mut self) {}

    fn ready_state(&self) -> ReadyState {
        self.socket.lock().unwrap().ready
    }

    fn available_message_count(&self) -> usize {
        self.socket.lock().unwrap().inbox.len()
    }

    fn next_message(&mut self) -> Option<String> {
        self.socket.lock().unwrap().inbox.pop_front()
    }

    fn send(&mut self, message: String) -> Result<(), LobbyError> {
        let mut socket = self.socket.lock().unwrap();
        if socket.ready != ReadyState::Open {
            return Err(LobbyError::TransportClosed);
        }
        if socket.fail_send {
            return Err(LobbyError::TransportSend("broken pipe".into()));
        }
        socket.sent.push(message);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut socket = self.socket.lock().unwrap();
        socket.closes.push((code, reason.to_string()));
        socket.ready = ReadyState::Closed;
    }

    fn close_reason(&self) -> Option<String> {
        self.socket.lock().unwrap().close_reason.clone()
    }
}

impl MockHandle {
    /// Complete the opening handshake.
    pub fn open(&self) {
        self.socket.lock().unwrap().ready = ReadyState::Open;
    }

    /// Queue a frame from the server.
    pub fn push(&self, frame: Value) {
        self.socket.lock().unwrap().inbox.push_back(frame.to_string());
    }

    /// Queue raw text from the server, valid JSON or not.
    pub fn push_text(&self, text: &str) {
        self.socket.lock().unwrap().inbox.push_back(text.to_string());
    }

    /// Simulate the server closing the connection.
    pub fn close_remote(&self, reason: Option<&str>) {
        let mut socket = self.socket.lock().unwrap();
        socket.ready = ReadyState::Closed;
        socket.close_reason = reason.map(str::to_string);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.socket.lock().unwrap().fail_connect = fail;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.socket.lock().unwrap().fail_send = fail;
    }

    pub fn ready_state(&self) -> ReadyState {
        self.socket.lock().unwrap().ready
    }

    /// Raw frames sent by the client.
    pub fn sent(&self) -> Vec<String> {
        self.socket.lock().unwrap().sent.clone()
    }

    /// Frames sent by the client, parsed as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Frames sent by the client, decoded into commands.
    pub fn sent_commands(&self) -> Vec<(String, ClientCommand)> {
        self.sent().iter().map(|text| parse_command(text).unwrap()).collect()
    }

    /// The last frame sent, parsed as JSON.
    pub fn last_sent(&self) -> Value {
        self.sent_json().pop().expect("nothing was sent")
    }

    /// `(url, protocols)` of every connect call.
    pub fn connects(&self) -> Vec<(String, Vec<String>)> {
        self.socket.lock().unwrap().connects.clone()
    }

    /// `(code, reason)` of every local close call.
    pub fn closes(&self) -> Vec<(u16, String)> {
        self.socket.lock().unwrap().closes.clone()
    }
}

// ── Client helpers ──────────────────────────────────────────────────

pub type TestClient = LobbyClient<MockTransport>;

/// A client that has connected and seen the socket open. Startup events are
/// drained.
pub fn connected_client(config: LobbyConfig) -> (TestClient, mpsc::Receiver<LobbyEvent>, MockHandle) {
    let (transport, handle) = MockTransport::new();
    let (mut client, mut events) = LobbyClient::new(transport, config);
    client.connect_to_lobby().unwrap();
    handle.open();
    client.poll();
    assert!(client.is_connected());
    drain(&mut events);
    (client, events, handle)
}

/// A connected client that has been assigned peer `P1` and created lobby
/// `L1` with `P1` as the only member.
pub fn hosting_client(config: LobbyConfig) -> (TestClient, mpsc::Receiver<LobbyEvent>, MockHandle) {
    let (mut client, mut events, handle) = connected_client(config);
    handle.push(peer_state("P1", "Host", "tok-1"));
    handle.push(json!({
        "command": "lobby_created",
        "data": {
            "lobby": lobby_json("L1", "Arena", "P1"),
            "peers": [{"id": "P1", "name": "Host"}]
        }
    }));
    client.poll();
    drain(&mut events);
    (client, events, handle)
}

/// Everything currently buffered on the event channel.
pub fn drain(events: &mut mpsc::Receiver<LobbyEvent>) -> Vec<LobbyEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Events with the diagnostic `Log` entries filtered out.
pub fn without_logs(events: Vec<LobbyEvent>) -> Vec<LobbyEvent> {
    events
        .into_iter()
        .filter(|e| !matches!(e, LobbyEvent::Log { .. }))
        .collect()
}

/// The `Log` entries as `(command, message)` pairs.
pub fn logs(events: &[LobbyEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            LobbyEvent::Log { command, message } => Some((command.clone(), message.clone())),
            _ => None,
        })
        .collect()
}

// ── Server frames ───────────────────────────────────────────────────

pub fn frame(command: &str, data: Value) -> Value {
    json!({ "command": command, "data": data })
}

pub fn lobby_json(id: &str, name: &str, host: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "host": host,
        "host_name": "Host",
        "max_players": 4,
        "sealed": false,
        "has_password": false,
        "tags": {},
    })
}

pub fn peer_state(id: &str, name: &str, token: &str) -> Value {
    frame(
        "peer_state",
        json!({ "peer": { "id": id, "name": name, "reconnection_token": token } }),
    )
}

pub fn peer_joined(id: &str, name: &str) -> Value {
    frame("peer_joined", json!({ "peer": { "id": id, "name": name } }))
}

/// Reply to the command `id` with a bare acknowledgement.
pub fn ack(command: &str, id: &str) -> Value {
    frame(command, json!({ "id": id }))
}

pub fn error_frame(id: &str, message: &str) -> Value {
    json!({ "command": "error", "message": message, "data": { "id": id } })
}
