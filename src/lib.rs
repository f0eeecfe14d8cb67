//! # Blazium Lobby Client
//!
//! Polling Rust client for the Blazium lobby matchmaking protocol.
//!
//! The client keeps one socket to a lobby server and tracks the local peer's
//! membership in a lobby: the lobby itself, its roster, and the public and
//! private data stores attached to both. Server pushes and responses to the
//! client's own commands share the socket; responses are matched to commands
//! by correlation id.
//!
//! ## Features
//!
//! - **Tick driven**: call [`LobbyClient::poll`] from the game loop; nothing
//!   runs behind your back
//! - **Typed handles**: every operation returns a [`LobbyResponse`] that can
//!   be polled or awaited and completes exactly once
//! - **Typed events**: lobby and peer changes arrive as [`LobbyEvent`]s on a
//!   bounded channel
//! - **Transport-agnostic**: implement [`Transport`] for any duplex text
//!   channel; the default `transport-websocket` feature provides
//!   [`WebSocketTransport`]
//! - **One engine, several servers**: [`Capabilities`] cover the standard,
//!   authoritative and scripted lobby servers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blazium_lobby_client::{
//!     CreateLobbyParams, LobbyClient, LobbyConfig, LobbyEvent, LobbyResponse, ViewLobbyResult,
//!     WebSocketTransport,
//! };
//!
//! let (mut client, mut events) =
//!     LobbyClient::new(WebSocketTransport::new(), LobbyConfig::new("my-game"));
//! client.connect_to_lobby()?;
//!
//! // Create the lobby once the server has assigned our peer.
//! let mut created: Option<LobbyResponse<ViewLobbyResult>> = None;
//! loop {
//!     client.poll();
//!     while let Ok(event) = events.try_recv() {
//!         if let LobbyEvent::ConnectedToLobby { .. } = event {
//!             created = Some(client.create_lobby(CreateLobbyParams::new("Arena")));
//!         }
//!     }
//!     if let Some(result) = created.as_mut().and_then(LobbyResponse::try_result) {
//!         println!("{result:?}");
//!         break;
//!     }
//! }
//! ```

pub mod client;
mod dispatcher;
pub mod environment;
pub mod error;
pub mod event;
pub mod model;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{
    Capabilities, ConnectionState, CreateLobbyParams, ListLobbyParams, LobbyClient, LobbyConfig,
};
pub use environment::{EnvironmentResolver, NoEnvironment, StaticEnvironment};
pub use error::LobbyError;
pub use event::LobbyEvent;
pub use model::{LobbyInfo, LobbyModel, LobbyPeer};
pub use pending::{CommandKind, LobbyResponse, ViewLobbyResult};
pub use protocol::{ClientCommand, JsonMap, ServerFrame};
pub use transport::{ReadyState, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
