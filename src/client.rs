//! Tick-driven client for the Blazium lobby protocol.
//!
//! [`LobbyClient`] owns a polled [`Transport`], the local lobby model and the
//! table of outstanding commands. Nothing happens in the background: the host
//! application calls [`LobbyClient::poll`] once per frame (or on a timer), and
//! each call reads every buffered frame, updates the model, completes
//! [`LobbyResponse`] handles and pushes [`LobbyEvent`]s onto the bounded
//! channel returned from [`LobbyClient::new`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = LobbyConfig::new("my-game");
//! let (mut client, mut events) = LobbyClient::new(WebSocketTransport::new(), config);
//! client.connect_to_lobby()?;
//!
//! let mut created = None;
//! loop {
//!     client.poll();
//!     while let Ok(event) = events.try_recv() {
//!         if let LobbyEvent::ConnectedToLobby { .. } = event {
//!             created = Some(client.create_lobby(CreateLobbyParams::new("Arena")));
//!         }
//!     }
//!     if let Some(Some(result)) = created.as_mut().map(LobbyResponse::try_result) {
//!         println!("lobby: {:?}", result?.lobby.id);
//!         break;
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::environment::{discord_proxy_url, EnvironmentResolver, NoEnvironment};
use crate::error::{LobbyError, Result};
use crate::event::{EventSink, LobbyEvent};
use crate::model::{LobbyInfo, LobbyModel, LobbyPeer};
use crate::pending::{
    response_channel, LobbyResponse, PendingTable, Responder, ResponseShape, ViewLobbyResult,
};
use crate::protocol::{
    decode_frame, encode_command, null_keys, ClientCommand, CommandId, JsonMap, LobbyFilter,
    ERROR_COMMAND,
};
use crate::transport::{ReadyState, Transport, NORMAL_CLOSURE};

/// Public lobby server.
pub const DEFAULT_LOBBY_URL: &str = "wss://lobby.blazium.app/connect";

/// Lobby server for authoritative (server-scripted) lobbies.
pub const DEFAULT_AUTHORITATIVE_URL: &str = "wss://authlobby.blazium.app/connect";

/// Discord proxy path of the scripted lobby server.
pub const DEFAULT_SCRIPTED_DISCORD_PATH: &str = "blazium/scriptedlobby/connect";

/// First subprotocol offered on every connection.
pub const PROTOCOL_TAG: &str = "blazium";

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default time a command may wait for its response.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `max_players` for [`CreateLobbyParams`].
const DEFAULT_MAX_PLAYERS: u32 = 4;

/// Default page size for [`ListLobbyParams`].
const DEFAULT_LIST_COUNT: u32 = 10;

// ── Configuration ───────────────────────────────────────────────────

/// Optional protocol features, which differ between lobby server flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Server-side functions can be invoked with [`LobbyClient::lobby_call`].
    pub rpc_calls: bool,
    /// The server keeps private host and peer data stores.
    pub private_data: bool,
    /// Dropped peers keep their slot and are flagged instead of removed.
    pub soft_disconnect: bool,
    /// Quick join, sealed creation and the host settings commands
    /// (password, title, capacity).
    pub lobby_settings: bool,
}

impl Capabilities {
    /// The public lobby server.
    pub const fn standard() -> Self {
        Self {
            rpc_calls: false,
            private_data: true,
            soft_disconnect: false,
            lobby_settings: false,
        }
    }

    /// Authoritative lobbies run server-side functions.
    pub const fn authoritative() -> Self {
        Self {
            rpc_calls: true,
            private_data: false,
            soft_disconnect: false,
            lobby_settings: false,
        }
    }

    /// Scripted lobbies run server-side functions, hold seats for
    /// reconnecting peers and let the host edit lobby settings.
    pub const fn scripted() -> Self {
        Self {
            rpc_calls: true,
            private_data: false,
            soft_disconnect: true,
            lobby_settings: true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::standard()
    }
}

/// Configuration for a [`LobbyClient`].
///
/// # Example
///
/// ```
/// use blazium_lobby_client::client::{LobbyConfig, DEFAULT_LOBBY_URL};
///
/// let config = LobbyConfig::new("my-game");
/// assert_eq!(config.game_id, "my-game");
/// assert_eq!(config.server_url, DEFAULT_LOBBY_URL);
/// assert!(config.capabilities.private_data);
/// ```
///
/// # Tuning
///
/// ```
/// use blazium_lobby_client::client::LobbyConfig;
/// use std::time::Duration;
///
/// let config = LobbyConfig::authoritative("my-game")
///     .with_reconnection_token("tok")
///     .with_event_channel_capacity(512)
///     .with_command_timeout(Some(Duration::from_secs(5)));
/// assert!(config.capabilities.rpc_calls);
/// ```
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// WebSocket URL of the lobby server.
    pub server_url: String,
    /// Game id offered as the second subprotocol.
    pub game_id: String,
    /// Token offered as the third subprotocol to resume a seat. Empty for a
    /// fresh session.
    pub reconnection_token: String,
    /// Protocol features the server supports.
    pub capabilities: Capabilities,
    /// Path behind the Discord URL proxy. When set and the environment
    /// reports a Discord client id, the client connects through the proxy
    /// instead of `server_url`.
    pub discord_path: Option<String>,
    /// Host environment lookups.
    pub environment: Arc<dyn EnvironmentResolver>,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped (with a warning logged) when the consumer falls
    /// behind. Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long a command may wait for its response before it is rejected
    /// with [`LobbyError::Timeout`]. `None` waits forever.
    ///
    /// Defaults to **30 seconds**.
    pub command_timeout: Option<Duration>,
}

impl LobbyConfig {
    /// Configuration for the public lobby server.
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            server_url: DEFAULT_LOBBY_URL.to_string(),
            game_id: game_id.into(),
            reconnection_token: String::new(),
            capabilities: Capabilities::standard(),
            discord_path: None,
            environment: Arc::new(NoEnvironment),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }

    /// Configuration for the authoritative lobby server.
    pub fn authoritative(game_id: impl Into<String>) -> Self {
        Self {
            server_url: DEFAULT_AUTHORITATIVE_URL.to_string(),
            capabilities: Capabilities::authoritative(),
            ..Self::new(game_id)
        }
    }

    /// Configuration for scripted lobbies, reachable through the Discord proxy
    /// when embedded in an activity.
    pub fn scripted(game_id: impl Into<String>) -> Self {
        Self {
            capabilities: Capabilities::scripted(),
            discord_path: Some(DEFAULT_SCRIPTED_DISCORD_PATH.to_string()),
            ..Self::new(game_id)
        }
    }

    /// Set the server URL.
    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the reconnection token offered on the first connection.
    #[must_use]
    pub fn with_reconnection_token(mut self, token: impl Into<String>) -> Self {
        self.reconnection_token = token.into();
        self
    }

    /// Override the capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the path used behind the Discord URL proxy.
    #[must_use]
    pub fn with_discord_path(mut self, path: impl Into<String>) -> Self {
        self.discord_path = Some(path.into());
        self
    }

    /// Set the environment resolver.
    #[must_use]
    pub fn with_environment(mut self, environment: impl EnvironmentResolver + 'static) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the per-command response timeout. `None` disables it.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// The URL the next connection attempt will use.
    pub fn resolve_url(&self) -> String {
        let discord_id = self
            .discord_path
            .as_ref()
            .and_then(|path| Some((path, self.environment.discord_client_id()?)));
        match discord_id {
            Some((path, client_id)) => discord_proxy_url(&client_id, path),
            None => self.server_url.clone(),
        }
    }
}

// ── Operation parameters ────────────────────────────────────────────

/// Parameters for [`LobbyClient::create_lobby`].
///
/// # Example
///
/// ```
/// use blazium_lobby_client::client::CreateLobbyParams;
///
/// let params = CreateLobbyParams::new("Arena").with_max_players(8);
/// assert_eq!(params.name, "Arena");
/// assert_eq!(params.max_players, 8);
/// assert!(params.password.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CreateLobbyParams {
    /// Lobby display name.
    pub name: String,
    /// Searchable tags.
    pub tags: JsonMap,
    /// Capacity. Defaults to 4.
    pub max_players: u32,
    /// Join password. Empty for an open lobby.
    pub password: String,
    /// Create the lobby sealed. Needs [`Capabilities::lobby_settings`].
    pub sealed: bool,
}

impl CreateLobbyParams {
    /// Parameters for a lobby named `name` with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: JsonMap::new(),
            max_players: DEFAULT_MAX_PLAYERS,
            password: String::new(),
            sealed: false,
        }
    }

    /// Set the lobby tags.
    #[must_use]
    pub fn with_tags(mut self, tags: JsonMap) -> Self {
        self.tags = tags;
        self
    }

    /// Set the capacity.
    #[must_use]
    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }

    /// Require a password to join.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Start the lobby sealed.
    #[must_use]
    pub fn with_sealed(mut self, sealed: bool) -> Self {
        self.sealed = sealed;
        self
    }
}

/// Parameters for [`LobbyClient::list_lobby`]. Defaults to the first 10
/// lobbies, unfiltered.
#[derive(Debug, Clone, PartialEq)]
pub struct ListLobbyParams {
    /// Only list lobbies carrying these tags.
    pub tags: JsonMap,
    /// Offset of the first lobby.
    pub start: u32,
    /// Page size.
    pub count: u32,
}

impl Default for ListLobbyParams {
    fn default() -> Self {
        Self {
            tags: JsonMap::new(),
            start: 0,
            count: DEFAULT_LIST_COUNT,
        }
    }
}

impl ListLobbyParams {
    /// Filter by tags.
    #[must_use]
    pub fn with_tags(mut self, tags: JsonMap) -> Self {
        self.tags = tags;
        self
    }

    /// Select a page.
    #[must_use]
    pub fn with_page(mut self, start: u32, count: u32) -> Self {
        self.start = start;
        self.count = count;
        self
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection, or the last one closed.
    #[default]
    Disconnected,
    /// The transport is opening.
    Connecting,
    /// The transport is open and commands can be sent.
    Connected,
}

/// Client for one lobby session over a polled [`Transport`].
///
/// Every lobby operation returns a [`LobbyResponse`] immediately; its outcome
/// arrives during a later [`poll`](Self::poll). Operations issued while not
/// connected are completed with [`LobbyError::NotConnected`] on the next poll
/// and send nothing.
///
/// Correlation ids come from a counter that starts at `0` and is never reset
/// for the lifetime of the client, across reconnects included.
pub struct LobbyClient<T: Transport> {
    transport: T,
    config: LobbyConfig,
    state: ConnectionState,
    url: String,
    next_id: u64,
    model: LobbyModel,
    pending: PendingTable,
    /// Completions delivered at the start of the next poll.
    deferred: VecDeque<(Responder, LobbyError)>,
    events: EventSink,
}

impl<T: Transport> LobbyClient<T> {
    /// Create a client over `transport` and return it with the event
    /// receiver.
    ///
    /// Nothing is sent until [`connect_to_lobby`](Self::connect_to_lobby).
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(transport: T, config: LobbyConfig) -> (Self, mpsc::Receiver<LobbyEvent>) {
        let (events, event_rx) = EventSink::channel(config.event_channel_capacity);
        let model = LobbyModel::new(config.reconnection_token.clone());
        let client = Self {
            transport,
            url: String::new(),
            config,
            state: ConnectionState::Disconnected,
            next_id: 0,
            model,
            pending: PendingTable::new(),
            deferred: VecDeque::new(),
            events,
        };
        (client, event_rx)
    }

    // ── Connection ──────────────────────────────────────────────────

    /// Start connecting to the lobby server.
    ///
    /// Offers the subprotocols `["blazium", game_id, reconnection_token]`,
    /// the token only when non-empty. `Ok` means the attempt started; the
    /// client becomes [`Connected`](ConnectionState::Connected) on the poll
    /// that first sees the transport open. Calling this while connecting or
    /// connected does nothing.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the attempt cannot start.
    pub fn connect_to_lobby(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect_to_lobby ignored, already active");
            return Ok(());
        }

        let url = self.config.resolve_url();
        let mut protocols = vec![PROTOCOL_TAG.to_string(), self.config.game_id.clone()];
        if !self.model.reconnection_token.is_empty() {
            protocols.push(self.model.reconnection_token.clone());
        }

        match self.transport.connect(&url, &protocols) {
            Ok(()) => {
                info!(url = %url, "connecting to lobby server");
                self.events
                    .log("connect_to_lobby", format!("Connecting to: {url}"));
                self.state = ConnectionState::Connecting;
                self.url = url;
                Ok(())
            }
            Err(err) => {
                error!(url = %url, error = %err, "unable to connect to lobby server");
                self.events.log(
                    ERROR_COMMAND,
                    format!("Unable to connect to lobby server at: {url}"),
                );
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Close the connection and reset all lobby state.
    ///
    /// Outstanding commands are rejected with [`LobbyError::Disconnected`]
    /// and a [`LobbyEvent::DisconnectedFromLobby`] is raised. Does nothing
    /// when already disconnected.
    pub fn disconnect_from_lobby(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!(url = %self.url, "disconnecting from lobby server");
        self.transport.close(NORMAL_CLOSURE, "Normal Closure");
        self.end_session(None);
    }

    /// Drive the client: deliver deferred completions, read the transport,
    /// dispatch every buffered frame in arrival order and expire overdue
    /// commands.
    pub fn poll(&mut self) {
        self.flush_deferred();
        if self.state == ConnectionState::Disconnected {
            return;
        }

        self.transport.poll();
        let ready_state = self.transport.ready_state();

        if ready_state == ReadyState::Open && self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            info!(url = %self.url, "connected to lobby server");
            self.events
                .log("connect_to_lobby", format!("Connected to: {}", self.url));
        }

        if self.state == ConnectionState::Connected {
            while self.transport.available_message_count() > 0 {
                let Some(text) = self.transport.next_message() else {
                    break;
                };
                self.dispatch(&text);
            }
        }

        if ready_state == ReadyState::Closed {
            let reason = self.transport.close_reason();
            warn!(url = %self.url, reason = ?reason, "lobby connection closed");
            self.events
                .log(ERROR_COMMAND, reason.clone().unwrap_or_default());
            self.end_session(reason);
            return;
        }

        for id in self.pending.expire(Instant::now()) {
            warn!(id = %id, "lobby command timed out");
        }
    }

    fn dispatch(&mut self, text: &str) {
        let frame = decode_frame(text);
        Dispatcher {
            model: &mut self.model,
            pending: &mut self.pending,
            events: &self.events,
            capabilities: self.config.capabilities,
        }
        .dispatch(frame);
    }

    fn end_session(&mut self, reason: Option<String>) {
        self.state = ConnectionState::Disconnected;
        self.model.clear();
        if !self.pending.is_empty() {
            let rejected = self.pending.reject_all(|| LobbyError::Disconnected);
            debug!(count = rejected, "rejected outstanding lobby commands");
        }
        self.events
            .emit(LobbyEvent::DisconnectedFromLobby { reason });
    }

    fn flush_deferred(&mut self) {
        while let Some((responder, err)) = self.deferred.pop_front() {
            responder.reject(err);
        }
    }

    // ── Command plumbing ────────────────────────────────────────────

    fn allocate_id(&mut self) -> CommandId {
        let id = self.next_id.to_string();
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Send `command` and return the handle for its response.
    fn request<R: ResponseShape>(&mut self, command: ClientCommand) -> LobbyResponse<R> {
        let id = self.allocate_id();
        let (responder, response) = response_channel::<R>(id.clone());

        if self.state != ConnectionState::Connected {
            debug!(command = command.name(), id = %id, "lobby client not connected");
            self.events.log(ERROR_COMMAND, "Socket is not ready.");
            self.deferred.push_back((responder, LobbyError::NotConnected));
            return response;
        }

        let text = match encode_command(&id, &command) {
            Ok(text) => text,
            Err(err) => {
                error!(command = command.name(), error = %err, "failed to encode lobby command");
                self.deferred.push_back((responder, err));
                return response;
            }
        };

        let deadline = self
            .config
            .command_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        self.pending.register(id.clone(), responder, deadline);
        debug!(command = command.name(), id = %id, "sending lobby command");

        if let Err(err) = self.transport.send(text) {
            warn!(command = command.name(), error = %err, "lobby send failed, closing");
            self.events.log(ERROR_COMMAND, "No longer connected.");
            self.transport.close(NORMAL_CLOSURE, "Disconnected");
            if let Some(responder) = self.pending.take(&id) {
                self.deferred.push_back((responder, err));
            }
        }
        response
    }

    /// Return a handle that fails with `err` on the next poll.
    fn reject_later<R: ResponseShape>(&mut self, err: LobbyError) -> LobbyResponse<R> {
        let (responder, response) = response_channel::<R>(self.allocate_id());
        self.deferred.push_back((responder, err));
        response
    }

    fn private_unsupported(&self, is_private: bool) -> bool {
        is_private && !self.config.capabilities.private_data
    }

    // ── Lobby operations ────────────────────────────────────────────

    /// Create a lobby and join it as host.
    ///
    /// A sealed creation requires [`Capabilities::lobby_settings`].
    pub fn create_lobby(&mut self, params: CreateLobbyParams) -> LobbyResponse<ViewLobbyResult> {
        if params.sealed && !self.config.capabilities.lobby_settings {
            return self.reject_later(LobbyError::Unsupported("sealed lobby creation"));
        }
        self.request(ClientCommand::CreateLobby {
            name: params.name,
            max_players: params.max_players,
            password: params.password,
            tags: params.tags,
            sealed: params.sealed,
        })
    }

    /// Join the first open lobby matching `tags`, or have the server create
    /// one named `name` with room for `max_players`.
    ///
    /// Requires [`Capabilities::lobby_settings`].
    pub fn quick_join(
        &mut self,
        name: impl Into<String>,
        tags: JsonMap,
        max_players: u32,
    ) -> LobbyResponse<ViewLobbyResult> {
        if !self.config.capabilities.lobby_settings {
            return self.reject_later(LobbyError::Unsupported("quick_join"));
        }
        self.request(ClientCommand::QuickJoin {
            name: name.into(),
            tags,
            max_players,
        })
    }

    /// Join the lobby `lobby_id`. Pass an empty password for open lobbies.
    pub fn join_lobby(
        &mut self,
        lobby_id: impl Into<String>,
        password: impl Into<String>,
    ) -> LobbyResponse<ViewLobbyResult> {
        self.request(ClientCommand::JoinLobby {
            lobby_id: lobby_id.into(),
            password: password.into(),
        })
    }

    /// Leave the current lobby.
    pub fn leave_lobby(&mut self) -> LobbyResponse<()> {
        self.request(ClientCommand::LeaveLobby {})
    }

    /// List lobbies.
    pub fn list_lobby(&mut self, params: ListLobbyParams) -> LobbyResponse<Vec<LobbyInfo>> {
        self.request(ClientCommand::ListLobby {
            start: params.start,
            count: params.count,
            filter: LobbyFilter { tags: params.tags },
        })
    }

    /// Fetch a lobby and its roster. `None` views the current lobby.
    ///
    /// Viewing another lobby never changes the client's own membership state.
    pub fn view_lobby(
        &mut self,
        lobby_id: Option<&str>,
        password: impl Into<String>,
    ) -> LobbyResponse<ViewLobbyResult> {
        let lobby_id = match lobby_id {
            Some(id) => id.to_string(),
            None => self.model.lobby.id.clone(),
        };
        self.request(ClientCommand::ViewLobby {
            lobby_id,
            password: password.into(),
        })
    }

    /// Remove a peer from the lobby. Host only.
    pub fn kick_peer(&mut self, peer_id: impl Into<String>) -> LobbyResponse<()> {
        self.request(ClientCommand::KickPeer {
            peer_id: peer_id.into(),
        })
    }

    /// Merge `tags` into the lobby's tags. Host only.
    pub fn set_lobby_tags(&mut self, tags: JsonMap) -> LobbyResponse<()> {
        self.request(ClientCommand::LobbyTags { tags })
    }

    /// Remove tags by key. Host only.
    pub fn del_lobby_tags<I, S>(&mut self, keys: I) -> LobbyResponse<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_lobby_tags(null_keys(keys))
    }

    /// Send a chat line to everyone in the lobby.
    pub fn lobby_chat(&mut self, chat: impl Into<String>) -> LobbyResponse<()> {
        self.request(ClientCommand::ChatLobby { chat: chat.into() })
    }

    /// Set or clear the local peer's ready flag.
    pub fn lobby_ready(&mut self, ready: bool) -> LobbyResponse<()> {
        if ready {
            self.request(ClientCommand::LobbyReady {})
        } else {
            self.request(ClientCommand::LobbyUnready {})
        }
    }

    /// Rename the local peer.
    pub fn set_peer_name(&mut self, name: impl Into<String>) -> LobbyResponse<()> {
        self.request(ClientCommand::SetName { name: name.into() })
    }

    /// Seal (`true`) or unseal the lobby. Host only.
    pub fn seal_lobby(&mut self, seal: bool) -> LobbyResponse<()> {
        if seal {
            self.request(ClientCommand::SealLobby {})
        } else {
            self.request(ClientCommand::UnsealLobby {})
        }
    }

    /// Broadcast a notification to every peer.
    pub fn lobby_notify(&mut self, data: Value) -> LobbyResponse<()> {
        self.request(ClientCommand::LobbyNotify { peer_data: data })
    }

    /// Send a notification to one peer.
    pub fn peer_notify(&mut self, data: Value, target_peer: impl Into<String>) -> LobbyResponse<()> {
        self.request(ClientCommand::NotifyTo {
            peer_data: data,
            target_peer: target_peer.into(),
        })
    }

    /// Merge data into the lobby's public store, or its private store when
    /// `is_private`. Host only.
    pub fn lobby_data(&mut self, data: JsonMap, is_private: bool) -> LobbyResponse<()> {
        if self.private_unsupported(is_private) {
            return self.reject_later(LobbyError::Unsupported("private lobby data"));
        }
        self.request(ClientCommand::LobbyData {
            lobby_data: data,
            is_private,
        })
    }

    /// Remove lobby data by key. Host only.
    pub fn del_lobby_data<I, S>(&mut self, keys: I, is_private: bool) -> LobbyResponse<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lobby_data(null_keys(keys), is_private)
    }

    /// Merge data into one peer's public or private store. Host only.
    pub fn set_peer_data(
        &mut self,
        data: JsonMap,
        target_peer: impl Into<String>,
        is_private: bool,
    ) -> LobbyResponse<()> {
        if self.private_unsupported(is_private) {
            return self.reject_later(LobbyError::Unsupported("private peer data"));
        }
        self.request(ClientCommand::DataTo {
            peer_data: data,
            target_peer: target_peer.into(),
            is_private,
        })
    }

    /// Remove one peer's data by key. Host only.
    pub fn del_peer_data<I, S>(
        &mut self,
        keys: I,
        target_peer: impl Into<String>,
        is_private: bool,
    ) -> LobbyResponse<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_peer_data(null_keys(keys), target_peer, is_private)
    }

    /// Merge data into every peer's public or private store. Host only.
    pub fn set_peers_data(&mut self, data: JsonMap, is_private: bool) -> LobbyResponse<()> {
        if self.private_unsupported(is_private) {
            return self.reject_later(LobbyError::Unsupported("private peer data"));
        }
        self.request(ClientCommand::DataToAll {
            peer_data: data,
            is_private,
        })
    }

    /// Remove every peer's data by key. Host only.
    pub fn del_peers_data<I, S>(&mut self, keys: I, is_private: bool) -> LobbyResponse<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_peers_data(null_keys(keys), is_private)
    }

    /// Invoke the server-side lobby function `method`. Resolves with its
    /// return value.
    ///
    /// Requires [`Capabilities::rpc_calls`]; otherwise the handle fails with
    /// [`LobbyError::Unsupported`].
    pub fn lobby_call(&mut self, method: impl Into<String>, args: Vec<Value>) -> LobbyResponse<Value> {
        if !self.config.capabilities.rpc_calls {
            return self.reject_later(LobbyError::Unsupported("lobby_call"));
        }
        self.request(ClientCommand::LobbyCall {
            function: method.into(),
            inputs: args,
        })
    }

    // ── Lobby settings ──────────────────────────────────────────────

    /// Change the join password. Empty opens the lobby. Host only.
    ///
    /// The handle resolves with the updated lobby. Requires
    /// [`Capabilities::lobby_settings`].
    pub fn set_password(&mut self, password: impl Into<String>) -> LobbyResponse<ViewLobbyResult> {
        if !self.config.capabilities.lobby_settings {
            return self.reject_later(LobbyError::Unsupported("set_password"));
        }
        self.request(ClientCommand::SetPassword {
            password: password.into(),
        })
    }

    /// Rename the lobby. Host only.
    pub fn set_title(&mut self, title: impl Into<String>) -> LobbyResponse<ViewLobbyResult> {
        if !self.config.capabilities.lobby_settings {
            return self.reject_later(LobbyError::Unsupported("set_title"));
        }
        self.request(ClientCommand::SetTitle {
            title: title.into(),
        })
    }

    /// Change the lobby capacity. Host only.
    pub fn set_max_players(&mut self, max_players: u32) -> LobbyResponse<ViewLobbyResult> {
        if !self.config.capabilities.lobby_settings {
            return self.reject_later(LobbyError::Unsupported("set_max_players"));
        }
        self.request(ClientCommand::SetMaxPlayers { max_players })
    }

    // ── Setters ─────────────────────────────────────────────────────

    /// Change the server URL used by the next connection.
    pub fn set_server_url(&mut self, url: impl Into<String>) {
        self.config.server_url = url.into();
    }

    /// Change the game id offered by the next connection.
    pub fn set_game_id(&mut self, game_id: impl Into<String>) {
        self.config.game_id = game_id.into();
    }

    /// Change the reconnection token offered by the next connection.
    pub fn set_reconnection_token(&mut self, token: impl Into<String>) {
        self.model.reconnection_token = token.into();
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` once the transport has opened.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The configuration.
    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// The configured server URL.
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// The configured game id.
    pub fn game_id(&self) -> &str {
        &self.config.game_id
    }

    /// Token offered on the next connection.
    pub fn reconnection_token(&self) -> &str {
        self.model.reconnection_token()
    }

    /// The full lobby model.
    pub fn model(&self) -> &LobbyModel {
        &self.model
    }

    /// The current lobby. Its id is empty when not in a lobby.
    pub fn lobby(&self) -> &LobbyInfo {
        self.model.lobby()
    }

    /// The local peer.
    pub fn peer(&self) -> &LobbyPeer {
        self.model.peer()
    }

    /// The roster, sorted by id.
    pub fn peers(&self) -> &[LobbyPeer] {
        self.model.peers()
    }

    /// Private lobby data. Only populated for the host.
    pub fn host_data(&self) -> &JsonMap {
        self.model.host_data()
    }

    /// The local peer's private data.
    pub fn peer_data(&self) -> &JsonMap {
        self.model.peer_data()
    }

    /// Whether the local peer hosts the current lobby.
    pub fn is_host(&self) -> bool {
        self.model.is_host()
    }

    /// Number of commands awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Drop for LobbyClient<T> {
    fn drop(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!("LobbyClient dropped while active, closing transport");
            self.transport.close(NORMAL_CLOSURE, "Normal Closure");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;

    #[test]
    fn presets() {
        let standard = LobbyConfig::new("g");
        assert_eq!(standard.server_url, DEFAULT_LOBBY_URL);
        assert_eq!(standard.capabilities, Capabilities::standard());
        assert_eq!(standard.event_channel_capacity, 256);
        assert_eq!(standard.command_timeout, Some(Duration::from_secs(30)));

        let auth = LobbyConfig::authoritative("g");
        assert_eq!(auth.server_url, DEFAULT_AUTHORITATIVE_URL);
        assert!(auth.capabilities.rpc_calls);
        assert!(!auth.capabilities.private_data);

        let scripted = LobbyConfig::scripted("g");
        assert!(scripted.capabilities.soft_disconnect);
        assert_eq!(
            scripted.discord_path.as_deref(),
            Some(DEFAULT_SCRIPTED_DISCORD_PATH)
        );
    }

    #[test]
    fn event_capacity_is_clamped() {
        let config = LobbyConfig::new("g").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn url_uses_discord_proxy_only_inside_discord() {
        let scripted = LobbyConfig::scripted("g");
        assert_eq!(scripted.resolve_url(), DEFAULT_LOBBY_URL);

        let embedded = LobbyConfig::scripted("g").with_environment(StaticEnvironment::discord("123"));
        assert_eq!(
            embedded.resolve_url(),
            "wss://123.discordsays.com/.proxy/blazium/scriptedlobby/connect"
        );

        let no_path = LobbyConfig::new("g").with_environment(StaticEnvironment::discord("123"));
        assert_eq!(no_path.resolve_url(), DEFAULT_LOBBY_URL);
    }

    #[test]
    fn params_defaults() {
        let create = CreateLobbyParams::new("Arena");
        assert_eq!(create.max_players, 4);
        let list = ListLobbyParams::default();
        assert_eq!((list.start, list.count), (0, 10));
        assert!(list.tags.is_empty());
        let paged = ListLobbyParams::default().with_page(20, 5);
        assert_eq!((paged.start, paged.count), (20, 5));
    }
}
