//! Inbound frame handling.
//!
//! Each decoded frame goes through four steps, in this order:
//!
//! 1. Membership data riding on the frame (`data.lobby`, `data.peers`) is
//!    applied to the model, but only for the lobby the client is in or one it
//!    is entering (`lobby_created`, `joined_lobby`, `quick_join`).
//! 2. The command-specific handler mutates the model and raises its event.
//! 3. The pending command named by `data.id`, if any, is resolved, or
//!    rejected when the command is `error`.
//! 4. A [`LobbyEvent::Log`] with the raw command and message is raised.

use serde_json::Value;
use tracing::{debug, trace};

use crate::client::Capabilities;
use crate::error::LobbyError;
use crate::event::{EventSink, LobbyEvent};
use crate::model::{LobbyModel, LobbyPeer};
use crate::pending::PendingTable;
use crate::protocol::{
    get_array, get_bool, get_map, get_str, map_field, str_field, JsonMap, ServerFrame,
    ERROR_COMMAND,
};

/// Message logged for commands with no handler.
pub const UNKNOWN_COMMAND_MESSAGE: &str = "Unknown command received.";

/// Applies inbound frames to the state owned by one client.
pub(crate) struct Dispatcher<'a> {
    pub(crate) model: &'a mut LobbyModel,
    pub(crate) pending: &'a mut PendingTable,
    pub(crate) events: &'a EventSink,
    pub(crate) capabilities: Capabilities,
}

impl Dispatcher<'_> {
    pub(crate) fn dispatch(&mut self, frame: ServerFrame) {
        let id = frame.id();
        let ServerFrame {
            command,
            message,
            data,
        } = frame;
        trace!(command = %command, id = ?id, "dispatching lobby frame");

        self.apply_membership(&command, &data);
        self.handle(&command, &data);

        if let Some(id) = id {
            let kind = self.pending.kind(&id);
            if command == ERROR_COMMAND {
                let message = if message.is_empty() {
                    str_field(&data, "message")
                } else {
                    message.clone()
                };
                if self.pending.reject(&id, LobbyError::Server { message }) {
                    debug!(id = %id, ?kind, "lobby command rejected by server");
                }
            } else if self.pending.resolve(&id, &data) {
                debug!(id = %id, ?kind, command = %command, "lobby command resolved");
            }
        }

        self.events.emit(LobbyEvent::Log { command, message });
    }

    fn apply_membership(&mut self, command: &str, data: &JsonMap) {
        let private = self.capabilities.private_data;
        let Some(lobby) = get_map(data, "lobby") else {
            if let Some(peers) = get_array(data, "peers") {
                if self.model.in_lobby() {
                    self.model.apply_roster(peers, private);
                }
            }
            return;
        };

        let incoming_id = get_str(lobby, "id");
        let current_id = self.model.lobby.id.as_str();
        let establishes = matches!(command, "lobby_created" | "joined_lobby" | "quick_join");
        let same_lobby = !current_id.is_empty() && incoming_id.is_none_or(|id| id == current_id);
        if !establishes && !same_lobby {
            return;
        }
        if establishes && !same_lobby {
            self.model.clear();
        }
        self.model.apply_lobby_patch(lobby, private);
        if let Some(peers) = get_array(data, "peers") {
            self.model.apply_roster(peers, private);
        }
    }

    fn handle(&mut self, command: &str, data: &JsonMap) {
        match command {
            "peer_state" => self.on_peer_state(data),
            "lobby_created" => self.events.emit(LobbyEvent::LobbyCreated {
                lobby: self.model.lobby.clone(),
                peers: self.model.peers.clone(),
            }),
            "joined_lobby" | "quick_join" => self.events.emit(LobbyEvent::LobbyJoined {
                lobby: self.model.lobby.clone(),
                peers: self.model.peers.clone(),
            }),
            "lobby_left" => {
                self.model.clear();
                self.events.emit(LobbyEvent::LobbyLeft { kicked: false });
            }
            "lobby_kicked" => {
                self.model.clear();
                self.events.emit(LobbyEvent::LobbyLeft { kicked: true });
            }
            "lobby_sealed" | "lobby_unsealed" => {
                let sealed = command == "lobby_sealed";
                self.model.lobby.sealed = sealed;
                self.events.emit(LobbyEvent::LobbySealed { sealed });
            }
            "lobby_tags" => {
                self.model.lobby.tags = map_field(data, "tags");
                self.events.emit(LobbyEvent::LobbyTagged {
                    tags: self.model.lobby.tags.clone(),
                });
            }
            "peer_chat" => {
                let from = get_str(data, "from_peer").unwrap_or_default();
                if let Some(peer) = self.model.find_peer(from) {
                    self.events.emit(LobbyEvent::PeerMessaged {
                        peer: peer.clone(),
                        chat: str_field(data, "chat_data"),
                    });
                }
            }
            "peer_name" => self.on_peer_name(data),
            "peer_ready" | "peer_unready" => self.on_peer_ready(data, command == "peer_ready"),
            "peer_joined" => self.on_peer_joined(data),
            "peer_reconnected" => {
                let id = get_str(data, "peer_id").unwrap_or_default();
                if let Some(peer) = self.model.patch_peer(id, |p| p.disconnected = false) {
                    let peer = peer.clone();
                    self.events.emit(LobbyEvent::PeerReconnected { peer });
                }
            }
            "peer_left" => {
                let id = get_str(data, "peer_id").unwrap_or_default();
                if let Some(peer) = self.model.remove_peer(id) {
                    let kicked = get_bool(data, "kicked").unwrap_or_default();
                    self.events.emit(LobbyEvent::PeerLeft { peer, kicked });
                }
            }
            "peer_disconnected" => self.on_peer_disconnected(data),
            "peer_notify" | "notified_to" => {
                let from = get_str(data, "from_peer").unwrap_or_default();
                if let Some(peer) = self.model.find_peer(from) {
                    self.events.emit(LobbyEvent::LobbyNotified {
                        data: data.get("peer_data").cloned().unwrap_or(Value::Null),
                        from_peer: peer.clone(),
                    });
                }
            }
            "lobby_data" => self.on_lobby_data(data),
            "data_to" => self.on_data_to(data),
            // Acknowledgements and query results: the pending table carries
            // their payload.
            "lobby_list" | "lobby_view" | "data_to_sent" | "lobby_notify_sent"
            | "notify_to_sent" | "lobby_call" | "set_password" | "set_title" | "set_max_players"
            | ERROR_COMMAND => {}
            _ => {
                debug!(command = %command, "unknown lobby command");
                self.events.log(ERROR_COMMAND, UNKNOWN_COMMAND_MESSAGE);
            }
        }
    }

    fn on_peer_state(&mut self, data: &JsonMap) {
        let dict = map_field(data, "peer");
        self.model.peer = LobbyPeer::from_dict(&dict);
        // A peer_state without a token revokes the old seat.
        self.model.reconnection_token = str_field(&dict, "reconnection_token");
        self.events.emit(LobbyEvent::ConnectedToLobby {
            peer: self.model.peer.clone(),
            reconnection_token: self.model.reconnection_token.clone(),
        });
    }

    fn on_peer_name(&mut self, data: &JsonMap) {
        let id = get_str(data, "peer_id").unwrap_or_default();
        let name = str_field(data, "name");
        if !id.is_empty() && self.model.peer.id == id {
            self.model.peer.name.clone_from(&name);
        }
        let Some(peer) = self.model.patch_peer(id, |p| p.name.clone_from(&name)) else {
            return;
        };
        let peer = peer.clone();
        if peer.id == self.model.lobby.host {
            self.model.lobby.host_name = name;
        }
        self.events.emit(LobbyEvent::PeerNamed { peer });
    }

    fn on_peer_ready(&mut self, data: &JsonMap, ready: bool) {
        let id = get_str(data, "peer_id").unwrap_or_default();
        if !id.is_empty() && self.model.peer.id == id {
            self.model.peer.ready = ready;
        }
        if let Some(peer) = self.model.patch_peer(id, |p| p.ready = ready) {
            let peer = peer.clone();
            self.events.emit(LobbyEvent::PeerReady { peer, ready });
        }
    }

    fn on_peer_joined(&mut self, data: &JsonMap) {
        let peer = LobbyPeer::from_dict(&map_field(data, "peer"));
        if peer.id.is_empty() {
            debug!("ignoring peer_joined without a peer id");
            return;
        }
        self.model.upsert_peer(peer.clone());
        self.events.emit(LobbyEvent::PeerJoined { peer });
    }

    fn on_peer_disconnected(&mut self, data: &JsonMap) {
        let id = get_str(data, "peer_id").unwrap_or_default();
        let peer = if self.capabilities.soft_disconnect {
            self.model
                .patch_peer(id, |p| p.disconnected = true)
                .cloned()
        } else {
            self.model.remove_peer(id)
        };
        if let Some(peer) = peer {
            self.events.emit(LobbyEvent::PeerDisconnected { peer });
        }
    }

    fn on_lobby_data(&mut self, data: &JsonMap) {
        let lobby_data = map_field(data, "lobby_data");
        let is_private = get_bool(data, "is_private").unwrap_or_default();
        if is_private {
            if self.capabilities.private_data {
                self.model.host_data.clone_from(&lobby_data);
            }
        } else {
            self.model.lobby.public_data.clone_from(&lobby_data);
        }
        self.events.emit(LobbyEvent::ReceivedLobbyData {
            data: lobby_data,
            is_private,
        });
    }

    fn on_data_to(&mut self, data: &JsonMap) {
        let target = get_str(data, "target_peer").unwrap_or_default();
        let is_private = get_bool(data, "is_private").unwrap_or_default();
        let peer_data = map_field(data, "peer_data");
        let targets_self = !target.is_empty() && self.model.peer.id == target;

        let to_peer = if is_private && targets_self {
            if self.capabilities.private_data {
                self.model.peer_data.clone_from(&peer_data);
            }
            self.model.find_peer(target).cloned()
        } else {
            if targets_self {
                self.model.peer.public_data.clone_from(&peer_data);
            }
            self.model
                .patch_peer(target, |p| p.public_data.clone_from(&peer_data))
                .cloned()
        };
        if let Some(to_peer) = to_peer {
            self.events.emit(LobbyEvent::ReceivedPeerData {
                data: peer_data,
                to_peer,
                is_private,
            });
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
    use crate::pending::{response_channel, ViewLobbyResult};
    use crate::protocol::decode_frame;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        model: LobbyModel,
        pending: PendingTable,
        sink: EventSink,
        rx: mpsc::Receiver<LobbyEvent>,
        capabilities: Capabilities,
    }

    impl Harness {
        fn new() -> Self {
            let (sink, rx) = EventSink::channel(64);
            Self {
                model: LobbyModel::default(),
                pending: PendingTable::new(),
                sink,
                rx,
                capabilities: Capabilities::standard(),
            }
        }

        fn feed(&mut self, frame: Value) -> Vec<LobbyEvent> {
            Dispatcher {
                model: &mut self.model,
                pending: &mut self.pending,
                events: &self.sink,
                capabilities: self.capabilities,
            }
            .dispatch(decode_frame(&frame.to_string()));
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }

        /// Put the client in lobby L1 hosted by P1, with self = P1.
        fn in_lobby(&mut self) {
            self.feed(json!({"command": "peer_state", "data": {"peer": {"id": "P1", "name": "Host"}}}));
            self.feed(json!({
                "command": "lobby_created",
                "data": {
                    "lobby": {"id": "L1", "name": "Arena", "max_players": 4, "host": "P1", "host_name": "Host"},
                    "peers": [{"id": "P1", "name": "Host"}, {"id": "p3", "name": "Cat"}]
                }
            }));
        }

        fn ids(&self) -> Vec<&str> {
            self.model.peers().iter().map(|p| p.id.as_str()).collect()
        }
    }

    fn last_is_log(events: &[LobbyEvent], command: &str) {
        match events.last() {
            Some(LobbyEvent::Log { command: c, .. }) => assert_eq!(c, command),
            other => panic!("expected trailing log, got {other:?}"),
        }
    }

    #[test]
    fn lobby_created_establishes_membership() {
        let mut h = Harness::new();
        h.in_lobby();
        assert_eq!(h.model.lobby().id, "L1");
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert_eq!(h.model.lobby().players, 2);
        assert!(h.model.is_host());
    }

    #[test]
    fn view_of_other_lobby_does_not_touch_membership() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({
            "command": "lobby_view",
            "data": {"lobby": {"id": "L2", "name": "Other"}, "peers": [{"id": "X"}]}
        }));
        assert_eq!(h.model.lobby().id, "L1");
        assert_eq!(h.model.lobby().name, "Arena");
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert_eq!(events.len(), 1);
        last_is_log(&events, "lobby_view");
    }

    #[test]
    fn view_of_own_lobby_patches_membership() {
        let mut h = Harness::new();
        h.in_lobby();
        h.feed(json!({
            "command": "lobby_view",
            "data": {"lobby": {"id": "L1", "sealed": true}, "peers": [{"id": "P1"}]}
        }));
        assert!(h.model.lobby().sealed);
        assert_eq!(h.model.lobby().name, "Arena");
        assert_eq!(h.ids(), ["P1"]);
    }

    #[test]
    fn own_lobby_view_without_roster_keeps_player_count() {
        let mut h = Harness::new();
        h.in_lobby();
        h.feed(json!({"command": "lobby_view", "data": {"lobby": {"id": "L1", "players": 5}}}));
        assert_eq!(h.model.lobby().players, 2);
        assert_eq!(h.ids(), ["P1", "p3"]);
    }

    #[test]
    fn established_lobby_without_roster_counts_no_players() {
        let mut h = Harness::new();
        h.feed(json!({"command": "lobby_created", "data": {"lobby": {"id": "L1", "players": 1}}}));
        assert_eq!(h.model.lobby().id, "L1");
        assert!(h.model.peers().is_empty());
        assert_eq!(h.model.lobby().players, 0);
    }

    #[test]
    fn lobby_without_id_outside_a_lobby_is_ignored() {
        let mut h = Harness::new();
        h.feed(json!({"command": "lobby_view", "data": {"lobby": {"name": "x"}, "peers": [{"id": "A"}]}}));
        assert!(!h.model.in_lobby());
        assert!(h.model.peers().is_empty());
    }

    #[test]
    fn peers_without_lobby_apply_only_when_in_lobby() {
        let mut h = Harness::new();
        h.feed(json!({"command": "lobby_view", "data": {"peers": [{"id": "A"}]}}));
        assert!(h.model.peers().is_empty());

        h.in_lobby();
        h.feed(json!({"command": "lobby_view", "data": {"peers": [{"id": "B"}, {"id": "a"}]}}));
        assert_eq!(h.ids(), ["a", "B"]);
    }

    #[test]
    fn joining_new_lobby_replaces_old_state() {
        let mut h = Harness::new();
        h.in_lobby();
        h.model.host_data.insert("secret".into(), json!(1));
        let events = h.feed(json!({
            "command": "joined_lobby",
            "data": {"lobby": {"id": "L7", "host": "Z"}, "peers": [{"id": "Z"}, {"id": "P1"}]}
        }));
        assert_eq!(h.model.lobby().id, "L7");
        assert_eq!(h.model.lobby().name, "");
        assert!(h.model.host_data().is_empty());
        assert!(matches!(&events[0], LobbyEvent::LobbyJoined { lobby, peers } if lobby.id == "L7" && peers.len() == 2));
    }

    #[test]
    fn quick_join_reply_enters_the_lobby() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({
            "command": "quick_join",
            "data": {"lobby": {"id": "Q1", "name": "Auto", "max_players": 2}, "peers": [{"id": "Z"}, {"id": "P1"}]}
        }));
        assert_eq!(h.model.lobby().id, "Q1");
        assert_eq!(h.model.lobby().players, 2);
        assert!(matches!(&events[0], LobbyEvent::LobbyJoined { lobby, .. } if lobby.name == "Auto"));
        last_is_log(&events, "quick_join");
    }

    #[test]
    fn settings_replies_patch_the_current_lobby() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({
            "command": "set_title",
            "data": {"lobby": {"id": "L1", "name": "Renamed", "max_players": 6, "has_password": true}}
        }));
        assert_eq!(events.len(), 1);
        last_is_log(&events, "set_title");
        assert_eq!(h.model.lobby().name, "Renamed");
        assert_eq!(h.model.lobby().max_players, 6);
        assert!(h.model.lobby().password_protected);
        assert_eq!(h.model.lobby().players, 2);

        // A settings reply for some other lobby is not ours to apply.
        h.feed(json!({"command": "set_max_players", "data": {"lobby": {"id": "L9", "max_players": 9}}}));
        assert_eq!(h.model.lobby().id, "L1");
        assert_eq!(h.model.lobby().max_players, 6);
    }

    #[test]
    fn peer_state_sets_self_and_token() {
        let mut h = Harness::new();
        let events = h.feed(json!({
            "command": "peer_state",
            "data": {"peer": {"id": "P9", "name": "Me", "reconnection_token": "tok-1"}}
        }));
        assert_eq!(h.model.peer().id, "P9");
        assert_eq!(h.model.reconnection_token(), "tok-1");
        assert!(matches!(
            &events[0],
            LobbyEvent::ConnectedToLobby { peer, reconnection_token } if peer.name == "Me" && reconnection_token == "tok-1"
        ));
    }

    #[test]
    fn peer_state_without_token_clears_it() {
        let mut h = Harness::new();
        h.model = LobbyModel::new("old");
        let events = h.feed(json!({"command": "peer_state", "data": {"peer": {"id": "P9"}}}));
        assert_eq!(h.model.peer().id, "P9");
        assert_eq!(h.model.reconnection_token(), "");
        assert!(matches!(
            &events[0],
            LobbyEvent::ConnectedToLobby { reconnection_token, .. } if reconnection_token.is_empty()
        ));
    }

    #[test]
    fn leave_and_kick_clear_the_model() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "lobby_left", "data": {}}));
        assert_eq!(events[0], LobbyEvent::LobbyLeft { kicked: false });
        assert!(!h.model.in_lobby());

        h.in_lobby();
        let events = h.feed(json!({"command": "lobby_kicked", "data": {}}));
        assert_eq!(events[0], LobbyEvent::LobbyLeft { kicked: true });
        assert!(h.model.peers().is_empty());
    }

    #[test]
    fn seal_and_tags() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "lobby_sealed", "data": {}}));
        assert_eq!(events[0], LobbyEvent::LobbySealed { sealed: true });
        assert!(h.model.lobby().sealed);
        h.feed(json!({"command": "lobby_unsealed", "data": {}}));
        assert!(!h.model.lobby().sealed);

        let events = h.feed(json!({"command": "lobby_tags", "data": {"tags": {"mode": "ffa"}}}));
        assert_eq!(h.model.lobby().tags.get("mode"), Some(&json!("ffa")));
        assert!(matches!(&events[0], LobbyEvent::LobbyTagged { tags } if tags.len() == 1));
    }

    #[test]
    fn chat_from_unknown_peer_is_dropped() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_chat", "data": {"from_peer": "p3", "chat_data": "gg"}}));
        assert!(matches!(&events[0], LobbyEvent::PeerMessaged { peer, chat } if peer.id == "p3" && chat == "gg"));

        let events = h.feed(json!({"command": "peer_chat", "data": {"from_peer": "nobody", "chat_data": "?"}}));
        assert_eq!(events.len(), 1);
        last_is_log(&events, "peer_chat");
    }

    #[test]
    fn renaming_host_updates_host_name_and_self() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_name", "data": {"peer_id": "P1", "name": "Boss"}}));
        assert_eq!(h.model.lobby().host_name, "Boss");
        assert_eq!(h.model.peer().name, "Boss");
        assert_eq!(h.model.find_peer("P1").unwrap().name, "Boss");
        assert!(matches!(&events[0], LobbyEvent::PeerNamed { peer } if peer.name == "Boss"));

        h.feed(json!({"command": "peer_name", "data": {"peer_id": "p3", "name": "Kit"}}));
        assert_eq!(h.model.lobby().host_name, "Boss");
    }

    #[test]
    fn ready_toggles() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_ready", "data": {"peer_id": "P1"}}));
        assert!(h.model.peer().ready);
        assert!(matches!(&events[0], LobbyEvent::PeerReady { ready: true, .. }));
        let events = h.feed(json!({"command": "peer_unready", "data": {"peer_id": "P1"}}));
        assert!(!h.model.peer().ready);
        assert!(matches!(&events[0], LobbyEvent::PeerReady { ready: false, .. }));
    }

    #[test]
    fn join_then_leave_keeps_count() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_joined", "data": {"peer": {"id": "P2", "name": "Bob"}}}));
        assert_eq!(h.ids(), ["P1", "P2", "p3"]);
        assert_eq!(h.model.lobby().players, 3);
        assert!(matches!(&events[0], LobbyEvent::PeerJoined { peer } if peer.name == "Bob"));

        let events = h.feed(json!({"command": "peer_left", "data": {"peer_id": "P2", "kicked": true}}));
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert_eq!(h.model.lobby().players, 2);
        assert!(matches!(&events[0], LobbyEvent::PeerLeft { kicked: true, .. }));
    }

    #[test]
    fn peer_joined_without_id_is_ignored() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_joined", "data": {}}));
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn hard_disconnect_removes_peer() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_disconnected", "data": {"peer_id": "p3"}}));
        assert_eq!(h.ids(), ["P1"]);
        assert!(matches!(&events[0], LobbyEvent::PeerDisconnected { peer } if peer.id == "p3"));
    }

    #[test]
    fn soft_disconnect_flags_then_reconnects() {
        let mut h = Harness::new();
        h.capabilities = Capabilities::scripted();
        h.in_lobby();
        let events = h.feed(json!({"command": "peer_disconnected", "data": {"peer_id": "p3"}}));
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert!(h.model.find_peer("p3").unwrap().disconnected);
        assert!(matches!(&events[0], LobbyEvent::PeerDisconnected { peer } if peer.disconnected));

        let events = h.feed(json!({"command": "peer_reconnected", "data": {"peer_id": "p3"}}));
        assert!(!h.model.find_peer("p3").unwrap().disconnected);
        assert!(matches!(&events[0], LobbyEvent::PeerReconnected { .. }));
    }

    #[test]
    fn notifications_carry_raw_payload() {
        let mut h = Harness::new();
        h.in_lobby();
        for command in ["peer_notify", "notified_to"] {
            let events = h.feed(json!({"command": command, "data": {"from_peer": "p3", "peer_data": [1, 2]}}));
            assert!(matches!(
                &events[0],
                LobbyEvent::LobbyNotified { data, from_peer } if data == &json!([1, 2]) && from_peer.id == "p3"
            ));
        }
    }

    #[test]
    fn lobby_data_routes_by_privacy() {
        let mut h = Harness::new();
        h.in_lobby();
        h.feed(json!({"command": "lobby_data", "data": {"lobby_data": {"a": 1}, "is_private": false}}));
        assert_eq!(h.model.lobby().public_data.get("a"), Some(&json!(1)));
        let events = h.feed(json!({"command": "lobby_data", "data": {"lobby_data": {"b": 2}, "is_private": true}}));
        assert_eq!(h.model.host_data().get("b"), Some(&json!(2)));
        assert!(matches!(&events[0], LobbyEvent::ReceivedLobbyData { is_private: true, .. }));
    }

    #[test]
    fn private_data_dropped_without_capability() {
        let mut h = Harness::new();
        h.capabilities = Capabilities::authoritative();
        h.in_lobby();
        h.feed(json!({"command": "lobby_data", "data": {"lobby_data": {"b": 2}, "is_private": true}}));
        assert!(h.model.host_data().is_empty());
    }

    #[test]
    fn data_to_routes_private_self_data() {
        let mut h = Harness::new();
        h.in_lobby();
        let events = h.feed(json!({
            "command": "data_to",
            "data": {"target_peer": "P1", "is_private": true, "peer_data": {"hand": [3]}}
        }));
        assert_eq!(h.model.peer_data().get("hand"), Some(&json!([3])));
        assert!(h.model.find_peer("P1").unwrap().public_data.is_empty());
        assert!(matches!(&events[0], LobbyEvent::ReceivedPeerData { to_peer, is_private: true, .. } if to_peer.id == "P1"));

        h.feed(json!({
            "command": "data_to",
            "data": {"target_peer": "p3", "is_private": false, "peer_data": {"score": 9}}
        }));
        assert_eq!(
            h.model.find_peer("p3").unwrap().public_data.get("score"),
            Some(&json!(9))
        );
    }

    #[test]
    fn unknown_command_logs_twice() {
        let mut h = Harness::new();
        let events = h.feed(json!({"command": "mystery", "message": "hm", "data": {}}));
        assert_eq!(
            events,
            vec![
                LobbyEvent::log("error", UNKNOWN_COMMAND_MESSAGE),
                LobbyEvent::log("mystery", "hm"),
            ]
        );
    }

    #[test]
    fn error_rejects_pending_with_server_message() {
        let mut h = Harness::new();
        h.in_lobby();
        let (responder, mut handle) = response_channel::<()>("5".into());
        h.pending.register("5".into(), responder, None);

        let events = h.feed(json!({"command": "error", "message": "not host", "data": {"id": "5"}}));

        let error = handle.try_result().unwrap().unwrap_err();
        assert_eq!(error.server_message(), Some("not host"));
        assert_eq!(h.ids(), ["P1", "p3"]);
        assert_eq!(events, vec![LobbyEvent::log("error", "not host")]);
    }

    #[test]
    fn error_message_falls_back_to_data() {
        let mut h = Harness::new();
        let (responder, mut handle) = response_channel::<ViewLobbyResult>("1".into());
        h.pending.register("1".into(), responder, None);
        h.feed(json!({"command": "error", "data": {"id": "1", "message": "full"}}));
        let error = handle.try_result().unwrap().unwrap_err();
        assert_eq!(error.server_message(), Some("full"));
    }

    #[test]
    fn resolution_and_event_both_fire() {
        let mut h = Harness::new();
        let (responder, mut handle) = response_channel::<ViewLobbyResult>("0".into());
        h.pending.register("0".into(), responder, None);
        let events = h.feed(json!({
            "command": "lobby_created",
            "data": {"id": "0", "lobby": {"id": "L1"}, "peers": [{"id": "P1"}]}
        }));
        assert_eq!(handle.try_result().unwrap().unwrap().lobby.id, "L1");
        assert!(matches!(&events[0], LobbyEvent::LobbyCreated { .. }));
        last_is_log(&events, "lobby_created");
    }

    #[test]
    fn malformed_frames_are_harmless() {
        let mut h = Harness::new();
        h.in_lobby();
        let before_lobby = h.model.lobby().clone();
        let before_peers = h.model.peers().to_vec();
        for text in [
            "garbage",
            r#"{"data": {"peer_id": "P1"}}"#,
            r#"{"command": "peer_left"}"#,
            r#"{"command": "peer_left", "data": {"peer_id": 3}}"#,
            r#"{"command": "lobby_view", "data": {"lobby": 5, "peers": "x"}}"#,
        ] {
            Dispatcher {
                model: &mut h.model,
                pending: &mut h.pending,
                events: &h.sink,
                capabilities: h.capabilities,
            }
            .dispatch(decode_frame(text));
        }
        assert_eq!(h.model.lobby(), &before_lobby);
        assert_eq!(h.model.peers(), before_peers.as_slice());
    }
}
