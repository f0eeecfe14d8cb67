#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests.
//!
//! Uses the shared `MockTransport` from `tests/common` to script the server
//! side of the socket and verify command encoding, response correlation,
//! model updates and event delivery through the public API.

mod common;

use std::time::Duration;

use blazium_lobby_client::error::LobbyError;
use blazium_lobby_client::{
    Capabilities, ClientCommand, CommandKind, ConnectionState, CreateLobbyParams,
    ListLobbyParams, LobbyClient, LobbyConfig, LobbyEvent, ReadyState, StaticEnvironment,
};
use serde_json::{json, Map, Value};

use common::{
    ack, connected_client, drain, error_frame, frame, hosting_client, lobby_json, logs,
    peer_joined, peer_state, without_logs, MockTransport,
};

fn config() -> LobbyConfig {
    LobbyConfig::new("game-1").with_server_url("wss://lobby.test/connect")
}

fn tags(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[test]
fn connect_offers_tag_and_game_id() {
    let (transport, handle) = MockTransport::new();
    let (mut client, mut events) = LobbyClient::new(transport, config());

    client.connect_to_lobby().unwrap();
    assert_eq!(client.state(), ConnectionState::Connecting);
    assert_eq!(
        handle.connects(),
        vec![(
            "wss://lobby.test/connect".to_string(),
            vec!["blazium".to_string(), "game-1".to_string()]
        )]
    );

    let log = logs(&drain(&mut events));
    assert_eq!(
        log,
        vec![(
            "connect_to_lobby".to_string(),
            "Connecting to: wss://lobby.test/connect".to_string()
        )]
    );
}

#[test]
fn connect_offers_reconnection_token_when_set() {
    let (transport, handle) = MockTransport::new();
    let (mut client, _events) =
        LobbyClient::new(transport, config().with_reconnection_token("tok-9"));
    client.connect_to_lobby().unwrap();
    assert_eq!(handle.connects()[0].1, ["blazium", "game-1", "tok-9"]);
}

#[test]
fn becomes_connected_on_first_open_poll() {
    let (transport, handle) = MockTransport::new();
    let (mut client, mut events) = LobbyClient::new(transport, config());
    client.connect_to_lobby().unwrap();

    client.poll();
    assert_eq!(client.state(), ConnectionState::Connecting);

    handle.open();
    client.poll();
    assert!(client.is_connected());
    assert!(logs(&drain(&mut events)).contains(&(
        "connect_to_lobby".to_string(),
        "Connected to: wss://lobby.test/connect".to_string()
    )));
}

#[test]
fn connect_while_active_is_a_no_op() {
    let (mut client, _events, handle) = connected_client(config());
    client.connect_to_lobby().unwrap();
    assert_eq!(handle.connects().len(), 1);
    assert!(client.is_connected());
}

#[test]
fn connect_failure_reports_and_stays_disconnected() {
    let (transport, handle) = MockTransport::new();
    handle.set_fail_connect(true);
    let (mut client, mut events) = LobbyClient::new(transport, config());

    let err = client.connect_to_lobby().unwrap_err();
    assert!(matches!(err, LobbyError::TransportConnect(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(
        logs(&drain(&mut events)),
        vec![(
            "error".to_string(),
            "Unable to connect to lobby server at: wss://lobby.test/connect".to_string()
        )]
    );
}

#[test]
fn discord_environment_overrides_url() {
    let (transport, handle) = MockTransport::new();
    let config = LobbyConfig::scripted("game-1")
        .with_environment(StaticEnvironment::discord("1234"));
    let (mut client, _events) = LobbyClient::new(transport, config);
    client.connect_to_lobby().unwrap();
    assert_eq!(
        handle.connects()[0].0,
        "wss://1234.discordsays.com/.proxy/blazium/scriptedlobby/connect"
    );
}

#[test]
fn peer_state_token_is_offered_on_reconnect() {
    let (mut client, mut events, handle) = connected_client(config());
    handle.push(peer_state("P1", "Host", "tok-2"));
    client.poll();

    let events_seen = without_logs(drain(&mut events));
    match &events_seen[..] {
        [LobbyEvent::ConnectedToLobby {
            peer,
            reconnection_token,
        }] => {
            assert_eq!(peer.id, "P1");
            assert_eq!(reconnection_token, "tok-2");
        }
        other => panic!("unexpected events: {other:?}"),
    }

    client.disconnect_from_lobby();
    assert_eq!(client.reconnection_token(), "tok-2");
    client.connect_to_lobby().unwrap();
    assert_eq!(handle.connects()[1].1, ["blazium", "game-1", "tok-2"]);
}

// ════════════════════════════════════════════════════════════════════
// Create, join and membership
// ════════════════════════════════════════════════════════════════════

#[test]
fn create_lobby_round_trip() {
    let (mut client, mut events, handle) = connected_client(config());
    handle.push(peer_state("P1", "Host", "tok-1"));
    client.poll();
    drain(&mut events);

    let mut response = client.create_lobby(CreateLobbyParams::new("Arena").with_max_players(4));
    assert_eq!(response.id(), "0");
    assert_eq!(response.kind(), CommandKind::ViewLobby);
    assert_eq!(
        handle.last_sent(),
        json!({
            "command": "create_lobby",
            "data": {"name": "Arena", "max_players": 4, "password": "", "tags": {}, "id": "0"}
        })
    );
    assert!(response.try_result().is_none());
    assert_eq!(client.pending_count(), 1);

    handle.push(frame(
        "lobby_created",
        json!({
            "id": "0",
            "lobby": lobby_json("L1", "Arena", "P1"),
            "peers": [{"id": "P1", "name": "Host"}]
        }),
    ));
    client.poll();

    let view = response.try_result().unwrap().unwrap();
    assert_eq!(view.lobby.id, "L1");
    assert_eq!(view.peers.len(), 1);
    assert_eq!(client.lobby().id, "L1");
    assert!(client.is_host());
    assert_eq!(client.pending_count(), 0);

    let events_seen = drain(&mut events);
    assert!(matches!(
        events_seen.as_slice(),
        [LobbyEvent::LobbyCreated { .. }, LobbyEvent::Log { command, .. }] if command == "lobby_created"
    ));
}

#[test]
fn peer_joined_updates_roster_and_count() {
    let (mut client, mut events, handle) = hosting_client(config());

    handle.push(peer_joined("P2", "Bob"));
    client.poll();

    let ids: Vec<&str> = client.peers().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["P1", "P2"]);
    assert_eq!(client.lobby().players, 2);
    assert_eq!(client.pending_count(), 0);

    match without_logs(drain(&mut events)).as_slice() {
        [LobbyEvent::PeerJoined { peer }] => assert_eq!(peer.name, "Bob"),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn join_lobby_resolves_with_view() {
    let (mut client, _events, handle) = connected_client(config());
    let mut response = client.join_lobby("L9", "secret");
    assert_eq!(
        handle.last_sent()["data"],
        json!({"lobby_id": "L9", "password": "secret", "id": response.id()})
    );

    handle.push(frame(
        "joined_lobby",
        json!({
            "id": response.id(),
            "lobby": lobby_json("L9", "Den", "H"),
            "peers": [{"id": "H", "name": "Host"}, {"id": "me", "name": "Me"}]
        }),
    ));
    client.poll();

    let view = response.try_result().unwrap().unwrap();
    assert_eq!(view.lobby.name, "Den");
    assert_eq!(client.peers().len(), 2);
    assert!(!client.is_host());
}

#[test]
fn leave_lobby_clears_state() {
    let (mut client, mut events, handle) = hosting_client(config());
    let mut response = client.leave_lobby();
    handle.push(ack("lobby_left", response.id()));
    client.poll();

    response.try_result().unwrap().unwrap();
    assert!(client.lobby().id.is_empty());
    assert!(client.peers().is_empty());
    assert_eq!(client.peer().id, "P1");
    assert!(without_logs(drain(&mut events)).contains(&LobbyEvent::LobbyLeft { kicked: false }));
}

#[test]
fn view_lobby_defaults_to_current_lobby() {
    let (mut client, _events, handle) = hosting_client(config());
    let _response = client.view_lobby(None, "");
    assert_eq!(handle.last_sent()["data"]["lobby_id"], "L1");

    let _other = client.view_lobby(Some("L7"), "pw");
    assert_eq!(handle.last_sent()["data"]["lobby_id"], "L7");
    assert_eq!(handle.last_sent()["command"], "view_lobby");
}

#[test]
fn viewing_another_lobby_leaves_membership_alone() {
    let (mut client, _events, handle) = hosting_client(config());
    let mut response = client.view_lobby(Some("L7"), "");
    handle.push(frame(
        "lobby_view",
        json!({
            "id": response.id(),
            "lobby": lobby_json("L7", "Elsewhere", "Z"),
            "peers": [{"id": "Z", "name": "Zed"}]
        }),
    ));
    client.poll();

    let view = response.try_result().unwrap().unwrap();
    assert_eq!(view.lobby.id, "L7");
    assert_eq!(view.peers[0].id, "Z");
    assert_eq!(client.lobby().id, "L1");
    assert_eq!(client.lobby().name, "Arena");
    assert_eq!(client.peers().len(), 1);
}

#[test]
fn list_lobby_resolves_with_lobbies() {
    let (mut client, _events, handle) = connected_client(config());
    let mut response = client.list_lobby(
        ListLobbyParams::default()
            .with_tags(tags(&[("mode", "ffa")]))
            .with_page(20, 5),
    );
    assert_eq!(
        handle.last_sent()["data"],
        json!({"start": 20, "count": 5, "filter": {"tags": {"mode": "ffa"}}, "id": response.id()})
    );

    handle.push(frame(
        "lobby_list",
        json!({
            "id": response.id(),
            "lobbies": [lobby_json("A", "One", "h1"), lobby_json("B", "Two", "h2"), "junk"]
        }),
    ));
    client.poll();

    let lobbies = response.try_result().unwrap().unwrap();
    let names: Vec<&str> = lobbies.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["One", "Two"]);
    assert!(client.lobby().id.is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Correlation
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_error_rejects_only_its_command() {
    let (mut client, mut events, handle) = hosting_client(config());
    let mut kick = client.kick_peer("P9");
    let mut chat = client.lobby_chat("hi");

    handle.push(error_frame(kick.id(), "Peer not found"));
    client.poll();

    let err = kick.try_result().unwrap().unwrap_err();
    assert_eq!(err.server_message(), Some("Peer not found"));
    assert!(chat.try_result().is_none());
    assert_eq!(client.pending_count(), 1);
    assert!(logs(&drain(&mut events))
        .contains(&("error".to_string(), "Peer not found".to_string())));
}

#[test]
fn out_of_order_replies_reach_their_commands() {
    let (mut client, _events, handle) = connected_client(config());
    let mut view = client.view_lobby(Some("L2"), "");
    let mut list = client.list_lobby(ListLobbyParams::default());

    handle.push(frame("lobby_list", json!({"id": list.id(), "lobbies": []})));
    handle.push(frame(
        "lobby_view",
        json!({"id": view.id(), "lobby": lobby_json("L2", "Two", "h"), "peers": []}),
    ));
    client.poll();

    assert!(list.try_result().unwrap().unwrap().is_empty());
    assert_eq!(view.try_result().unwrap().unwrap().lobby.id, "L2");
}

#[test]
fn duplicate_reply_is_ignored() {
    let (mut client, _events, handle) = hosting_client(config());
    let mut first = client.lobby_chat("one");
    let mut second = client.lobby_chat("two");

    handle.push(ack("peer_chat", first.id()));
    handle.push(error_frame(first.id(), "late duplicate"));
    client.poll();

    assert!(first.try_result().unwrap().is_ok());
    assert!(second.try_result().is_none());
    assert_eq!(client.pending_count(), 1);
}

#[test]
fn ids_keep_counting_across_sessions() {
    let (mut client, _events, handle) = connected_client(config());
    let a = client.leave_lobby();
    let b = client.leave_lobby();
    assert_eq!((a.id(), b.id()), ("0", "1"));

    client.disconnect_from_lobby();
    client.connect_to_lobby().unwrap();
    handle.open();
    client.poll();

    let c = client.leave_lobby();
    assert_eq!(c.id(), "2");
}

#[tokio::test]
async fn responses_can_be_awaited() {
    let (mut client, _events, handle) = hosting_client(config());
    let response = client.seal_lobby(true);
    assert_eq!(handle.last_sent()["command"], "seal_lobby");
    handle.push(ack("lobby_sealed", response.id()));
    client.poll();

    response.await.unwrap();
    assert!(client.lobby().sealed);
}

// ════════════════════════════════════════════════════════════════════
// Failure paths
// ════════════════════════════════════════════════════════════════════

#[test]
fn command_before_connect_fails_on_next_poll() {
    let (transport, handle) = MockTransport::new();
    let (mut client, mut events) = LobbyClient::new(transport, config());

    let mut response = client.leave_lobby();
    assert!(response.try_result().is_none());
    assert!(handle.sent().is_empty());
    assert_eq!(
        logs(&drain(&mut events)),
        vec![("error".to_string(), "Socket is not ready.".to_string())]
    );

    client.poll();
    assert!(matches!(
        response.try_result(),
        Some(Err(LobbyError::NotConnected))
    ));
}

#[test]
fn disconnect_clears_state_and_rejects_pending() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.push(frame("peer_ready", json!({"peer_id": "P1"})));
    client.poll();
    assert!(client.peer().ready);

    let mut pending = client.lobby_chat("bye");
    drain(&mut events);
    client.disconnect_from_lobby();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.lobby().id.is_empty());
    assert!(client.peers().is_empty());
    assert!(!client.peer().ready);
    assert!(client.peer_data().is_empty());
    assert!(client.host_data().is_empty());
    assert_eq!(client.pending_count(), 0);
    assert!(matches!(
        pending.try_result(),
        Some(Err(LobbyError::Disconnected))
    ));
    assert_eq!(handle.closes(), vec![(1000, "Normal Closure".to_string())]);
    assert_eq!(
        drain(&mut events),
        vec![LobbyEvent::DisconnectedFromLobby { reason: None }]
    );

    client.disconnect_from_lobby();
    assert!(drain(&mut events).is_empty());
    assert_eq!(handle.closes().len(), 1);
}

#[test]
fn remote_close_ends_session_after_buffered_frames() {
    let (mut client, mut events, handle) = hosting_client(config());
    let mut pending = client.lobby_chat("hello?");

    handle.push(peer_joined("P2", "Bob"));
    handle.close_remote(Some("server restart"));
    client.poll();

    let seen = without_logs(drain(&mut events));
    assert!(matches!(seen.first(), Some(LobbyEvent::PeerJoined { .. })));
    assert_eq!(
        seen.last(),
        Some(&LobbyEvent::DisconnectedFromLobby {
            reason: Some("server restart".into())
        })
    );
    assert!(matches!(
        pending.try_result(),
        Some(Err(LobbyError::Disconnected))
    ));
    assert!(client.peers().is_empty());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn send_failure_closes_and_fails_command() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.set_fail_send(true);

    let mut response = client.kick_peer("P2");
    assert_eq!(client.pending_count(), 0);
    assert_eq!(handle.closes(), vec![(1000, "Disconnected".to_string())]);
    assert!(logs(&drain(&mut events))
        .contains(&("error".to_string(), "No longer connected.".to_string())));

    client.poll();
    assert!(matches!(
        response.try_result(),
        Some(Err(LobbyError::TransportSend(_)))
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(handle.ready_state(), ReadyState::Closed);
}

#[test]
fn unanswered_command_times_out() {
    let (mut client, _events, handle) =
        connected_client(config().with_command_timeout(Some(Duration::ZERO)));
    let mut response = client.leave_lobby();
    assert_eq!(handle.sent().len(), 1);

    client.poll();
    assert!(matches!(response.try_result(), Some(Err(LobbyError::Timeout))));
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn disabled_timeout_waits_forever() {
    let (mut client, _events, _handle) =
        connected_client(config().with_command_timeout(None));
    let mut response = client.leave_lobby();
    client.poll();
    client.poll();
    assert!(response.try_result().is_none());
}

// ════════════════════════════════════════════════════════════════════
// Capabilities
// ════════════════════════════════════════════════════════════════════

#[test]
fn lobby_call_needs_rpc_capability() {
    let (mut client, _events, handle) = connected_client(config());
    let mut response = client.lobby_call("roll", vec![json!(6)]);
    assert!(handle.sent().is_empty());

    client.poll();
    assert!(matches!(
        response.try_result(),
        Some(Err(LobbyError::Unsupported(_)))
    ));
}

#[test]
fn lobby_call_resolves_with_result() {
    let (mut client, _events, handle) = connected_client(LobbyConfig::authoritative("game-1"));
    let mut response = client.lobby_call("roll", vec![json!(6)]);
    assert_eq!(response.kind(), CommandKind::Call);
    assert_eq!(
        handle.last_sent(),
        json!({"command": "lobby_call", "data": {"function": "roll", "inputs": [6], "id": response.id()}})
    );

    handle.push(frame("lobby_call", json!({"id": response.id(), "result": 4})));
    client.poll();
    assert_eq!(response.try_result().unwrap().unwrap(), json!(4));
}

#[test]
fn private_data_needs_capability() {
    let (mut client, _events, handle) =
        connected_client(config().with_capabilities(Capabilities::authoritative()));
    let mut lobby = client.lobby_data(tags(&[("k", "v")]), true);
    let mut peer = client.set_peer_data(tags(&[("k", "v")]), "P2", true);
    let mut all = client.del_peers_data(["k"], true);
    let public = client.lobby_data(tags(&[("k", "v")]), false);
    assert_eq!(handle.sent().len(), 1);
    assert_eq!(handle.last_sent()["data"]["id"], public.id());

    client.poll();
    for response in [&mut lobby, &mut peer, &mut all] {
        assert!(matches!(
            response.try_result(),
            Some(Err(LobbyError::Unsupported(_)))
        ));
    }
}

#[test]
fn lobby_settings_need_scripted_capability() {
    let (mut client, _events, handle) = hosting_client(config());
    let mut responses = vec![
        client.quick_join("Auto", tags(&[("mode", "duel")]), 2),
        client.set_password("pw"),
        client.set_title("Finals"),
        client.set_max_players(8),
        client.create_lobby(CreateLobbyParams::new("Vault").with_sealed(true)),
    ];
    assert!(handle.sent().is_empty());

    client.poll();
    for response in &mut responses {
        assert!(matches!(
            response.try_result(),
            Some(Err(LobbyError::Unsupported(_)))
        ));
    }
    assert_eq!(client.lobby().id, "L1");
}

#[test]
fn sealed_create_is_sent_on_scripted_servers() {
    let (mut client, _events, handle) = connected_client(LobbyConfig::scripted("game-1"));
    let response = client.create_lobby(CreateLobbyParams::new("Vault").with_sealed(true));
    assert_eq!(
        handle.last_sent(),
        json!({"command": "create_lobby", "data": {
            "name": "Vault", "max_players": 4, "password": "", "tags": {}, "sealed": true, "id": response.id()
        }})
    );
}

#[test]
fn quick_join_resolves_and_enters_lobby() {
    let (mut client, mut events, handle) = connected_client(LobbyConfig::scripted("game-1"));
    handle.push(peer_state("P2", "Guest", "tok-2"));
    client.poll();
    drain(&mut events);

    let mut response = client.quick_join("Auto", tags(&[("mode", "duel")]), 2);
    assert_eq!(response.kind(), CommandKind::ViewLobby);
    assert_eq!(
        handle.last_sent(),
        json!({"command": "quick_join", "data": {
            "name": "Auto", "tags": {"mode": "duel"}, "max_players": 2, "id": response.id()
        }})
    );

    handle.push(frame(
        "quick_join",
        json!({
            "id": response.id(),
            "lobby": lobby_json("Q1", "Auto", "P9"),
            "peers": [{"id": "P9", "name": "Host"}, {"id": "P2", "name": "Guest"}]
        }),
    ));
    client.poll();

    let view = response.try_result().unwrap().unwrap();
    assert_eq!(view.lobby.id, "Q1");
    assert_eq!(client.lobby().id, "Q1");
    assert_eq!(client.lobby().players, 2);
    assert!(!client.is_host());
    assert!(matches!(
        without_logs(drain(&mut events)).as_slice(),
        [LobbyEvent::LobbyJoined { lobby, .. }] if lobby.id == "Q1"
    ));
}

#[test]
fn settings_commands_resolve_with_updated_lobby() {
    let (mut client, _events, handle) = hosting_client(LobbyConfig::scripted("game-1"));

    let mut title = client.set_title("Finals");
    assert_eq!(
        handle.last_sent(),
        json!({"command": "set_title", "data": {"title": "Finals", "id": title.id()}})
    );
    let mut password = client.set_password("hunter2");
    assert_eq!(
        handle.last_sent(),
        json!({"command": "set_password", "data": {"password": "hunter2", "id": password.id()}})
    );
    let mut capacity = client.set_max_players(8);
    assert_eq!(
        handle.last_sent(),
        json!({"command": "set_max_players", "data": {"max_players": 8, "id": capacity.id()}})
    );

    let mut renamed = lobby_json("L1", "Finals", "P1");
    handle.push(frame("set_title", json!({"id": title.id(), "lobby": renamed.clone()})));
    renamed["has_password"] = json!(true);
    handle.push(frame("set_password", json!({"id": password.id(), "lobby": renamed.clone()})));
    handle.push(error_frame(capacity.id(), "Max players lower than current players"));
    client.poll();

    assert_eq!(title.try_result().unwrap().unwrap().lobby.name, "Finals");
    assert!(password.try_result().unwrap().unwrap().lobby.password_protected);
    let err = capacity.try_result().unwrap().unwrap_err();
    assert_eq!(err.server_message(), Some("Max players lower than current players"));
    assert_eq!(client.lobby().name, "Finals");
    assert!(client.lobby().password_protected);
    assert_eq!(client.lobby().max_players, 4);
    assert_eq!(client.lobby().players, 1);
}

// ════════════════════════════════════════════════════════════════════
// Command encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn delete_operations_send_null_values() {
    let (mut client, _events, handle) = hosting_client(config());
    let _ = client.del_lobby_tags(["a", "b"]);
    let _ = client.del_lobby_data(["score"], false);
    let _ = client.del_peer_data(["hp"], "P2", true);

    let sent = handle.sent_commands();
    assert_eq!(
        sent[0].1,
        ClientCommand::LobbyTags {
            tags: [("a", Value::Null), ("b", Value::Null)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        }
    );
    assert_eq!(handle.sent_json()[1]["data"]["lobby_data"], json!({"score": null}));
    assert_eq!(
        handle.sent_json()[2]["data"],
        json!({"peer_data": {"hp": null}, "target_peer": "P2", "is_private": true, "id": sent[2].0})
    );
}

#[test]
fn toggles_pick_the_matching_command() {
    let (mut client, _events, handle) = hosting_client(config());
    let _ = client.lobby_ready(true);
    let _ = client.lobby_ready(false);
    let _ = client.seal_lobby(true);
    let _ = client.seal_lobby(false);

    let names: Vec<&str> = handle
        .sent_commands()
        .iter()
        .map(|(_, command)| command.name())
        .collect();
    assert_eq!(names, ["lobby_ready", "lobby_unready", "seal_lobby", "unseal_lobby"]);
}

#[test]
fn notifications_and_renames_encode_payloads() {
    let (mut client, _events, handle) = hosting_client(config());
    let _ = client.lobby_notify(json!({"ping": 1}));
    let _ = client.peer_notify(json!("wave"), "P2");
    let _ = client.set_peer_name("Hosty");
    let _ = client.set_peers_data(tags(&[("team", "red")]), false);

    let sent = handle.sent_json();
    assert_eq!(sent[0]["command"], "lobby_notify");
    assert_eq!(sent[0]["data"]["peer_data"], json!({"ping": 1}));
    assert_eq!(sent[1]["command"], "notify_to");
    assert_eq!(sent[1]["data"]["target_peer"], "P2");
    assert_eq!(sent[2], json!({"command": "set_name", "data": {"name": "Hosty", "id": "2"}}));
    assert_eq!(sent[3]["command"], "data_to_all");
    assert_eq!(sent[3]["data"]["is_private"], false);
}

// ════════════════════════════════════════════════════════════════════
// Lobby events through the client
// ════════════════════════════════════════════════════════════════════

#[test]
fn kicked_peer_is_removed_with_flag() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.push(peer_joined("P2", "Bob"));
    client.poll();
    drain(&mut events);

    handle.push(frame("peer_left", json!({"peer_id": "P2", "kicked": true})));
    client.poll();

    match without_logs(drain(&mut events)).as_slice() {
        [LobbyEvent::PeerLeft { peer, kicked: true }] => assert_eq!(peer.id, "P2"),
        other => panic!("unexpected events: {other:?}"),
    }
    assert_eq!(client.lobby().players, 1);
}

#[test]
fn private_lobby_data_reaches_host_store() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.push(frame(
        "lobby_data",
        json!({"lobby_data": {"seed": 7}, "is_private": true}),
    ));
    client.poll();

    assert_eq!(client.host_data().get("seed"), Some(&json!(7)));
    assert!(client.lobby().public_data.is_empty());
    assert!(without_logs(drain(&mut events)).iter().any(|e| matches!(
        e,
        LobbyEvent::ReceivedLobbyData { is_private: true, .. }
    )));
}

#[test]
fn chat_event_carries_sender() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.push(frame("peer_chat", json!({"from_peer": "P1", "chat_data": "gg"})));
    client.poll();

    match without_logs(drain(&mut events)).as_slice() {
        [LobbyEvent::PeerMessaged { peer, chat }] => {
            assert_eq!(peer.id, "P1");
            assert_eq!(chat, "gg");
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[test]
fn garbage_frames_do_not_disturb_the_session() {
    let (mut client, mut events, handle) = hosting_client(config());
    handle.push_text("not json");
    handle.push_text("[1, 2, 3]");
    handle.push(json!({"command": 42, "data": "nope"}));
    client.poll();

    assert!(client.is_connected());
    assert_eq!(client.lobby().id, "L1");
    let log = logs(&drain(&mut events));
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|(command, _)| command == "error"));
}

#[test]
fn dropping_connected_client_closes_transport() {
    let (client, _events, handle) = connected_client(config());
    drop(client);
    assert_eq!(handle.ready_state(), ReadyState::Closed);
    assert_eq!(handle.closes().len(), 1);
}
