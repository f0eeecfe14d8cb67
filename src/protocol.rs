//! Wire codec for the lobby protocol.
//!
//! Every frame is a single JSON text message of the shape
//! `{"command": <string>, "data": {...}}`. Outgoing frames carry the
//! correlation id as `data.id`; incoming frames may additionally carry a
//! top-level `message` string.
//!
//! Decoding is permissive: [`decode_frame`] never fails. A frame that is not a
//! JSON object decodes as an `error` frame with no data, and every accessor
//! falls back to a zero value when a field is missing or has the wrong type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A JSON object, as carried by tags, lobby data and peer data.
pub type JsonMap = serde_json::Map<String, Value>;

/// Correlation id linking an outgoing command to its response.
pub type CommandId = String;

/// Command name the codec substitutes when an inbound frame has none.
pub const ERROR_COMMAND: &str = "error";

// ── Outgoing ────────────────────────────────────────────────────────

/// Filter attached to a `list_lobby` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LobbyFilter {
    /// Only list lobbies whose tags match. Omitted from the wire when empty.
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub tags: JsonMap,
}

/// Commands sent from client to server.
///
/// The correlation id is not part of the variant; [`encode_command`] inserts
/// it into the `data` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Create a new lobby and join it as host.
    CreateLobby {
        name: String,
        max_players: u32,
        password: String,
        tags: JsonMap,
        /// Start sealed. Only sent when set.
        #[serde(default, skip_serializing_if = "is_false")]
        sealed: bool,
    },
    /// Join the first open lobby matching `tags`, creating one if none
    /// exists.
    QuickJoin {
        name: String,
        tags: JsonMap,
        max_players: u32,
    },
    /// Change the join password (host only). Empty removes it.
    SetPassword { password: String },
    /// Rename the lobby (host only).
    SetTitle { title: String },
    /// Change the lobby capacity (host only).
    SetMaxPlayers { max_players: u32 },
    /// Join an existing lobby.
    JoinLobby { lobby_id: String, password: String },
    /// Leave the current lobby.
    LeaveLobby {},
    /// List lobbies, paginated.
    ListLobby {
        start: u32,
        count: u32,
        filter: LobbyFilter,
    },
    /// Fetch the lobby info and roster of a lobby.
    ViewLobby { lobby_id: String, password: String },
    /// Remove a peer from the lobby (host only).
    KickPeer { peer_id: String },
    /// Merge tags into the lobby. A `null` value deletes the key.
    LobbyTags { tags: JsonMap },
    /// Send a chat line to the lobby.
    ChatLobby { chat: String },
    /// Mark the local peer ready.
    LobbyReady {},
    /// Mark the local peer not ready.
    LobbyUnready {},
    /// Rename the local peer.
    SetName { name: String },
    /// Stop accepting joins (host only).
    SealLobby {},
    /// Accept joins again (host only).
    UnsealLobby {},
    /// Broadcast a notification to every peer in the lobby.
    LobbyNotify { peer_data: Value },
    /// Send a notification to one peer.
    NotifyTo { peer_data: Value, target_peer: String },
    /// Merge data into the lobby's public or private store.
    LobbyData { lobby_data: JsonMap, is_private: bool },
    /// Merge data into one peer's public or private store.
    DataTo {
        peer_data: JsonMap,
        target_peer: String,
        is_private: bool,
    },
    /// Merge data into every peer's public or private store.
    DataToAll { peer_data: JsonMap, is_private: bool },
    /// Invoke a server-side lobby function.
    LobbyCall { function: String, inputs: Vec<Value> },
}

impl ClientCommand {
    /// The wire name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateLobby { .. } => "create_lobby",
            Self::QuickJoin { .. } => "quick_join",
            Self::SetPassword { .. } => "set_password",
            Self::SetTitle { .. } => "set_title",
            Self::SetMaxPlayers { .. } => "set_max_players",
            Self::JoinLobby { .. } => "join_lobby",
            Self::LeaveLobby {} => "leave_lobby",
            Self::ListLobby { .. } => "list_lobby",
            Self::ViewLobby { .. } => "view_lobby",
            Self::KickPeer { .. } => "kick_peer",
            Self::LobbyTags { .. } => "lobby_tags",
            Self::ChatLobby { .. } => "chat_lobby",
            Self::LobbyReady {} => "lobby_ready",
            Self::LobbyUnready {} => "lobby_unready",
            Self::SetName { .. } => "set_name",
            Self::SealLobby {} => "seal_lobby",
            Self::UnsealLobby {} => "unseal_lobby",
            Self::LobbyNotify { .. } => "lobby_notify",
            Self::NotifyTo { .. } => "notify_to",
            Self::LobbyData { .. } => "lobby_data",
            Self::DataTo { .. } => "data_to",
            Self::DataToAll { .. } => "data_to_all",
            Self::LobbyCall { .. } => "lobby_call",
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Serialize `command` into a text frame, inserting `id` as `data.id`.
///
/// # Errors
///
/// Returns [`LobbyError::Serialization`](crate::LobbyError::Serialization) if
/// the command cannot be serialized.
pub fn encode_command(id: &str, command: &ClientCommand) -> Result<String> {
    let mut frame = serde_json::to_value(command)?;
    if let Some(object) = frame.as_object_mut() {
        let data = object
            .entry("data")
            .or_insert_with(|| Value::Object(JsonMap::new()));
        if !data.is_object() {
            *data = Value::Object(JsonMap::new());
        }
        if let Some(data) = data.as_object_mut() {
            data.insert("id".into(), Value::String(id.to_owned()));
        }
    }
    Ok(serde_json::to_string(&frame)?)
}

/// Parse an outgoing frame back into its correlation id and command.
///
/// Mock servers and tests use this to inspect what the client sent.
///
/// # Errors
///
/// Returns [`LobbyError::Serialization`](crate::LobbyError::Serialization) if
/// `text` is not a valid command frame.
pub fn parse_command(text: &str) -> Result<(CommandId, ClientCommand)> {
    let value: Value = serde_json::from_str(text)?;
    let id = value
        .get("data")
        .and_then(Value::as_object)
        .and_then(|data| id_field(data))
        .unwrap_or_default();
    let command = serde_json::from_value(value)?;
    Ok((id, command))
}

// ── Incoming ────────────────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerFrame {
    /// Command tag, `"error"` when absent or not a string.
    pub command: String,
    /// Optional human-readable message, empty when absent.
    pub message: String,
    /// Command payload, empty when absent or not an object.
    pub data: JsonMap,
}

impl ServerFrame {
    /// The frame's correlation id, if it carries one.
    pub fn id(&self) -> Option<CommandId> {
        id_field(&self.data)
    }

    /// The `data.lobby` object, if present.
    pub fn lobby(&self) -> Option<&JsonMap> {
        get_map(&self.data, "lobby")
    }

    /// The `data.peers` array, if present.
    pub fn peers(&self) -> Option<&[Value]> {
        get_array(&self.data, "peers")
    }
}

/// Decode one inbound text frame. Never fails.
pub fn decode_frame(text: &str) -> ServerFrame {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(text) else {
        tracing::warn!("discarding malformed lobby frame: {text}");
        return ServerFrame {
            command: ERROR_COMMAND.into(),
            ..ServerFrame::default()
        };
    };
    let command = match object.remove("command") {
        Some(Value::String(command)) => command,
        _ => ERROR_COMMAND.into(),
    };
    let message = match object.remove("message") {
        Some(Value::String(message)) => message,
        _ => String::new(),
    };
    let data = match object.remove("data") {
        Some(Value::Object(data)) => data,
        _ => JsonMap::new(),
    };
    ServerFrame {
        command,
        message,
        data,
    }
}

// ── Field accessors ─────────────────────────────────────────────────

/// A string field, or `None` if absent or not a string.
pub fn get_str<'a>(map: &'a JsonMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// A string field, empty if absent or not a string.
pub fn str_field(map: &JsonMap, key: &str) -> String {
    get_str(map, key).unwrap_or_default().to_owned()
}

/// A boolean field, or `None` if absent or not a boolean.
pub fn get_bool(map: &JsonMap, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

/// An integer field, or `None` if absent or not an integral number.
///
/// Integral floats (`4.0`) are accepted since some servers emit every number
/// as a double.
pub fn get_int(map: &JsonMap, key: &str) -> Option<i64> {
    let value = map.get(key)?;
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.is_finite())
        .map(|f| f as i64)
}

/// An object field, or `None` if absent or not an object.
pub fn get_map<'a>(map: &'a JsonMap, key: &str) -> Option<&'a JsonMap> {
    map.get(key).and_then(Value::as_object)
}

/// An object field, cloned, empty if absent or not an object.
pub fn map_field(map: &JsonMap, key: &str) -> JsonMap {
    get_map(map, key).cloned().unwrap_or_default()
}

/// An array field, or `None` if absent or not an array.
pub fn get_array<'a>(map: &'a JsonMap, key: &str) -> Option<&'a [Value]> {
    map.get(key).and_then(Value::as_array).map(Vec::as_slice)
}

/// The `id` field rendered as text. Numeric ids are accepted.
fn id_field(map: &JsonMap) -> Option<CommandId> {
    match map.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => match get_int(map, "id") {
            Some(i) => Some(i.to_string()),
            None => Some(n.to_string()),
        },
        _ => None,
    }
}

/// Build a map that assigns `null` to each key, which the server treats as a
/// deletion.
pub fn null_keys<I, S>(keys: I) -> JsonMap
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(|key| (key.into(), Value::Null))
        .collect()
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
    use serde_json::json;

    #[test]
    fn encode_inserts_id_into_data() {
        let text = encode_command(
            "7",
            &ClientCommand::KickPeer {
                peer_id: "P2".into(),
            },
        )
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"command": "kick_peer", "data": {"peer_id": "P2", "id": "7"}})
        );
    }

    #[test]
    fn encode_fieldless_command_still_carries_data() {
        let text = encode_command("0", &ClientCommand::LeaveLobby {}).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"command": "leave_lobby", "data": {"id": "0"}}));
    }

    #[test]
    fn list_filter_omits_empty_tags() {
        let text = encode_command(
            "1",
            &ClientCommand::ListLobby {
                start: 0,
                count: 10,
                filter: LobbyFilter::default(),
            },
        )
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["data"]["filter"], json!({}));
    }

    #[test]
    fn command_names_match_serialized_tag() {
        let commands = [
            ClientCommand::LeaveLobby {},
            ClientCommand::LobbyReady {},
            ClientCommand::LobbyUnready {},
            ClientCommand::SealLobby {},
            ClientCommand::UnsealLobby {},
            ClientCommand::ChatLobby { chat: "hi".into() },
            ClientCommand::SetName { name: "n".into() },
            ClientCommand::DataToAll {
                peer_data: JsonMap::new(),
                is_private: true,
            },
            ClientCommand::LobbyCall {
                function: "roll".into(),
                inputs: vec![json!(6)],
            },
            ClientCommand::QuickJoin {
                name: "n".into(),
                tags: JsonMap::new(),
                max_players: 2,
            },
            ClientCommand::SetPassword {
                password: String::new(),
            },
            ClientCommand::SetTitle { title: "t".into() },
            ClientCommand::SetMaxPlayers { max_players: 6 },
        ];
        for command in &commands {
            let value = serde_json::to_value(command).unwrap();
            assert_eq!(value["command"], command.name());
        }
    }

    #[test]
    fn sealed_flag_only_sent_when_set() {
        let create = |sealed| ClientCommand::CreateLobby {
            name: "A".into(),
            max_players: 4,
            password: String::new(),
            tags: JsonMap::new(),
            sealed,
        };
        let encode = |command: ClientCommand| -> Value {
            serde_json::from_str(&encode_command("1", &command).unwrap()).unwrap()
        };
        assert!(encode(create(false))["data"].get("sealed").is_none());
        assert_eq!(encode(create(true))["data"]["sealed"], json!(true));

        let text = json!({
            "command": "create_lobby",
            "data": {"name": "A", "max_players": 4, "password": "", "tags": {}}
        });
        let (_, parsed) = parse_command(&text.to_string()).unwrap();
        assert_eq!(parsed, create(false));
    }

    #[test]
    fn parse_command_recovers_id_and_variant() {
        let text = encode_command(
            "12",
            &ClientCommand::JoinLobby {
                lobby_id: "L1".into(),
                password: String::new(),
            },
        )
        .unwrap();
        let (id, command) = parse_command(&text).unwrap();
        assert_eq!(id, "12");
        assert_eq!(
            command,
            ClientCommand::JoinLobby {
                lobby_id: "L1".into(),
                password: String::new(),
            }
        );
    }

    #[test]
    fn decode_full_frame() {
        let frame = decode_frame(
            r#"{"command":"peer_joined","message":"ok","data":{"id":"3","peer":{"id":"P2"}}}"#,
        );
        assert_eq!(frame.command, "peer_joined");
        assert_eq!(frame.message, "ok");
        assert_eq!(frame.id().as_deref(), Some("3"));
    }

    #[test]
    fn decode_garbage_degrades_to_error() {
        for text in ["", "not json", "[1,2,3]", "42", "null", "{"] {
            let frame = decode_frame(text);
            assert_eq!(frame.command, ERROR_COMMAND, "input {text:?}");
            assert!(frame.data.is_empty());
            assert!(frame.id().is_none());
        }
    }

    #[test]
    fn decode_wrong_typed_fields_default() {
        let frame = decode_frame(r#"{"command":5,"message":{"a":1},"data":[1]}"#);
        assert_eq!(frame.command, ERROR_COMMAND);
        assert_eq!(frame.message, "");
        assert!(frame.data.is_empty());
    }

    #[test]
    fn numeric_id_is_rendered_as_decimal() {
        let frame = decode_frame(r#"{"command":"lobby_left","data":{"id":8}}"#);
        assert_eq!(frame.id().as_deref(), Some("8"));
        let frame = decode_frame(r#"{"command":"lobby_left","data":{"id":9.0}}"#);
        assert_eq!(frame.id().as_deref(), Some("9"));
    }

    #[test]
    fn accessors_tolerate_wrong_types() {
        let map = json!({"s": 1, "b": "yes", "i": "4", "m": [], "a": {}})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(str_field(&map, "s"), "");
        assert_eq!(get_bool(&map, "b"), None);
        assert_eq!(get_int(&map, "i"), None);
        assert!(map_field(&map, "m").is_empty());
        assert!(get_array(&map, "a").is_none());
        assert_eq!(get_int(&map, "missing"), None);
    }

    #[test]
    fn null_keys_builds_deletion_map() {
        let map = null_keys(["a", "b"]);
        assert_eq!(Value::Object(map), json!({"a": null, "b": null}));
    }
}
