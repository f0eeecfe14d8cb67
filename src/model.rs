//! In-memory lobby state: the current lobby, the local peer and the roster.
//!
//! Everything here is rebuilt or patched from server payloads. The roster is
//! kept free of duplicate ids and sorted by id (ASCII case-insensitive, byte
//! wise, stable) after every insertion or removal. In-place field patches do
//! not reorder it.

use std::cmp::Ordering;

use serde_json::Value;

use crate::protocol::{get_bool, get_int, get_map, get_str, JsonMap};

// ── Lobby ───────────────────────────────────────────────────────────

/// A lobby as seen by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyInfo {
    /// Server-assigned id. Empty when the client is not in a lobby.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Peer id of the host.
    pub host: String,
    /// Display name of the host.
    pub host_name: String,
    /// Capacity.
    pub max_players: u32,
    /// Current number of peers.
    pub players: u32,
    /// Whether the lobby refuses new joins.
    pub sealed: bool,
    /// Whether joining requires a password (wire `has_password`).
    pub password_protected: bool,
    /// Searchable metadata.
    pub tags: JsonMap,
    /// Data visible to every peer.
    pub public_data: JsonMap,
}

impl LobbyInfo {
    /// Build a lobby from a wire object, defaulting every missing field.
    pub fn from_dict(dict: &JsonMap) -> Self {
        let mut lobby = Self::default();
        lobby.apply_dict(dict);
        lobby
    }

    /// Overwrite each field that is present and well typed in `dict`.
    ///
    /// Absent or wrong-typed fields keep their current value.
    pub fn apply_dict(&mut self, dict: &JsonMap) {
        if let Some(id) = get_str(dict, "id") {
            self.id = id.to_owned();
        }
        if let Some(name) = get_str(dict, "name") {
            self.name = name.to_owned();
        }
        if let Some(host) = get_str(dict, "host") {
            self.host = host.to_owned();
        }
        if let Some(host_name) = get_str(dict, "host_name") {
            self.host_name = host_name.to_owned();
        }
        if let Some(max_players) = get_count(dict, "max_players") {
            self.max_players = max_players;
        }
        if let Some(players) = get_count(dict, "players") {
            self.players = players;
        }
        if let Some(sealed) = get_bool(dict, "sealed") {
            self.sealed = sealed;
        }
        if let Some(has_password) = get_bool(dict, "has_password") {
            self.password_protected = has_password;
        }
        if let Some(tags) = get_map(dict, "tags") {
            self.tags = tags.clone();
        }
        if let Some(public_data) = get_map(dict, "public_data") {
            self.public_data = public_data.clone();
        }
    }

    /// Export the lobby in wire form.
    pub fn to_dict(&self) -> JsonMap {
        let mut dict = JsonMap::new();
        dict.insert("id".into(), Value::from(self.id.clone()));
        dict.insert("name".into(), Value::from(self.name.clone()));
        dict.insert("host".into(), Value::from(self.host.clone()));
        dict.insert("host_name".into(), Value::from(self.host_name.clone()));
        dict.insert("max_players".into(), Value::from(self.max_players));
        dict.insert("players".into(), Value::from(self.players));
        dict.insert("sealed".into(), Value::from(self.sealed));
        dict.insert("has_password".into(), Value::from(self.password_protected));
        dict.insert("tags".into(), Value::Object(self.tags.clone()));
        dict.insert("public_data".into(), Value::Object(self.public_data.clone()));
        dict
    }
}

fn get_count(dict: &JsonMap, key: &str) -> Option<u32> {
    get_int(dict, key).and_then(|n| u32::try_from(n).ok())
}

// ── Peer ────────────────────────────────────────────────────────────

/// One participant of a lobby.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyPeer {
    /// Server-assigned id, stable for the lobby session.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ready flag.
    pub ready: bool,
    /// Data visible to every peer.
    pub public_data: JsonMap,
    /// Join sequence number.
    pub order_id: i64,
    /// Platform the peer is playing on.
    pub platform: String,
    /// Set when the peer dropped but its slot is held for reconnection.
    pub disconnected: bool,
}

impl LobbyPeer {
    /// Build a peer from a wire object, defaulting every missing field.
    pub fn from_dict(dict: &JsonMap) -> Self {
        let mut peer = Self::default();
        peer.apply_dict(dict);
        peer
    }

    /// Overwrite each field that is present and well typed in `dict`.
    pub fn apply_dict(&mut self, dict: &JsonMap) {
        if let Some(id) = get_str(dict, "id") {
            self.id = id.to_owned();
        }
        if let Some(name) = get_str(dict, "name") {
            self.name = name.to_owned();
        }
        if let Some(ready) = get_bool(dict, "ready") {
            self.ready = ready;
        }
        if let Some(public_data) = get_map(dict, "public_data") {
            self.public_data = public_data.clone();
        }
        if let Some(order_id) = get_int(dict, "order_id") {
            self.order_id = order_id;
        }
        if let Some(platform) = get_str(dict, "platform") {
            self.platform = platform.to_owned();
        }
        if let Some(disconnected) = get_bool(dict, "disconnected") {
            self.disconnected = disconnected;
        }
    }

    /// Export the peer in wire form.
    pub fn to_dict(&self) -> JsonMap {
        let mut dict = JsonMap::new();
        dict.insert("id".into(), Value::from(self.id.clone()));
        dict.insert("name".into(), Value::from(self.name.clone()));
        dict.insert("ready".into(), Value::from(self.ready));
        dict.insert("public_data".into(), Value::Object(self.public_data.clone()));
        dict.insert("order_id".into(), Value::from(self.order_id));
        dict.insert("platform".into(), Value::from(self.platform.clone()));
        dict.insert("disconnected".into(), Value::from(self.disconnected));
        dict
    }
}

/// Roster order: ASCII case-insensitive, byte-wise ascending.
pub fn compare_peer_ids(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Sort `peers` into roster order. Stable.
pub fn sort_peers(peers: &mut [LobbyPeer]) {
    peers.sort_by(|a, b| compare_peer_ids(&a.id, &b.id));
}

/// Parse a wire roster into sorted peers.
///
/// Entries that are not objects are skipped; a later duplicate id replaces the
/// earlier one. Also returns the last `private_data` object found, which the
/// server only attaches to the receiving peer's own entry.
pub fn parse_roster(values: &[Value]) -> (Vec<LobbyPeer>, Option<JsonMap>) {
    let mut peers: Vec<LobbyPeer> = Vec::with_capacity(values.len());
    let mut private_data = None;
    for dict in values.iter().filter_map(Value::as_object) {
        let peer = LobbyPeer::from_dict(dict);
        if let Some(data) = get_map(dict, "private_data") {
            private_data = Some(data.clone());
        }
        match peers.iter_mut().find(|existing| existing.id == peer.id) {
            Some(existing) => *existing = peer,
            None => peers.push(peer),
        }
    }
    sort_peers(&mut peers);
    (peers, private_data)
}

// ── Model ───────────────────────────────────────────────────────────

/// The client's view of its lobby membership.
#[derive(Debug, Clone, Default)]
pub struct LobbyModel {
    pub(crate) lobby: LobbyInfo,
    pub(crate) peer: LobbyPeer,
    pub(crate) peers: Vec<LobbyPeer>,
    pub(crate) host_data: JsonMap,
    pub(crate) peer_data: JsonMap,
    pub(crate) reconnection_token: String,
}

impl LobbyModel {
    /// An empty model, optionally seeded with a reconnection token.
    pub fn new(reconnection_token: impl Into<String>) -> Self {
        Self {
            reconnection_token: reconnection_token.into(),
            ..Self::default()
        }
    }

    /// The current lobby. Its id is empty when not in a lobby.
    pub fn lobby(&self) -> &LobbyInfo {
        &self.lobby
    }

    /// The local peer.
    pub fn peer(&self) -> &LobbyPeer {
        &self.peer
    }

    /// The roster, in roster order.
    pub fn peers(&self) -> &[LobbyPeer] {
        &self.peers
    }

    /// Private lobby data, only populated for the host.
    pub fn host_data(&self) -> &JsonMap {
        &self.host_data
    }

    /// The local peer's private data.
    pub fn peer_data(&self) -> &JsonMap {
        &self.peer_data
    }

    /// Token offered on the next connection to resume the same seat.
    pub fn reconnection_token(&self) -> &str {
        &self.reconnection_token
    }

    /// Whether the client currently occupies a lobby.
    pub fn in_lobby(&self) -> bool {
        !self.lobby.id.is_empty()
    }

    /// Whether the local peer hosts the current lobby.
    pub fn is_host(&self) -> bool {
        self.in_lobby() && !self.peer.id.is_empty() && self.peer.id == self.lobby.host
    }

    /// Reset the lobby, the roster, both private stores and the local peer's
    /// lobby-scoped fields. The local peer's identity and the reconnection
    /// token survive.
    pub fn clear(&mut self) {
        self.lobby = LobbyInfo::default();
        self.peers.clear();
        self.host_data.clear();
        self.peer_data.clear();
        self.peer.public_data.clear();
        self.peer.ready = false;
    }

    /// Patch the lobby from a wire object. With `capture_private`, a
    /// `private_data` object replaces the host data.
    ///
    /// The player count always follows the local roster, whatever count the
    /// server reports.
    pub fn apply_lobby_patch(&mut self, dict: &JsonMap, capture_private: bool) {
        self.lobby.apply_dict(dict);
        if capture_private {
            if let Some(private_data) = get_map(dict, "private_data") {
                self.host_data = private_data.clone();
            }
        }
        self.sync_player_count();
    }

    /// Replace the roster with the server's authoritative list.
    pub fn apply_roster(&mut self, values: &[Value], capture_private: bool) {
        let (peers, private_data) = parse_roster(values);
        self.peers = peers;
        if capture_private {
            if let Some(private_data) = private_data {
                self.peer_data = private_data;
            }
        }
        self.sync_player_count();
    }

    /// Insert `peer`, or replace the entry with the same id. Returns `true`
    /// when the peer was new.
    pub fn upsert_peer(&mut self, peer: LobbyPeer) -> bool {
        let inserted = match self.peers.iter_mut().find(|p| p.id == peer.id) {
            Some(existing) => {
                *existing = peer;
                false
            }
            None => {
                self.peers.push(peer);
                sort_peers(&mut self.peers);
                true
            }
        };
        self.sync_player_count();
        inserted
    }

    /// Remove the peer with `id`, returning it.
    pub fn remove_peer(&mut self, id: &str) -> Option<LobbyPeer> {
        let index = self.peers.iter().position(|p| p.id == id)?;
        let removed = self.peers.remove(index);
        sort_peers(&mut self.peers);
        self.sync_player_count();
        Some(removed)
    }

    /// Look up a roster entry by id.
    pub fn find_peer(&self, id: &str) -> Option<&LobbyPeer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Mutate a roster entry in place. Order is preserved.
    pub fn patch_peer<F>(&mut self, id: &str, patch: F) -> Option<&LobbyPeer>
    where
        F: FnOnce(&mut LobbyPeer),
    {
        let peer = self.peers.iter_mut().find(|p| p.id == id)?;
        patch(peer);
        Some(peer)
    }

    fn sync_player_count(&mut self) {
        self.lobby.players = u32::try_from(self.peers.len()).unwrap_or(u32::MAX);
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
    use serde_json::json;

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn peer(id: &str) -> LobbyPeer {
        LobbyPeer {
            id: id.into(),
            name: format!("name-{id}"),
            ..LobbyPeer::default()
        }
    }

    fn ids(model: &LobbyModel) -> Vec<&str> {
        model.peers().iter().map(|p| p.id.as_str()).collect()
    }

    fn assert_roster_invariant(model: &LobbyModel) {
        let peers = model.peers();
        for pair in peers.windows(2) {
            assert_eq!(
                compare_peer_ids(&pair[0].id, &pair[1].id),
                Ordering::Less,
                "roster not strictly ordered: {:?}",
                ids(model)
            );
        }
        assert_eq!(model.lobby().players as usize, peers.len());
    }

    #[test]
    fn ordering_ignores_ascii_case() {
        assert_eq!(compare_peer_ids("abc", "ABD"), Ordering::Less);
        assert_eq!(compare_peer_ids("B", "a"), Ordering::Greater);
        assert_eq!(compare_peer_ids("Ab", "aB"), Ordering::Equal);
        assert_eq!(compare_peer_ids("a", "ab"), Ordering::Less);
    }

    #[test]
    fn sort_is_stable_for_case_variants() {
        let mut peers = vec![peer("b"), peer("A"), peer("a"), peer("C")];
        sort_peers(&mut peers);
        let ids: Vec<_> = peers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["A", "a", "b", "C"]);
    }

    #[test]
    fn roster_invariant_holds_over_mixed_operations() {
        let mut model = LobbyModel::default();
        model.lobby.id = "L1".into();
        let pool = ["p1", "P2", "p3", "Alpha", "beta", "GAMMA", "p10", "_x"];
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let id = pool[(seed >> 8) as usize % pool.len()];
            match (seed >> 20) % 3 {
                0 => {
                    model.upsert_peer(peer(id));
                }
                1 => {
                    model.remove_peer(id);
                }
                _ => {
                    model.patch_peer(id, |p| p.name = format!("renamed-{}", seed));
                }
            }
            assert_roster_invariant(&model);
        }
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let mut model = LobbyModel::default();
        assert!(model.upsert_peer(peer("P1")));
        let mut updated = peer("P1");
        updated.ready = true;
        assert!(!model.upsert_peer(updated));
        assert_eq!(model.peers().len(), 1);
        assert!(model.peers()[0].ready);
    }

    #[test]
    fn patch_does_not_reorder() {
        let mut model = LobbyModel::default();
        model.apply_roster(
            &[json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})],
            true,
        );
        model.patch_peer("b", |p| p.id = "z".into());
        assert_eq!(ids(&model), ["a", "z", "c"]);
    }

    #[test]
    fn roster_rebuild_discards_absent_peers_and_captures_private_data() {
        let mut model = LobbyModel::default();
        model.upsert_peer(peer("old"));
        model.apply_roster(
            &[
                json!({"id": "p2", "name": "Bob"}),
                json!({"id": "P1", "name": "Me", "private_data": {"gold": 5}}),
                json!("not a peer"),
            ],
            true,
        );
        assert_eq!(ids(&model), ["P1", "p2"]);
        assert_eq!(model.lobby().players, 2);
        assert_eq!(Value::Object(model.peer_data().clone()), json!({"gold": 5}));
    }

    #[test]
    fn roster_without_private_capability_leaves_peer_data() {
        let mut model = LobbyModel::default();
        model.apply_roster(&[json!({"id": "P1", "private_data": {"a": 1}})], false);
        assert!(model.peer_data().is_empty());
    }

    #[test]
    fn lobby_patch_keeps_absent_fields() {
        let mut lobby = LobbyInfo::from_dict(&obj(json!({
            "id": "L1", "name": "Arena", "max_players": 4, "host": "P1"
        })));
        lobby.apply_dict(&obj(json!({"sealed": true, "name": 7})));
        assert_eq!(lobby.id, "L1");
        assert_eq!(lobby.name, "Arena");
        assert_eq!(lobby.max_players, 4);
        assert!(lobby.sealed);
    }

    #[test]
    fn lobby_snapshot_round_trips_on_overlapping_keys() {
        let snapshot = obj(json!({
            "id": "L9",
            "name": "Dungeon",
            "host": "P3",
            "host_name": "Carol",
            "max_players": 8,
            "players": 3,
            "sealed": true,
            "has_password": true,
            "tags": {"mode": "ranked"},
            "public_data": {"map": "forest"},
            "unrelated": 1
        }));
        let mut lobby = LobbyInfo::default();
        lobby.apply_dict(&snapshot);
        let exported = lobby.to_dict();
        for (key, value) in &exported {
            if let Some(original) = snapshot.get(key) {
                assert_eq!(original, value, "mismatch on {key}");
            }
        }
        assert!(!exported.contains_key("unrelated"));
    }

    #[test]
    fn lobby_private_data_captured_into_host_data() {
        let mut model = LobbyModel::default();
        model.apply_lobby_patch(&obj(json!({"id": "L1", "private_data": {"k": "v"}})), true);
        assert_eq!(Value::Object(model.host_data().clone()), json!({"k": "v"}));

        let mut model = LobbyModel::default();
        model.apply_lobby_patch(&obj(json!({"id": "L1", "private_data": {"k": "v"}})), false);
        assert!(model.host_data().is_empty());
    }

    #[test]
    fn lobby_patch_keeps_count_tied_to_roster() {
        let mut model = LobbyModel::default();
        model.apply_lobby_patch(&obj(json!({"id": "L1", "players": 1})), true);
        assert_eq!(model.lobby().players, 0);
        assert_roster_invariant(&model);

        model.upsert_peer(peer("P1"));
        model.apply_lobby_patch(&obj(json!({"id": "L1", "players": 5})), true);
        assert_eq!(model.lobby().players, 1);
        assert_roster_invariant(&model);
    }

    #[test]
    fn negative_counts_are_ignored() {
        let lobby = LobbyInfo::from_dict(&obj(json!({"max_players": -3, "players": 2.0})));
        assert_eq!(lobby.max_players, 0);
        assert_eq!(lobby.players, 2);
    }

    #[test]
    fn clear_resets_lobby_state_but_keeps_identity() {
        let mut model = LobbyModel::new("tok");
        model.peer = LobbyPeer {
            id: "P1".into(),
            ready: true,
            public_data: obj(json!({"a": 1})),
            ..LobbyPeer::default()
        };
        model.apply_lobby_patch(&obj(json!({"id": "L1", "host": "P1"})), true);
        model.apply_roster(&[json!({"id": "P1", "private_data": {"x": 1}})], true);
        model.host_data = obj(json!({"h": 1}));
        assert!(model.is_host());

        model.clear();

        assert_eq!(model.lobby(), &LobbyInfo::default());
        assert!(model.peers().is_empty());
        assert!(model.host_data().is_empty());
        assert!(model.peer_data().is_empty());
        assert!(!model.peer().ready);
        assert!(model.peer().public_data.is_empty());
        assert_eq!(model.peer().id, "P1");
        assert_eq!(model.reconnection_token(), "tok");
        assert!(!model.is_host());
    }
}
