//! Outstanding commands awaiting a correlated response.
//!
//! Every facade call registers one entry keyed by its correlation id and hands
//! the caller a [`LobbyResponse`]. The entry is removed before its handle is
//! completed, so each id resolves or rejects at most once; frames that carry
//! an unknown id leave the table untouched.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{LobbyError, Result};
use crate::model::{parse_roster, LobbyInfo, LobbyPeer};
use crate::protocol::{get_array, get_map, CommandId, JsonMap};

/// Shape of the success value a pending command resolves with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Plain acknowledgement, resolves with `()`.
    Request,
    /// Resolves with a [`ViewLobbyResult`].
    ViewLobby,
    /// Resolves with a list of [`LobbyInfo`].
    ListLobbies,
    /// Resolves with the server function's return value.
    Call,
}

/// A lobby together with its roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewLobbyResult {
    /// The lobby.
    pub lobby: LobbyInfo,
    /// Its peers, in roster order.
    pub peers: Vec<LobbyPeer>,
}

impl ViewLobbyResult {
    fn from_data(data: &JsonMap) -> Self {
        let lobby = get_map(data, "lobby")
            .map(LobbyInfo::from_dict)
            .unwrap_or_default();
        let (peers, _) = parse_roster(get_array(data, "peers").unwrap_or_default());
        Self { lobby, peers }
    }
}

fn lobbies_from_data(data: &JsonMap) -> Vec<LobbyInfo> {
    get_array(data, "lobbies")
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_object)
        .map(LobbyInfo::from_dict)
        .collect()
}

// ── Responder ───────────────────────────────────────────────────────

/// The sending half of a [`LobbyResponse`], tagged with its shape.
#[derive(Debug)]
pub(crate) enum Responder {
    Ack(oneshot::Sender<Result<()>>),
    View(oneshot::Sender<Result<ViewLobbyResult>>),
    List(oneshot::Sender<Result<Vec<LobbyInfo>>>),
    Call(oneshot::Sender<Result<Value>>),
}

impl Responder {
    pub(crate) fn kind(&self) -> CommandKind {
        match self {
            Self::Ack(_) => CommandKind::Request,
            Self::View(_) => CommandKind::ViewLobby,
            Self::List(_) => CommandKind::ListLobbies,
            Self::Call(_) => CommandKind::Call,
        }
    }

    /// Complete with a success shaped from the response payload.
    pub(crate) fn resolve(self, data: &JsonMap) {
        // A dropped receiver means the caller stopped listening.
        let _ = match self {
            Self::Ack(tx) => tx.send(Ok(())).map_err(drop),
            Self::View(tx) => tx.send(Ok(ViewLobbyResult::from_data(data))).map_err(drop),
            Self::List(tx) => tx.send(Ok(lobbies_from_data(data))).map_err(drop),
            Self::Call(tx) => {
                let result = data.get("result").cloned().unwrap_or(Value::Null);
                tx.send(Ok(result)).map_err(drop)
            }
        };
    }

    /// Complete with `error`.
    pub(crate) fn reject(self, error: LobbyError) {
        let _ = match self {
            Self::Ack(tx) => tx.send(Err(error)).map_err(drop),
            Self::View(tx) => tx.send(Err(error)).map_err(drop),
            Self::List(tx) => tx.send(Err(error)).map_err(drop),
            Self::Call(tx) => tx.send(Err(error)).map_err(drop),
        };
    }
}

/// Success types a [`LobbyResponse`] can carry.
pub(crate) trait ResponseShape: Sized {
    fn responder(tx: oneshot::Sender<Result<Self>>) -> Responder;
}

impl ResponseShape for () {
    fn responder(tx: oneshot::Sender<Result<Self>>) -> Responder {
        Responder::Ack(tx)
    }
}

impl ResponseShape for ViewLobbyResult {
    fn responder(tx: oneshot::Sender<Result<Self>>) -> Responder {
        Responder::View(tx)
    }
}

impl ResponseShape for Vec<LobbyInfo> {
    fn responder(tx: oneshot::Sender<Result<Self>>) -> Responder {
        Responder::List(tx)
    }
}

impl ResponseShape for Value {
    fn responder(tx: oneshot::Sender<Result<Self>>) -> Responder {
        Responder::Call(tx)
    }
}

/// Create a linked responder and caller handle for command `id`.
pub(crate) fn response_channel<T: ResponseShape>(id: CommandId) -> (Responder, LobbyResponse<T>) {
    let (tx, rx) = oneshot::channel();
    let responder = T::responder(tx);
    let kind = responder.kind();
    (responder, LobbyResponse { id, kind, rx })
}

// ── Caller handle ───────────────────────────────────────────────────

/// Handle to the eventual outcome of a lobby operation.
///
/// Await it from async code, or check [`try_result`](Self::try_result) after
/// each [`LobbyClient::poll`](crate::LobbyClient::poll) from a game loop.
/// Exactly one outcome is ever delivered.
#[derive(Debug)]
pub struct LobbyResponse<T> {
    id: CommandId,
    kind: CommandKind,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> LobbyResponse<T> {
    /// Correlation id of the command.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shape of the expected success value.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Take the outcome if it has arrived.
    ///
    /// Returns `None` while the command is outstanding. Once the outcome has
    /// been taken, further calls yield [`LobbyError::ResponseDropped`].
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(LobbyError::ResponseDropped)),
        }
    }
}

impl<T> Future for LobbyResponse<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(LobbyError::ResponseDropped)))
    }
}

// ── Table ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct PendingEntry {
    responder: Responder,
    deadline: Option<Instant>,
}

/// Pending commands keyed by correlation id.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    entries: HashMap<CommandId, PendingEntry>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, id: CommandId, responder: Responder, deadline: Option<Instant>) {
        if let Some(stale) = self.entries.insert(id.clone(), PendingEntry { responder, deadline }) {
            tracing::warn!(id = %id, "replacing pending command with a reused id");
            stale.responder.reject(LobbyError::ResponseDropped);
        }
    }

    /// Kind of the entry registered under `id`.
    pub(crate) fn kind(&self, id: &str) -> Option<CommandKind> {
        self.entries.get(id).map(|entry| entry.responder.kind())
    }

    /// Remove the entry under `id` without completing it.
    pub(crate) fn take(&mut self, id: &str) -> Option<Responder> {
        self.entries.remove(id).map(|entry| entry.responder)
    }

    /// Resolve the entry under `id` from `data`. Returns `false` for unknown
    /// ids.
    pub(crate) fn resolve(&mut self, id: &str, data: &JsonMap) -> bool {
        match self.take(id) {
            Some(responder) => {
                responder.resolve(data);
                true
            }
            None => false,
        }
    }

    /// Reject the entry under `id`. Returns `false` for unknown ids.
    pub(crate) fn reject(&mut self, id: &str, error: LobbyError) -> bool {
        match self.take(id) {
            Some(responder) => {
                responder.reject(error);
                true
            }
            None => false,
        }
    }

    /// Reject every entry whose deadline is at or before `now` with
    /// [`LobbyError::Timeout`]. Returns the expired ids.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<CommandId> {
        let expired: Vec<CommandId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.reject(id, LobbyError::Timeout);
        }
        expired
    }

    /// Reject every entry with a fresh error from `error`. Returns how many
    /// were rejected.
    pub(crate) fn reject_all<F>(&mut self, error: F) -> usize
    where
        F: Fn() -> LobbyError,
    {
        let drained: Vec<PendingEntry> = self.entries.drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.responder.reject(error());
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
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
    use std::time::Duration;

    fn obj(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn kinds_follow_result_type() {
        let (_, ack) = response_channel::<()>("0".into());
        let (_, view) = response_channel::<ViewLobbyResult>("1".into());
        let (_, list) = response_channel::<Vec<LobbyInfo>>("2".into());
        let (_, call) = response_channel::<Value>("3".into());
        assert_eq!(ack.kind(), CommandKind::Request);
        assert_eq!(view.kind(), CommandKind::ViewLobby);
        assert_eq!(list.kind(), CommandKind::ListLobbies);
        assert_eq!(call.kind(), CommandKind::Call);
        assert_eq!(call.id(), "3");
    }

    #[test]
    fn resolves_at_most_once() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<()>("4".into());
        table.register("4".into(), responder, None);

        assert!(handle.try_result().is_none());
        assert!(table.resolve("4", &JsonMap::new()));
        assert!(!table.resolve("4", &JsonMap::new()));
        assert!(!table.reject("4", LobbyError::Timeout));

        assert!(handle.try_result().unwrap().is_ok());
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_id_is_a_no_op() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<()>("1".into());
        table.register("1".into(), responder, None);
        assert!(!table.resolve("2", &JsonMap::new()));
        assert_eq!(table.len(), 1);
        assert!(handle.try_result().is_none());
    }

    #[test]
    fn view_result_is_shaped_from_lobby_and_peers() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<ViewLobbyResult>("0".into());
        table.register("0".into(), responder, None);
        let data = obj(json!({
            "id": "0",
            "lobby": {"id": "L1", "name": "Arena"},
            "peers": [{"id": "p2"}, {"id": "P1"}]
        }));
        table.resolve("0", &data);
        let view = handle.try_result().unwrap().unwrap();
        assert_eq!(view.lobby.id, "L1");
        let ids: Vec<_> = view.peers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["P1", "p2"]);
    }

    #[test]
    fn list_result_skips_non_objects() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<Vec<LobbyInfo>>("9".into());
        table.register("9".into(), responder, None);
        let data = obj(json!({"lobbies": [{"id": "A"}, 3, {"id": "B", "players": 2}]}));
        table.resolve("9", &data);
        let lobbies = handle.try_result().unwrap().unwrap();
        assert_eq!(lobbies.len(), 2);
        assert_eq!(lobbies[1].players, 2);
    }

    #[test]
    fn call_result_defaults_to_null() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<Value>("5".into());
        table.register("5".into(), responder, None);
        table.resolve("5", &JsonMap::new());
        assert_eq!(handle.try_result().unwrap().unwrap(), Value::Null);
    }

    #[test]
    fn rejection_keeps_the_typed_shape() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<Vec<LobbyInfo>>("6".into());
        table.register("6".into(), responder, None);
        table.reject(
            "6",
            LobbyError::Server {
                message: "bad filter".into(),
            },
        );
        let error = handle.try_result().unwrap().unwrap_err();
        assert_eq!(error.server_message(), Some("bad filter"));
    }

    #[test]
    fn expire_rejects_only_overdue_entries() {
        let mut table = PendingTable::new();
        let now = Instant::now();
        let (overdue, mut overdue_handle) = response_channel::<()>("1".into());
        let (fresh, mut fresh_handle) = response_channel::<()>("2".into());
        let (forever, _forever_handle) = response_channel::<()>("3".into());
        table.register("1".into(), overdue, Some(now));
        table.register("2".into(), fresh, Some(now + Duration::from_secs(60)));
        table.register("3".into(), forever, None);

        let expired = table.expire(now);

        assert_eq!(expired, vec!["1".to_string()]);
        assert!(matches!(
            overdue_handle.try_result(),
            Some(Err(LobbyError::Timeout))
        ));
        assert!(fresh_handle.try_result().is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn reject_all_drains_table() {
        let mut table = PendingTable::new();
        let (a, mut a_handle) = response_channel::<()>("1".into());
        let (b, mut b_handle) = response_channel::<ViewLobbyResult>("2".into());
        table.register("1".into(), a, None);
        table.register("2".into(), b, None);

        assert_eq!(table.reject_all(|| LobbyError::Disconnected), 2);
        assert!(table.is_empty());
        assert!(matches!(a_handle.try_result(), Some(Err(LobbyError::Disconnected))));
        assert!(matches!(b_handle.try_result(), Some(Err(LobbyError::Disconnected))));
    }

    #[test]
    fn take_removes_without_completing() {
        let mut table = PendingTable::new();
        let (responder, mut handle) = response_channel::<()>("1".into());
        table.register("1".into(), responder, None);
        assert_eq!(table.kind("1"), Some(CommandKind::Request));
        let responder = table.take("1").unwrap();
        assert!(table.kind("1").is_none());
        assert!(handle.try_result().is_none());
        drop(responder);
        assert!(matches!(
            handle.try_result(),
            Some(Err(LobbyError::ResponseDropped))
        ));
    }

    #[tokio::test]
    async fn handle_is_awaitable() {
        let (responder, handle) = response_channel::<Value>("1".into());
        responder.resolve(&obj(json!({"result": 42})));
        assert_eq!(handle.await.unwrap(), json!(42));
    }
}
