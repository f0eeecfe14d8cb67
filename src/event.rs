//! Notifications raised by the lobby client.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{LobbyInfo, LobbyPeer};
use crate::protocol::JsonMap;

/// Events delivered on the channel returned by
/// [`LobbyClient::new`](crate::LobbyClient::new).
///
/// Every inbound frame produces at most one specific event followed by a
/// [`Log`](LobbyEvent::Log) carrying the raw command and message.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// The server assigned (or restored) the local peer.
    ConnectedToLobby {
        /// The local peer.
        peer: LobbyPeer,
        /// Token to offer on the next connection to resume this seat.
        reconnection_token: String,
    },
    /// The connection was closed, locally or by the server.
    DisconnectedFromLobby {
        /// Close reason reported by the transport, if any.
        reason: Option<String>,
    },
    /// The local peer created a lobby and now hosts it.
    LobbyCreated {
        lobby: LobbyInfo,
        peers: Vec<LobbyPeer>,
    },
    /// The local peer joined a lobby.
    LobbyJoined {
        lobby: LobbyInfo,
        peers: Vec<LobbyPeer>,
    },
    /// The local peer left the lobby, or was kicked from it.
    LobbyLeft { kicked: bool },
    /// The lobby was sealed or unsealed.
    LobbySealed { sealed: bool },
    /// The lobby's tags changed.
    LobbyTagged { tags: JsonMap },
    /// Lobby data was pushed. Private data only reaches the host.
    ReceivedLobbyData { data: JsonMap, is_private: bool },
    /// Peer data was pushed to `to_peer`.
    ReceivedPeerData {
        data: JsonMap,
        to_peer: LobbyPeer,
        is_private: bool,
    },
    /// A peer sent a notification to the lobby or to the local peer.
    LobbyNotified { data: Value, from_peer: LobbyPeer },
    /// A peer joined the lobby.
    PeerJoined { peer: LobbyPeer },
    /// A soft-disconnected peer came back.
    PeerReconnected { peer: LobbyPeer },
    /// A peer left the lobby.
    PeerLeft { peer: LobbyPeer, kicked: bool },
    /// A peer lost its connection.
    PeerDisconnected { peer: LobbyPeer },
    /// A peer changed its display name.
    PeerNamed { peer: LobbyPeer },
    /// A peer toggled its ready flag.
    PeerReady { peer: LobbyPeer, ready: bool },
    /// A peer sent a chat line.
    PeerMessaged { peer: LobbyPeer, chat: String },
    /// Diagnostic line: the inbound command and its message, or a client-side
    /// condition such as `("error", "Socket is not ready.")`.
    Log { command: String, message: String },
}

impl LobbyEvent {
    pub(crate) fn log(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Sending side of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<LobbyEvent>,
}

impl EventSink {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<LobbyEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit an event. If the channel is full, log a warning and drop the event
    /// so the tick never blocks.
    pub(crate) fn emit(&self, event: LobbyEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    pub(crate) fn log(&self, command: impl Into<String>, message: impl Into<String>) {
        self.emit(LobbyEvent::log(command, message));
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

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.log("a", "first");
        sink.log("b", "second");
        assert_eq!(rx.try_recv().unwrap(), LobbyEvent::log("a", "first"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (sink, mut rx) = EventSink::channel(0);
        sink.emit(LobbyEvent::LobbyLeft { kicked: true });
        assert_eq!(rx.try_recv().unwrap(), LobbyEvent::LobbyLeft { kicked: true });
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sink, rx) = EventSink::channel(4);
        drop(rx);
        sink.log("error", "nobody listening");
    }
}
