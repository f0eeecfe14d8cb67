//! Transport abstraction for the lobby protocol.
//!
//! The [`Transport`] trait describes a duplex text-message channel that is
//! driven by polling. The lobby engine never blocks on it: every tick calls
//! [`poll`](Transport::poll), inspects [`ready_state`](Transport::ready_state)
//! and drains whatever frames are buffered.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use std::collections::VecDeque;
//!
//! use blazium_lobby_client::error::LobbyError;
//! use blazium_lobby_client::transport::{ReadyState, Transport};
//!
//! struct LoopbackTransport {
//!     state: ReadyState,
//!     inbox: VecDeque<String>,
//! }
//!
//! impl Transport for LoopbackTransport {
//!     fn connect(&mut self, _url: &str, _protocols: &[String]) -> Result<(), LobbyError> {
//!         self.state = ReadyState::Open;
//!         Ok(())
//!     }
//!
//!     fn poll(&mut self) {}
//!
//!     fn ready_state(&self) -> ReadyState {
//!         self.state
//!     }
//!
//!     fn available_message_count(&self) -> usize {
//!         self.inbox.len()
//!     }
//!
//!     fn next_message(&mut self) -> Option<String> {
//!         self.inbox.pop_front()
//!     }
//!
//!     fn send(&mut self, message: String) -> Result<(), LobbyError> {
//!         self.inbox.push_back(message);
//!         Ok(())
//!     }
//!
//!     fn close(&mut self, _code: u16, _reason: &str) {
//!         self.state = ReadyState::Closed;
//!     }
//!
//!     fn close_reason(&self) -> Option<String> {
//!         None
//!     }
//! }
//! ```

use crate::error::LobbyError;

/// WebSocket close code for a normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Readiness of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyState {
    /// The opening handshake is in progress.
    Connecting,
    /// Frames can be sent and received.
    Open,
    /// The closing handshake is in progress.
    Closing,
    /// The socket is closed (or was never opened).
    #[default]
    Closed,
}

/// A polled, bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame and
/// each call to [`next_message`](Transport::next_message) yields one. None of
/// the methods may block.
pub trait Transport: Send + 'static {
    /// Start opening a connection to `url`, offering `protocols` as the
    /// ordered subprotocol list.
    ///
    /// Returning `Ok` means the attempt started, not that the socket is open.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportConnect`] if the attempt cannot start
    /// (malformed URL, missing runtime, ...).
    fn connect(&mut self, url: &str, protocols: &[String]) -> Result<(), LobbyError>;

    /// Advance the transport: pick up readiness changes and buffer inbound
    /// frames.
    fn poll(&mut self);

    /// Current socket readiness.
    fn ready_state(&self) -> ReadyState;

    /// Number of inbound frames buffered and ready to be read.
    fn available_message_count(&self) -> usize;

    /// Pop the next buffered inbound frame.
    fn next_message(&mut self) -> Option<String>;

    /// Queue a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::TransportClosed`] if the socket is not open, or
    /// [`LobbyError::TransportSend`] if the frame could not be queued.
    fn send(&mut self, message: String) -> Result<(), LobbyError>;

    /// Start the closing handshake with the given close code and reason.
    fn close(&mut self, code: u16, reason: &str);

    /// Reason given by the peer when the socket closed, if any.
    fn close_reason(&self) -> Option<String>;
}
