//! Error types for the lobby client.

use thiserror::Error;

/// Errors that can occur when using the lobby client.
///
/// Every failure of a lobby operation is delivered through the operation's
/// [`LobbyResponse`](crate::LobbyResponse) rather than returned synchronously.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// The transport could not start connecting to the lobby server.
    #[error("unable to connect to lobby server: {0}")]
    TransportConnect(String),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// The transport is not open.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize an outgoing command.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation requires an established connection.
    #[error("not connected to lobby server")]
    NotConnected,

    /// The connection was torn down while the command was outstanding.
    #[error("disconnected from lobby server")]
    Disconnected,

    /// The operation is not available with the configured capabilities.
    #[error("operation not supported by this client: {0}")]
    Unsupported(&'static str),

    /// The server answered the command with an `error` frame.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// No response arrived before the command timeout elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The client was dropped before the command completed.
    #[error("response handle was dropped before completion")]
    ResponseDropped,
}

impl LobbyError {
    /// Returns the server-supplied message for [`LobbyError::Server`] errors.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message } => Some(message),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for lobby client operations.
pub type Result<T> = std::result::Result<T, LobbyError>;
