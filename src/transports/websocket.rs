//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] adapts an async `tokio-tungstenite` stream to the
//! polled [`Transport`] interface. [`connect`](Transport::connect) spawns a
//! socket task on the current tokio runtime; the task forwards inbound text
//! frames and lifecycle changes over a channel that
//! [`poll`](Transport::poll) drains without blocking. Both `ws://` and
//! `wss://` URLs are supported.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), blazium_lobby_client::LobbyError> {
//! use blazium_lobby_client::{ReadyState, Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::new();
//! transport.connect("ws://localhost:8080/connect", &["blazium".to_string()])?;
//! while transport.ready_state() == ReadyState::Connecting {
//!     transport.poll();
//!     tokio::task::yield_now().await;
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use crate::error::LobbyError;
use crate::transport::{ReadyState, Transport};

/// Commands from the transport handle to the socket task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Notifications from the socket task to the transport handle.
#[derive(Debug)]
enum Incoming {
    Opened,
    Text(String),
    Closed { reason: Option<String> },
}

/// A polled [`Transport`] backed by a WebSocket connection.
///
/// Requires a tokio runtime when [`connect`](Transport::connect) is called;
/// the socket I/O runs on a task spawned there. Dropping the transport aborts
/// that task.
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    state: ReadyState,
    inbox: VecDeque<String>,
    close_reason: Option<String>,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    incoming: Option<mpsc::UnboundedReceiver<Incoming>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create an unconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn stop_task(&mut self) {
        self.outgoing = None;
        self.incoming = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn build_request(url: &str, protocols: &[String]) -> Result<Request, LobbyError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| LobbyError::TransportConnect(e.to_string()))?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| LobbyError::TransportConnect(e.to_string()))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(request)
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str, protocols: &[String]) -> Result<(), LobbyError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LobbyError::TransportConnect(e.to_string()))?;
        let request = build_request(url, protocols)?;

        self.stop_task();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tracing::debug!(url = %url, ?protocols, "connecting to WebSocket server");
        self.task = Some(runtime.spawn(socket_loop(request, out_rx, in_tx)));
        self.outgoing = Some(out_tx);
        self.incoming = Some(in_rx);
        self.inbox.clear();
        self.close_reason = None;
        self.state = ReadyState::Connecting;
        Ok(())
    }

    fn poll(&mut self) {
        let Some(incoming) = self.incoming.as_mut() else {
            return;
        };
        let mut finished = false;
        while !finished {
            match incoming.try_recv() {
                Ok(Incoming::Opened) => {
                    if self.state == ReadyState::Connecting {
                        self.state = ReadyState::Open;
                    }
                }
                Ok(Incoming::Text(text)) => self.inbox.push_back(text),
                Ok(Incoming::Closed { reason }) => {
                    self.close_reason = reason;
                    finished = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => finished = true,
            }
        }
        if finished {
            self.state = ReadyState::Closed;
            self.stop_task();
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.state
    }

    fn available_message_count(&self) -> usize {
        self.inbox.len()
    }

    fn next_message(&mut self) -> Option<String> {
        self.inbox.pop_front()
    }

    fn send(&mut self, message: String) -> Result<(), LobbyError> {
        if self.state != ReadyState::Open {
            return Err(LobbyError::TransportClosed);
        }
        let outgoing = self.outgoing.as_ref().ok_or(LobbyError::TransportClosed)?;
        outgoing
            .send(Outgoing::Text(message))
            .map_err(|_| LobbyError::TransportSend("WebSocket task has stopped".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        match self.state {
            ReadyState::Open => {
                if let Some(outgoing) = &self.outgoing {
                    let _ = outgoing.send(Outgoing::Close {
                        code,
                        reason: reason.to_string(),
                    });
                }
                self.state = ReadyState::Closing;
            }
            ReadyState::Connecting => {
                self.stop_task();
                self.close_reason = Some(reason.to_string());
                self.state = ReadyState::Closed;
            }
            ReadyState::Closing | ReadyState::Closed => {}
        }
    }

    fn close_reason(&self) -> Option<String> {
        self.close_reason.clone()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop_task();
    }
}

/// Own the socket: open it, then shuttle frames both ways until either side
/// closes.
async fn socket_loop(
    request: Request,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    incoming: mpsc::UnboundedSender<Incoming>,
) {
    let stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket connection failed");
            let _ = incoming.send(Incoming::Closed {
                reason: Some(e.to_string()),
            });
            return;
        }
    };
    tracing::info!("WebSocket connection established");
    let _ = incoming.send(Incoming::Opened);

    let (mut sink, mut source) = stream.split();
    let mut closing = false;
    let reason = loop {
        tokio::select! {
            command = outgoing.recv(), if !closing => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break Some(e.to_string());
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "failed to send WebSocket close frame");
                        break None;
                    }
                    closing = true;
                }
                None => {
                    // The transport handle was dropped or reconnected.
                    let _ = sink.close().await;
                    break None;
                }
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if incoming.send(Incoming::Text(text.to_string())).is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    break frame.map(|f| f.reason.to_string());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // tungstenite answers pings itself.
                }
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Some(Ok(Message::Frame(_))) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };
    let _ = incoming.send(Incoming::Closed { reason });
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response as ServerResponse,
    };

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn connect_without_runtime_fails_synchronously() {
        let mut transport = WebSocketTransport::new();
        let err = transport
            .connect("ws://127.0.0.1:1", &["blazium".to_string()])
            .unwrap_err();
        assert!(matches!(err, LobbyError::TransportConnect(_)));
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn send_before_open_is_rejected() {
        let mut transport = WebSocketTransport::new();
        let err = transport.send("x".to_string()).unwrap_err();
        assert!(matches!(err, LobbyError::TransportClosed));
    }

    /// Poll until `done` holds or roughly two seconds pass.
    async fn poll_until<F>(transport: &mut WebSocketTransport, mut done: F)
    where
        F: FnMut(&WebSocketTransport) -> bool,
    {
        for _ in 0..200 {
            transport.poll();
            if done(transport) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached, state {:?}", transport.ready_state());
    }

    /// Start a local WebSocket server that records the offered subprotocols,
    /// accepts `blazium`, and runs `handler` on the connection.
    async fn start_mock_server<F, Fut>(handler: F) -> (String, Arc<StdMutex<Option<String>>>)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let offered = Arc::new(StdMutex::new(None));
        let offered_in_server = Arc::clone(&offered);

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |request: &ServerRequest,
                                 mut response: ServerResponse|
                  -> Result<ServerResponse, ErrorResponse> {
                let header = request
                    .headers()
                    .get(SEC_WEBSOCKET_PROTOCOL)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                *offered_in_server.lock().unwrap() = header;
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("blazium"));
                Ok(response)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            handler(ws).await;
        });

        (format!("ws://{addr}"), offered)
    }

    #[tokio::test]
    async fn offers_subprotocols_in_order() {
        let (url, offered) = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::new();
        let protocols = vec!["blazium".to_string(), "game".to_string(), "tok".to_string()];
        transport.connect(&url, &protocols).unwrap();
        poll_until(&mut transport, |t| t.ready_state() == ReadyState::Open).await;

        assert_eq!(
            offered.lock().unwrap().as_deref(),
            Some("blazium, game, tok")
        );
    }

    #[tokio::test]
    async fn buffers_text_skips_binary_and_reports_close_reason() {
        let (url, _) = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("world".into())).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::new();
        transport.connect(&url, &["blazium".to_string()]).unwrap();
        poll_until(&mut transport, |t| t.ready_state() == ReadyState::Closed).await;

        assert_eq!(transport.available_message_count(), 2);
        assert_eq!(transport.next_message().as_deref(), Some("hello"));
        assert_eq!(transport.next_message().as_deref(), Some("world"));
        assert!(transport.next_message().is_none());
        assert_eq!(transport.close_reason().as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn send_round_trip() {
        let (url, _) = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::new();
        transport.connect(&url, &["blazium".to_string()]).unwrap();
        poll_until(&mut transport, |t| t.ready_state() == ReadyState::Open).await;

        transport.send("echo".to_string()).unwrap();
        poll_until(&mut transport, |t| t.available_message_count() > 0).await;
        assert_eq!(transport.next_message().as_deref(), Some("echo"));

        transport.close(1000, "Normal Closure");
        assert_eq!(transport.ready_state(), ReadyState::Closing);
        assert!(matches!(
            transport.send("late".to_string()),
            Err(LobbyError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn unreachable_host_closes_with_reason() {
        let mut transport = WebSocketTransport::new();
        transport
            .connect("ws://127.0.0.1:1", &["blazium".to_string()])
            .unwrap();
        assert_eq!(transport.ready_state(), ReadyState::Connecting);
        poll_until(&mut transport, |t| t.ready_state() == ReadyState::Closed).await;
        assert!(transport.close_reason().is_some());
    }

    #[tokio::test]
    async fn close_while_connecting_is_immediate() {
        let mut transport = WebSocketTransport::new();
        transport
            .connect("ws://192.0.2.1:1", &["blazium".to_string()])
            .unwrap();
        transport.close(1000, "Normal Closure");
        assert_eq!(transport.ready_state(), ReadyState::Closed);
        transport.poll();
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }
}
