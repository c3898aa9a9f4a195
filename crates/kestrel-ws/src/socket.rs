//! The connection object handed to WebSocket handlers.

use std::fmt;

use http::{HeaderMap, Uri};
use kestrel_core::{Cookies, QueryDict};
use kestrel_router::Params;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{CloseCode, WsError, WsResult};
use crate::message::Message;
use crate::transport::WsTransport;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Handshake not yet accepted.
    Connecting,
    /// Accepted and open.
    Connected,
    /// Closed by either side.
    Closed,
}

/// A WebSocket connection as seen by a handler.
///
/// The handler decides when to [`accept`](Self::accept); closing before
/// accepting rejects the handshake.
pub struct WebSocket {
    path: String,
    query: QueryDict,
    headers: HeaderMap,
    params: Params,
    state: SocketState,
    transport: Box<dyn WsTransport>,
}

impl WebSocket {
    /// Create a connection for `uri` carried by `transport`.
    pub fn new(uri: &Uri, headers: HeaderMap, transport: impl WsTransport + 'static) -> Self {
        Self {
            path: uri.path().to_string(),
            query: uri.query().map(QueryDict::parse).unwrap_or_default(),
            headers,
            params: Params::new(),
            state: SocketState::Connecting,
            transport: Box::new(transport),
        }
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path, used when a mount strips its prefix.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Query string parameters.
    pub fn query(&self) -> &QueryDict {
        &self.query
    }

    /// Handshake headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Cookies sent with the handshake.
    pub fn cookies(&self) -> Cookies {
        Cookies::from_headers(&self.headers)
    }

    /// Path parameters from the matched route.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Set the path parameters.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Current state.
    pub fn state(&self) -> SocketState {
        self.state
    }

    /// Whether the handshake was accepted and the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Connected
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.state == SocketState::Closed
    }

    /// Accept the handshake.
    pub async fn accept(&mut self) -> WsResult<()> {
        match self.state {
            SocketState::Connecting => {
                self.transport.accept().await?;
                self.state = SocketState::Connected;
                debug!(path = %self.path, "websocket accepted");
                Ok(())
            }
            SocketState::Connected => Err(WsError::AlreadyAccepted),
            SocketState::Closed => Err(WsError::connection_closed(None, "already closed")),
        }
    }

    fn ensure_connected(&self) -> WsResult<()> {
        match self.state {
            SocketState::Connected => Ok(()),
            SocketState::Connecting => Err(WsError::NotAccepted),
            SocketState::Closed => Err(WsError::connection_closed(None, "already closed")),
        }
    }

    /// Send a message.
    pub async fn send(&mut self, message: impl Into<Message>) -> WsResult<()> {
        self.ensure_connected()?;
        self.transport.send(message.into()).await
    }

    /// Send a text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::Text(text.into())).await
    }

    /// Send a binary message.
    pub async fn send_bytes(&mut self, data: impl Into<Vec<u8>>) -> WsResult<()> {
        self.send(Message::Binary(data.into())).await
    }

    /// Send a value as a JSON text message.
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> WsResult<()> {
        let message = Message::json(value)?;
        self.send(message).await
    }

    /// Receive the next message.
    ///
    /// A close from the peer is returned once; afterwards this yields `None`.
    pub async fn recv(&mut self) -> Option<WsResult<Message>> {
        if let Err(e) = self.ensure_connected() {
            return match e {
                WsError::ConnectionClosed { .. } => None,
                other => Some(Err(other)),
            };
        }
        let next = self.transport.recv().await;
        match &next {
            Some(Ok(message)) if message.is_close() => self.state = SocketState::Closed,
            None => self.state = SocketState::Closed,
            _ => {}
        }
        next
    }

    async fn next_data(&mut self) -> WsResult<Message> {
        loop {
            match self.recv().await {
                Some(Ok(message)) if message.is_heartbeat() => {}
                Some(Ok(message)) if message.is_close() => {
                    return Err(WsError::connection_closed(
                        message.close_code(),
                        "peer closed",
                    ));
                }
                Some(result) => return result,
                None => return Err(WsError::connection_closed(None, "peer went away")),
            }
        }
    }

    /// Receive the next data message as text.
    pub async fn receive_text(&mut self) -> WsResult<String> {
        match self.next_data().await? {
            Message::Text(text) => Ok(text),
            _ => Err(WsError::decode_failed("expected a text message")),
        }
    }

    /// Receive the next data message as bytes.
    pub async fn receive_bytes(&mut self) -> WsResult<Vec<u8>> {
        match self.next_data().await? {
            Message::Binary(data) => Ok(data),
            Message::Text(text) => Ok(text.into_bytes()),
            _ => Err(WsError::decode_failed("expected a binary message")),
        }
    }

    /// Receive the next data message and parse it as JSON.
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> WsResult<T> {
        self.next_data().await?.parse_json()
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&mut self, code: CloseCode) -> WsResult<()> {
        if self.state == SocketState::Closed {
            return Ok(());
        }
        let was = self.state;
        self.state = SocketState::Closed;
        debug!(path = %self.path, code = %code, accepted = was == SocketState::Connected, "websocket closed");
        self.transport.close(code).await
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("path", &self.path)
            .field("params", &self.params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
