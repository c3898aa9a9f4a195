//! In-process transport, used by the test client.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc;

use crate::error::{CloseCode, WsError, WsResult};
use crate::message::Message;
use crate::transport::WsTransport;

/// Frames travelling from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// The handshake was accepted.
    Accept,
    /// A message, including the final close.
    Message(Message),
}

/// Create a connected server transport and client.
pub fn channel() -> (MemoryTransport, MemoryClient) {
    let (to_client, from_server) = mpsc::unbounded_channel();
    let (to_server, from_client) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            outgoing: to_client,
            incoming: from_client,
        },
        MemoryClient {
            outgoing: to_server,
            incoming: from_server,
            accepted: false,
            close_code: None,
        },
    )
}

/// Server half of an in-process connection.
#[derive(Debug)]
pub struct MemoryTransport {
    outgoing: mpsc::UnboundedSender<ServerFrame>,
    incoming: mpsc::UnboundedReceiver<Message>,
}

impl MemoryTransport {
    fn push(&self, frame: ServerFrame) -> WsResult<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| WsError::connection_closed(None, "client went away"))
    }
}

#[async_trait]
impl WsTransport for MemoryTransport {
    async fn accept(&mut self) -> WsResult<()> {
        self.push(ServerFrame::Accept)
    }

    async fn send(&mut self, message: Message) -> WsResult<()> {
        self.push(ServerFrame::Message(message))
    }

    async fn recv(&mut self) -> Option<WsResult<Message>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self, code: CloseCode) -> WsResult<()> {
        // A client that already left has nothing to be told.
        let _ = self.push(ServerFrame::Message(Message::close(code)));
        Ok(())
    }
}

/// Client half of an in-process connection.
#[derive(Debug)]
pub struct MemoryClient {
    outgoing: mpsc::UnboundedSender<Message>,
    incoming: mpsc::UnboundedReceiver<ServerFrame>,
    accepted: bool,
    close_code: Option<u16>,
}

impl MemoryClient {
    /// Wait for the server to accept.
    ///
    /// Fails with [`WsError::ConnectionClosed`] when the server closes or
    /// drops the connection first.
    pub async fn handshake(&mut self) -> WsResult<()> {
        while !self.accepted {
            match self.incoming.recv().await {
                Some(ServerFrame::Accept) => self.accepted = true,
                Some(ServerFrame::Message(message)) if message.is_close() => {
                    self.close_code = message.close_code();
                    return Err(WsError::connection_closed(
                        self.close_code,
                        "closed during handshake",
                    ));
                }
                Some(ServerFrame::Message(_)) => {}
                None => return Err(WsError::connection_closed(None, "server went away")),
            }
        }
        Ok(())
    }

    /// Whether the server has accepted.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Close code received from the server, if any.
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Next message from the server, skipping the handshake frame.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.incoming.recv().await? {
                ServerFrame::Accept => self.accepted = true,
                ServerFrame::Message(message) => {
                    if message.is_close() {
                        self.close_code = message.close_code();
                    }
                    return Some(message);
                }
            }
        }
    }

    /// Next message, which must be text.
    pub async fn receive_text(&mut self) -> WsResult<String> {
        match self.recv().await {
            Some(Message::Text(text)) => Ok(text),
            Some(message) if message.is_close() => Err(WsError::connection_closed(
                message.close_code(),
                "server closed",
            )),
            Some(_) => Err(WsError::decode_failed("expected a text message")),
            None => Err(WsError::connection_closed(None, "server went away")),
        }
    }

    /// Next message, which must be binary.
    pub async fn receive_bytes(&mut self) -> WsResult<Vec<u8>> {
        match self.recv().await {
            Some(Message::Binary(data)) => Ok(data),
            Some(message) if message.is_close() => Err(WsError::connection_closed(
                message.close_code(),
                "server closed",
            )),
            Some(_) => Err(WsError::decode_failed("expected a binary message")),
            None => Err(WsError::connection_closed(None, "server went away")),
        }
    }

    /// Next message, parsed as JSON.
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> WsResult<T> {
        match self.recv().await {
            Some(message) if message.is_close() => Err(WsError::connection_closed(
                message.close_code(),
                "server closed",
            )),
            Some(message) => message.parse_json(),
            None => Err(WsError::connection_closed(None, "server went away")),
        }
    }

    /// Send a message to the server.
    pub fn send(&self, message: impl Into<Message>) -> WsResult<()> {
        self.outgoing
            .send(message.into())
            .map_err(|_| WsError::connection_closed(None, "server went away"))
    }

    /// Send a text message.
    pub fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Message::Text(text.into()))
    }

    /// Send a JSON message.
    pub fn send_json<T: Serialize>(&self, value: &T) -> WsResult<()> {
        self.send(Message::json(value)?)
    }

    /// Close from the client side.
    pub fn close(&self, code: CloseCode) -> WsResult<()> {
        self.send(Message::close(code))
    }
}
