//! The seam between a [`WebSocket`](crate::WebSocket) and the wire.
//!
//! [`StreamTransport`] speaks RFC 6455 over any upgraded byte stream;
//! [`memory::channel`](crate::memory::channel) connects a socket to an
//! in-process client.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::Role;

use crate::error::{CloseCode, WsError, WsResult};
use crate::message::{CloseFrame, Message};

/// Carries messages for one WebSocket connection.
#[async_trait]
pub trait WsTransport: Send {
    /// Complete the handshake on the server side.
    async fn accept(&mut self) -> WsResult<()>;

    /// Send one message.
    async fn send(&mut self, message: Message) -> WsResult<()>;

    /// Receive the next message. `None` once the peer has gone.
    async fn recv(&mut self) -> Option<WsResult<Message>>;

    /// Close the connection with `code`.
    async fn close(&mut self, code: CloseCode) -> WsResult<()>;
}

/// Transport over an already upgraded byte stream.
pub struct StreamTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream whose HTTP upgrade has completed.
    pub async fn from_upgraded(io: S) -> Self {
        let stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
        Self { stream }
    }
}

#[async_trait]
impl<S> WsTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn accept(&mut self) -> WsResult<()> {
        // The 101 response went out before the stream was handed over.
        Ok(())
    }

    async fn send(&mut self, message: Message) -> WsResult<()> {
        self.stream.send(message.into()).await.map_err(WsError::from)
    }

    async fn recv(&mut self) -> Option<WsResult<Message>> {
        self.stream
            .next()
            .await
            .map(|item| item.map(Message::from).map_err(WsError::from))
    }

    async fn close(&mut self, code: CloseCode) -> WsResult<()> {
        let frame = CloseFrame::new(code, "");
        match self.stream.close(Some(frame.into())).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
