//! Frames exchanged over a [`WebSocket`](crate::WebSocket).

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CloseCode, WsError, WsResult};

/// One frame as seen by handlers.
///
/// Converts to and from `tungstenite` frames at the transport edge. Text and
/// binary frames both carry JSON for [`Message::parse_json`].
///
/// # Example
///
/// ```rust
/// use kestrel_ws::{CloseCode, Message};
/// use serde_json::{json, Value};
///
/// let hello = Message::json(&json!({ "op": "join", "room": "lobby" })).unwrap();
/// assert!(hello.is_text());
///
/// let parsed: Value = hello.parse_json().unwrap();
/// assert_eq!(parsed["room"], "lobby");
///
/// let bye = Message::close(CloseCode::PolicyViolation);
/// assert_eq!(bye.close_code(), Some(1008));
/// assert!(bye.as_bytes().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Ping, answered by the transport.
    Ping(Vec<u8>),
    /// Pong.
    Pong(Vec<u8>),
    /// Close, with the peer's frame if it sent one.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Binary frame.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Close frame with `code` and no reason.
    pub fn close(code: CloseCode) -> Self {
        Self::Close(Some(CloseFrame {
            code: code.as_u16(),
            reason: String::new(),
        }))
    }

    /// `value` serialized as a JSON text frame.
    pub fn json<T: Serialize>(value: &T) -> WsResult<Self> {
        serde_json::to_string(value)
            .map(Self::Text)
            .map_err(|e| WsError::EncodeFailed(e.to_string()))
    }

    /// True for text frames.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// True for binary frames.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// True for close frames.
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Pings and pongs, which handlers never see through `receive_*`.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_))
    }

    /// Text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Payload bytes; `None` for close frames.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(s) => Some(s.as_bytes()),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => Some(b),
            Self::Close(_) => None,
        }
    }

    /// Close code carried by a close message.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Close(frame) => frame.as_ref().map(|f| f.code),
            _ => None,
        }
    }

    /// Deserialize a text or binary payload.
    pub fn parse_json<T: DeserializeOwned>(&self) -> WsResult<T> {
        match self {
            Self::Text(text) => {
                serde_json::from_str(text).map_err(|e| WsError::decode_failed(e.to_string()))
            }
            Self::Binary(data) => {
                serde_json::from_slice(data).map_err(|e| WsError::decode_failed(e.to_string()))
            }
            _ => Err(WsError::decode_failed("not a data message")),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Self::Binary(b.to_vec())
    }
}

impl From<tungstenite::Message> for Message {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(s) => Self::Text(s.to_string()),
            tungstenite::Message::Binary(b) => Self::Binary(b.to_vec()),
            tungstenite::Message::Ping(b) => Self::Ping(b.to_vec()),
            tungstenite::Message::Pong(b) => Self::Pong(b.to_vec()),
            tungstenite::Message::Close(frame) => Self::Close(frame.map(CloseFrame::from)),
            tungstenite::Message::Frame(_) => Self::Binary(Vec::new()),
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(s) => Self::Text(s.into()),
            Message::Binary(b) => Self::Binary(b.into()),
            Message::Ping(b) => Self::Ping(b.into()),
            Message::Pong(b) => Self::Pong(b.into()),
            Message::Close(frame) => Self::Close(frame.map(tungstenite::protocol::CloseFrame::from)),
        }
    }
}

/// A WebSocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close code.
    pub code: u16,
    /// The close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            reason: reason.into(),
        }
    }
}

impl From<tungstenite::protocol::CloseFrame> for CloseFrame {
    fn from(frame: tungstenite::protocol::CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.to_string(),
        }
    }
}

impl From<CloseFrame> for tungstenite::protocol::CloseFrame {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: frame.code.into(),
            reason: frame.reason.into(),
        }
    }
}
