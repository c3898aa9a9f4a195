//! WebSocket errors and close codes.

use std::fmt;
use thiserror::Error;

/// Result alias for [`WsError`].
pub type WsResult<T> = Result<T, WsError>;

/// A WebSocket operation failed.
#[derive(Debug, Error)]
pub enum WsError {
    /// The request cannot be upgraded.
    #[error("cannot upgrade to a websocket: {reason}")]
    NotWebSocketRequest {
        /// What is wrong with the request.
        reason: String,
    },

    /// The client side of the handshake failed.
    #[error("websocket handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer closed the connection, or it was already closed locally.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Code from the close frame, if there was one.
        code: Option<u16>,
        /// Why it closed.
        reason: String,
    },

    /// Sending or receiving before `accept`.
    #[error("connection has not been accepted")]
    NotAccepted,

    /// `accept` called twice.
    #[error("connection was already accepted")]
    AlreadyAccepted,

    /// A payload is not what the caller asked for.
    #[error("cannot decode message: {0}")]
    DecodeFailed(String),

    /// A value cannot be turned into a message.
    #[error("cannot encode message: {0}")]
    EncodeFailed(String),

    /// Wire-level failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] tungstenite::Error),
}

impl WsError {
    /// See [`WsError::NotWebSocketRequest`].
    pub fn not_websocket(reason: impl Into<String>) -> Self {
        Self::NotWebSocketRequest {
            reason: reason.into(),
        }
    }

    /// See [`WsError::ConnectionClosed`].
    pub fn connection_closed(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            code,
            reason: reason.into(),
        }
    }

    /// See [`WsError::DecodeFailed`].
    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::DecodeFailed(reason.into())
    }

    /// The peer's close code, for [`WsError::ConnectionClosed`].
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ConnectionClosed { code, .. } => *code,
            _ => None,
        }
    }

    /// True when the connection is unusable afterwards.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed(_) | Self::ConnectionClosed { .. } | Self::Protocol(_)
        )
    }
}

/// Close codes a handler can send (RFC 6455, section 7.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// 1000
    Normal = 1000,
    /// 1001, the endpoint is going away.
    GoingAway = 1001,
    /// 1002
    Protocol = 1002,
    /// 1003, a data type the endpoint cannot take.
    Unsupported = 1003,
    /// 1007, e.g. non UTF-8 text.
    InvalidPayload = 1007,
    /// 1008, used by hooks that reject a connection.
    PolicyViolation = 1008,
    /// 1009
    MessageTooBig = 1009,
    /// 1011, the server hit an unexpected condition.
    InternalError = 1011,
}

impl CloseCode {
    const ALL: [Self; 8] = [
        Self::Normal,
        Self::GoingAway,
        Self::Protocol,
        Self::Unsupported,
        Self::InvalidPayload,
        Self::PolicyViolation,
        Self::MessageTooBig,
        Self::InternalError,
    ];

    /// The code, if it is one of the variants.
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_u16() == code)
    }

    /// Numeric value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_u16(code).ok_or(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
