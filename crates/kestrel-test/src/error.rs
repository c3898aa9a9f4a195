//! Test error types.

use std::fmt;

/// Errors raised by the test client.
#[derive(Debug)]
pub enum TestError {
    /// The request could not be built.
    RequestBuild(String),
    /// The response body could not be read or decoded as text.
    BodyRead(String),
    /// JSON encoding or decoding failed.
    Json(serde_json::Error),
    /// YAML encoding or decoding failed.
    Yaml(serde_yaml::Error),
    /// The server closed a WebSocket before accepting it.
    WebSocketRejected(Option<u16>),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestBuild(msg) => write!(f, "request build error: {msg}"),
            Self::BodyRead(msg) => write!(f, "body read error: {msg}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Yaml(e) => write!(f, "YAML error: {e}"),
            Self::WebSocketRejected(Some(code)) => {
                write!(f, "websocket closed before accept with code {code}")
            }
            Self::WebSocketRejected(None) => write!(f, "websocket closed before accept"),
        }
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Yaml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TestError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<serde_yaml::Error> for TestError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml(e)
    }
}

impl From<http::Error> for TestError {
    fn from(e: http::Error) -> Self {
        Self::RequestBuild(e.to_string())
    }
}
