//! Error types for request bodies, formats and sessions.

use thiserror::Error;

use crate::body::BoxError;

/// Errors raised while reading a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    /// The transport failed while the body was being read.
    #[error("failed to read request body: {0}")]
    ReadFailed(#[source] BoxError),

    /// An earlier read failed and the body source is gone.
    #[error("request body is no longer available")]
    Consumed,
}

/// Errors raised by content negotiation.
#[derive(Debug, Error)]
pub enum FormatError {
    /// No format is registered under this name.
    #[error("Unable to process data in '{0}' format")]
    UnknownFormat(String),

    /// The body could not be decoded.
    #[error("failed to decode {format} body: {reason}")]
    Decode {
        /// Format name.
        format: String,
        /// Decoder message.
        reason: String,
    },

    /// The media value could not be encoded.
    #[error("failed to encode {format} body: {reason}")]
    Encode {
        /// Format name.
        format: String,
        /// Encoder message.
        reason: String,
    },

    /// The format only decodes.
    #[error("format '{0}' cannot encode responses")]
    EncodeUnsupported(String),

    /// The decoded media has the wrong shape for the requested type.
    #[error("decoded body does not fit the requested type: {0}")]
    Shape(String),

    /// Reading the raw body failed.
    #[error(transparent)]
    Body(#[from] BodyError),
}

impl FormatError {
    /// Creates a decode error.
    pub fn decode(format: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an encode error.
    pub fn encode(format: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while turning a [`Response`](crate::Response) into HTTP.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Content negotiation failed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A signed token could not be verified.
///
/// Session loading treats this as "no session"; it never reaches handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,

    /// The payload is not valid after verification.
    #[error("malformed signed payload: {0}")]
    Malformed(String),

    /// The secret key is too short to derive a signing key from.
    #[error("secret key must be at least {min} bytes, got {actual}")]
    WeakKey {
        /// Minimum length.
        min: usize,
        /// Supplied length.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_message() {
        let err = FormatError::UnknownFormat("xml".to_string());
        assert_eq!(err.to_string(), "Unable to process data in 'xml' format");
    }

    #[test]
    fn test_body_error_converts() {
        let err: FormatError = BodyError::Consumed.into();
        assert!(matches!(err, FormatError::Body(BodyError::Consumed)));
    }

    #[test]
    fn test_constructors() {
        let err = FormatError::decode("json", "expected value");
        assert_eq!(err.to_string(), "failed to decode json body: expected value");
        let err = FormatError::encode("yaml", "bad");
        assert!(matches!(err, FormatError::Encode { .. }));
    }
}
