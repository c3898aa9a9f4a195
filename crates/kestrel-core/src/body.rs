//! Request and response body plumbing.
//!
//! The transport hands the core a [`BodyReader`]: a one-shot source of the
//! full request body. Responses are produced as [`ResponseBody`], a boxed
//! `http_body::Body` that is either a full buffer or a stream.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

use crate::error::BodyError;

/// Boxed error type used at the transport boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Body type of finalized responses.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// A source that yields the complete request body once.
pub trait BodySource: Send + 'static {
    /// Reads the whole body.
    fn read_all(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, BoxError>>;
}

impl<B> BodySource for B
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    fn read_all(self: Box<Self>) -> BoxFuture<'static, Result<Bytes, BoxError>> {
        Box::pin(async move {
            let collected = (*self).collect().await.map_err(Into::into)?;
            Ok(collected.to_bytes())
        })
    }
}

/// The one-shot request body handed over by the transport.
pub struct BodyReader {
    source: Box<dyn BodySource>,
}

impl BodyReader {
    /// Wraps any body source.
    pub fn new(source: impl BodySource) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// A body with no content.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// A body backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(Full::new(bytes.into()))
    }

    /// Reads the complete body.
    pub async fn read(self) -> Result<Bytes, BodyError> {
        self.source.read_all().await.map_err(BodyError::ReadFailed)
    }
}

impl Default for BodyReader {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader").finish_non_exhaustive()
    }
}

/// A response body holding the given bytes.
pub fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty response body.
#[must_use]
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A response body fed by a stream of chunks.
pub fn stream<S, E>(chunks: S) -> ResponseBody
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    StreamBody::new(chunks.map_ok(Frame::data).map_err(|e| -> BoxError { e.into() })).boxed_unsync()
}
