//! Connection events and the [`Application`] trait.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_core::{BodyReader, ResponseBody};
use kestrel_ws::WebSocket;

use crate::error::LifecycleError;

/// One incoming connection event, as delivered by the transport adapter.
pub enum Connection {
    /// A plain HTTP request.
    Http(http::Request<BodyReader>),
    /// A WebSocket connection whose upgrade has completed.
    WebSocket(WebSocket),
}

impl Connection {
    /// Request path of the connection.
    pub fn path(&self) -> &str {
        match self {
            Self::Http(request) => request.uri().path(),
            Self::WebSocket(socket) => socket.path(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(request) => f
                .debug_tuple("Http")
                .field(request.method())
                .field(&request.uri().path())
                .finish(),
            Self::WebSocket(socket) => f.debug_tuple("WebSocket").field(&socket.path()).finish(),
        }
    }
}

/// Anything that can serve connection events.
///
/// The router implements this, so does the `Api` facade; mounted
/// sub-applications are stored as `Arc<dyn Application>`.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Serve an HTTP request.
    async fn serve_http(&self, request: http::Request<BodyReader>) -> http::Response<ResponseBody>;

    /// Serve a WebSocket connection until it ends.
    async fn serve_websocket(&self, socket: WebSocket);

    /// Run startup hooks before the first connection is served.
    async fn startup(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    /// Run shutdown hooks after the last connection, allowing `grace` for
    /// outstanding background work.
    async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        let _ = grace;
        Ok(())
    }

    /// Serve any connection event.
    ///
    /// Returns the HTTP response for HTTP events and `None` for WebSockets.
    async fn handle(&self, connection: Connection) -> Option<http::Response<ResponseBody>> {
        match connection {
            Connection::Http(request) => Some(self.serve_http(request).await),
            Connection::WebSocket(socket) => {
                self.serve_websocket(socket).await;
                None
            }
        }
    }
}
