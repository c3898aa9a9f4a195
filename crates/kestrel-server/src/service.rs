//! Hyper service adapter.
//!
//! Turns hyper requests into connection events for an [`Application`]. A
//! WebSocket upgrade request is answered with `101 Switching Protocols`; the
//! upgraded stream is then served on its own task.

use std::convert::Infallible;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper_util::rt::TokioIo;
use kestrel_core::{body, BodyReader, BoxFuture, ResponseBody};
use kestrel_ws::{upgrade, StreamTransport, WebSocket};
use tracing::{debug, warn};

use crate::connection::Application;

/// A [`Service`] that forwards every request to an [`Application`].
pub struct KestrelService<A: ?Sized> {
    app: Arc<A>,
}

impl<A: Application + ?Sized> KestrelService<A> {
    /// Serve `app`.
    pub fn new(app: Arc<A>) -> Self {
        Self { app }
    }

    /// The application behind this service.
    pub fn app(&self) -> &Arc<A> {
        &self.app
    }
}

impl<A: ?Sized> Clone for KestrelService<A> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
        }
    }
}

impl<A: ?Sized> std::fmt::Debug for KestrelService<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KestrelService").finish_non_exhaustive()
    }
}

impl<A: Application + ?Sized> Service<http::Request<Incoming>> for KestrelService<A> {
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, request: http::Request<Incoming>) -> Self::Future {
        let app = Arc::clone(&self.app);
        Box::pin(async move { Ok(serve(app, request).await) })
    }
}

async fn serve<A: Application + ?Sized>(
    app: Arc<A>,
    mut request: http::Request<Incoming>,
) -> http::Response<ResponseBody> {
    if !upgrade::is_websocket_request(&request) {
        return app.serve_http(request.map(BodyReader::new)).await;
    }

    let handshake = match upgrade::switching_protocols(&request) {
        Ok(handshake) => handshake,
        Err(e) => return bad_request(&e.to_string()),
    };

    let on_upgrade = hyper::upgrade::on(&mut request);
    let (parts, _) = request.into_parts();
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                debug!(path = %parts.uri.path(), "websocket upgraded");
                let transport = StreamTransport::from_upgraded(TokioIo::new(upgraded)).await;
                let socket = WebSocket::new(&parts.uri, parts.headers, transport);
                app.serve_websocket(socket).await;
            }
            Err(e) => warn!(path = %parts.uri.path(), error = %e, "websocket upgrade failed"),
        }
    });

    handshake.map(|()| body::empty())
}

fn bad_request(reason: &str) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(body::full(reason.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
