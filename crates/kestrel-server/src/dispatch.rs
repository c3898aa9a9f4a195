//! The per-request state machine.
//!
//! ```text
//! RESOLVING --mount--> forwarded to the sub-application
//!     |
//!     +--no route--> NOT_FOUND (default endpoint or 404) --> FINALIZING
//!     |
//!     +--route--> BEFORE_HOOKS --> HANDLING --> FINALIZING --> sent
//!                      |              |             |
//!                      +-----------> ERROR (500) <--+
//! ```
//!
//! Every error or panic raised by a hook, a handler or the finalizer ends in
//! ERROR: the client gets a generic 500, the failure is logged with its
//! chain and handed to the router's error reporters.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use kestrel_core::{body, BodyReader, Cookies, HandlerResult, Request, Response, ResponseBody};
use kestrel_router::{Params, Protocol};
use kestrel_tasks::TaskError;
use kestrel_ws::{CloseCode, WebSocket};
use tracing::{debug, error, warn};

use crate::connection::Application;
use crate::endpoint::{Endpoint, WsCallable};
use crate::error::{DispatchError, LifecycleError, Stage};
use crate::mount;
use crate::router::Router;

/// Body of the 404 response.
pub const NOT_FOUND_BODY: &str = "Not found.";
/// Body of the 405 response.
pub const METHOD_NOT_ALLOWED_BODY: &str = "Method not allowed.";
/// Body of the 500 response.
pub const APPLICATION_ERROR_BODY: &str = "Application error.";

/// Result of dispatching one HTTP request.
#[derive(Debug)]
pub struct Dispatch {
    /// What goes back to the client.
    pub response: http::Response<ResponseBody>,
    /// The failure behind a 500, kept for reporting.
    pub error: Option<DispatchError>,
}

impl Router {
    /// Run one HTTP request through the state machine.
    pub async fn dispatch(&self, request: http::Request<BodyReader>) -> Dispatch {
        let in_flight = InFlight::new(request.method(), request.uri().path());
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let dispatch = match self.run_http(request).await {
            Ok(response) => Dispatch {
                response,
                error: None,
            },
            Err(err) => {
                error!(
                    method = %method,
                    path = %path,
                    stage = %err.stage(),
                    error = %err,
                    "request failed"
                );
                let response = self.error_response(&err);
                self.report(&err);
                Dispatch {
                    response,
                    error: Some(err),
                }
            }
        };
        in_flight.finish();
        dispatch
    }

    async fn run_http(
        &self,
        request: http::Request<BodyReader>,
    ) -> Result<http::Response<ResponseBody>, DispatchError> {
        let (mut parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();

        if let Some((mount, rest)) = self.mounts.resolve(&path) {
            debug!(path = %path, prefix = %mount.prefix(), "delegating to mount");
            mount::forward(&mut parts, mount.prefix(), &rest).map_err(DispatchError::InvalidUri)?;
            let forwarded = http::Request::from_parts(parts, body);
            return Ok(mount.app().serve_http(forwarded).await);
        }

        let resolved = self.routes.resolve(Protocol::Http, &path);
        let params = resolved
            .as_ref()
            .map(|(_, params)| params.clone())
            .unwrap_or_else(Params::new);
        let session = self.sessions.load(&Cookies::from_headers(&parts.headers));
        let request = Request::builder(parts, body)
            .params(params)
            .session(session)
            .formats(Arc::clone(&self.formats))
            .build();
        let mut response = Response::for_request(&request);

        match resolved {
            Some((route, _)) => {
                debug!(path = %path, route = %route.template(), "route matched");
                for hook in self.http_hooks.load().iter() {
                    response = guarded(
                        Stage::BeforeHooks,
                        hook.invoke(&self.queue, request.clone(), response),
                    )
                    .await?;
                }
                response = self.run_endpoint(route.endpoint(), &request, response).await?;
            }
            None => match self.default_endpoint.load_full() {
                Some(endpoint) => {
                    debug!(path = %path, "no route matched, serving default endpoint");
                    response = self.run_endpoint(&endpoint, &request, response).await?;
                }
                None => {
                    debug!(path = %path, "no route matched");
                    not_found(&mut response);
                }
            },
        }

        self.finalize(response, &request)
    }

    async fn run_endpoint(
        &self,
        endpoint: &Endpoint,
        request: &Request,
        mut response: Response,
    ) -> Result<Response, DispatchError> {
        match endpoint {
            Endpoint::Function(callable) => {
                guarded(
                    Stage::Handling,
                    callable.invoke(&self.queue, request.clone(), response),
                )
                .await
            }
            Endpoint::Resource(resource) => {
                if !resource.handles(request.method()) {
                    warn!(
                        method = %request.method(),
                        path = %request.path(),
                        resource = %resource.name(),
                        "method not allowed"
                    );
                    method_not_allowed(&mut response, &resource.allowed_methods());
                    return Ok(response);
                }
                guarded(
                    Stage::Handling,
                    resource.dispatch(&self.queue, request.clone(), response),
                )
                .await
            }
            // WebSocket endpoints are never stored under the HTTP protocol.
            Endpoint::Connection(_) => {
                not_found(&mut response);
                Ok(response)
            }
        }
    }

    fn finalize(
        &self,
        mut response: Response,
        request: &Request,
    ) -> Result<http::Response<ResponseBody>, DispatchError> {
        if let Some(cookie) = self.sessions.store(response.session()) {
            response.set_cookie(cookie);
        }
        Ok(response.into_http(request)?)
    }

    fn error_response(&self, err: &DispatchError) -> http::Response<ResponseBody> {
        let text = if self.debug {
            format!("{APPLICATION_ERROR_BODY}\n\n{err}")
        } else {
            APPLICATION_ERROR_BODY.to_string()
        };
        let mut response = http::Response::new(body::full(text));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Run one WebSocket connection through mounts, hooks and its handler.
    ///
    /// A path with no WebSocket route is closed with code 1000. Returns the
    /// failure, if any, after logging and reporting it.
    pub async fn dispatch_websocket(&self, mut socket: WebSocket) -> Option<DispatchError> {
        let path = socket.path().to_string();

        if let Some((mount, rest)) = self.mounts.resolve(&path) {
            debug!(path = %path, prefix = %mount.prefix(), "delegating websocket to mount");
            socket.set_path(rest);
            mount.app().serve_websocket(socket).await;
            return None;
        }

        let handler = match self.routes.resolve(Protocol::WebSocket, &path) {
            Some((route, params)) => match route.endpoint() {
                Endpoint::Connection(handler) => {
                    debug!(path = %path, route = %route.template(), "websocket route matched");
                    socket.set_params(params);
                    Some(handler.clone())
                }
                _ => None,
            },
            None => None,
        };
        let Some(handler) = handler else {
            debug!(path = %path, "no websocket route matched");
            if let Err(e) = socket.close(CloseCode::Normal).await {
                debug!(path = %path, error = %e, "closing unmatched websocket failed");
            }
            return None;
        };

        match self.run_websocket(&handler, socket).await {
            Ok(()) => None,
            Err(err) => {
                error!(path = %path, stage = %err.stage(), error = %err, "websocket handler failed");
                self.report(&err);
                Some(err)
            }
        }
    }

    async fn run_websocket(&self, handler: &WsCallable, mut socket: WebSocket) -> Result<(), DispatchError> {
        for hook in self.ws_hooks.load().iter() {
            socket = guarded(Stage::BeforeHooks, hook.invoke(socket)).await?;
        }
        guarded(Stage::Handling, handler.invoke(socket)).await
    }

    /// Run startup hooks.
    pub async fn startup(&self) -> Result<(), LifecycleError> {
        self.lifecycle.run_startup().await
    }

    /// Run shutdown hooks, then wait up to `grace` for background tasks.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        let hooks = self.lifecycle.run_shutdown().await;
        self.queue.drain(grace).await;
        hooks
    }
}

#[async_trait]
impl Application for Router {
    async fn serve_http(&self, request: http::Request<BodyReader>) -> http::Response<ResponseBody> {
        self.dispatch(request).await.response
    }

    async fn serve_websocket(&self, socket: WebSocket) {
        self.dispatch_websocket(socket).await;
    }

    async fn startup(&self) -> Result<(), LifecycleError> {
        Router::startup(self).await
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        Router::shutdown(self, grace).await
    }
}

/// Await a hook or handler, turning errors and panics into [`DispatchError`].
async fn guarded<T, F>(stage: Stage, future: F) -> Result<T, DispatchError>
where
    F: Future<Output = HandlerResult<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        // Blocking handlers panic on the pool and come back as task errors.
        Ok(Err(source)) => match source.downcast_ref::<TaskError>() {
            Some(TaskError::Panicked(message)) => Err(DispatchError::panicked(stage, message.clone())),
            _ => Err(DispatchError::handler(stage, source)),
        },
        Err(payload) => Err(DispatchError::panicked(stage, panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn not_found(response: &mut Response) {
    response.set_status(StatusCode::NOT_FOUND);
    response.text(NOT_FOUND_BODY);
}

fn method_not_allowed(response: &mut Response, allowed: &[Method]) {
    response.set_status(StatusCode::METHOD_NOT_ALLOWED);
    response.text(METHOD_NOT_ALLOWED_BODY);
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
}

/// Warns when a dispatch is dropped before it produced a response.
struct InFlight {
    method: Method,
    path: String,
    done: bool,
}

impl InFlight {
    fn new(method: &Method, path: &str) -> Self {
        Self {
            method: method.clone(),
            path: path.to_string(),
            done: false,
        }
    }

    fn finish(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            warn!(method = %self.method, path = %self.path, "dispatch cancelled before a response was produced");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Callable, Resource, WsHook};
    use crate::router::RouteOptions;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn get(path: &str) -> http::Request<BodyReader> {
        http::Request::get(path).body(BodyReader::empty()).unwrap()
    }

    async fn body_text(response: http::Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn text(body: &'static str) -> Endpoint {
        Endpoint::handler(move |_, mut resp| async move {
            resp.text(body);
            Ok(resp)
        })
    }

    #[tokio::test]
    async fn test_static_route_beats_parameterized() {
        let router = Router::new();
        router.route("/{greeting}", text("param")).unwrap();
        router.route("/hello", text("static")).unwrap();

        let out = router.dispatch(get("/hello")).await;
        assert_eq!(body_text(out.response).await, "static");
        let out = router.dispatch(get("/howdy")).await;
        assert_eq!(body_text(out.response).await, "param");
    }

    #[tokio::test]
    async fn test_not_found() {
        let router = Router::new();
        let out = router.dispatch(get("/nowhere")).await;
        assert_eq!(out.response.status(), StatusCode::NOT_FOUND);
        assert!(out.error.is_none());
        assert_eq!(body_text(out.response).await, NOT_FOUND_BODY);
    }

    #[tokio::test]
    async fn test_default_endpoint_skips_hooks() {
        let router = Router::new();
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hook_runs);
        router.before_request(Callable::blocking(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        router
            .add_route("/home", text("fallback"), RouteOptions::new().as_default())
            .unwrap();

        let out = router.dispatch(get("/missing")).await;
        assert_eq!(out.response.status(), StatusCode::OK);
        assert_eq!(body_text(out.response).await, "fallback");
        assert_eq!(hook_runs.load(Ordering::SeqCst), 0);

        router.dispatch(get("/home")).await;
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_before_handler() {
        let router = Router::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 1..=2 {
            let seen = Arc::clone(&seen);
            router.before_request(Callable::new(move |_req, resp| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().push(format!("hook{n}"));
                    Ok(resp)
                }
            }));
        }
        let log = Arc::clone(&seen);
        router
            .route(
                "/",
                Endpoint::handler(move |_, resp| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push("handler".to_string());
                        Ok(resp)
                    }
                }),
            )
            .unwrap();

        router.dispatch(get("/")).await;
        assert_eq!(*seen.lock(), vec!["hook1", "hook2", "handler"]);
    }

    #[tokio::test]
    async fn test_hook_error_skips_handler() {
        let router = Router::new();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        router.before_request(Callable::blocking(|_, _| anyhow::bail!("denied")));
        router
            .route(
                "/",
                Endpoint::blocking(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let out = router.dispatch(get("/")).await;
        assert_eq!(out.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(out.error.as_ref().unwrap().stage(), Stage::BeforeHooks);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_500_and_reported() {
        let router = Router::new();
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        router.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        router
            .route("/fail", Endpoint::handler(|_, _| async { anyhow::bail!("database is down") }))
            .unwrap();

        let out = router.dispatch(get("/fail")).await;
        assert_eq!(out.response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = out.error.unwrap();
        assert_eq!(err.stage(), Stage::Handling);
        assert!(err.to_string().contains("database is down"));
        assert_eq!(body_text(out.response).await, APPLICATION_ERROR_BODY);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_debug_mode_shows_error_chain() {
        let router = Router::builder().debug(true).build();
        router
            .route("/fail", Endpoint::blocking(|_, _| anyhow::bail!("disk full")))
            .unwrap();
        let out = router.dispatch(get("/fail")).await;
        let body = body_text(out.response).await;
        assert!(body.starts_with(APPLICATION_ERROR_BODY));
        assert!(body.contains("disk full"));
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let router = Router::new();
        router
            .route(
                "/async",
                Endpoint::handler(|req: Request, resp| async move {
                    if req.path() == "/async" {
                        panic!("async boom");
                    }
                    Ok(resp)
                }),
            )
            .unwrap();
        router
            .route("/sync", Endpoint::blocking(|_, _| panic!("sync boom")))
            .unwrap();

        let out = router.dispatch(get("/async")).await;
        let err = out.error.unwrap();
        assert!(err.is_panic());
        assert!(err.to_string().contains("async boom"));

        let out = router.dispatch(get("/sync")).await;
        let err = out.error.unwrap();
        assert!(err.is_panic());
        assert!(err.to_string().contains("sync boom"));
    }

    #[derive(Default)]
    struct Greeter;

    #[tokio::test]
    async fn test_resource_method_not_allowed() {
        let router = Router::new();
        router
            .route(
                "/greet",
                Resource::<Greeter>::from_default()
                    .on_get(|_, _, mut resp| async move {
                        resp.text("hi");
                        Ok(resp)
                    })
                    .on_post(|_, _, resp| async move { Ok(resp) }),
            )
            .unwrap();

        let request = http::Request::delete("/greet").body(BodyReader::empty()).unwrap();
        let out = router.dispatch(request).await;
        assert_eq!(out.response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(out.response.headers()[ALLOW], "GET, POST");
        assert_eq!(body_text(out.response).await, METHOD_NOT_ALLOWED_BODY);
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let router = Router::new();
        router
            .route(
                "/set",
                Endpoint::blocking(|_, resp| {
                    resp.session_mut().insert("user", "ada");
                    Ok(())
                }),
            )
            .unwrap();
        router
            .route(
                "/get",
                Endpoint::blocking(|req, resp| {
                    let user = req.session().get_as::<String>("user").unwrap_or_default();
                    resp.text(user);
                    Ok(())
                }),
            )
            .unwrap();

        let out = router.dispatch(get("/set")).await;
        let set_cookie = out.response.headers()[http::header::SET_COOKIE].to_str().unwrap().to_string();
        let pair = set_cookie.split(';').next().unwrap().to_string();
        assert!(pair.starts_with("Kestrel-Session="));

        let request = http::Request::get("/get")
            .header(http::header::COOKIE, pair)
            .body(BodyReader::empty())
            .unwrap();
        let out = router.dispatch(request).await;
        assert_eq!(body_text(out.response).await, "ada");
    }

    #[tokio::test]
    async fn test_mount_forwards_remainder() {
        let inner = Router::new();
        inner
            .route(
                "/page",
                Endpoint::blocking(|req, resp| {
                    resp.text(format!("{}|{}", req.root_path(), req.path()));
                    Ok(())
                }),
            )
            .unwrap();
        let outer = Router::new();
        outer.route("/{anything}", text("outer")).unwrap();
        outer.mount("/sub", Arc::new(inner)).unwrap();

        let out = outer.dispatch(get("/sub/page")).await;
        assert_eq!(body_text(out.response).await, "/sub|/page");
        let out = outer.dispatch(get("/subway")).await;
        assert_eq!(body_text(out.response).await, "outer");
    }

    #[tokio::test]
    async fn test_websocket_route_with_hook() {
        let router = Router::new();
        router.before_ws_request(WsHook::new(|mut ws: WebSocket| async move {
            ws.accept().await?;
            Ok(ws)
        }));
        router
            .websocket_route(
                "/ws/{room}",
                Endpoint::websocket(|mut ws: WebSocket| async move {
                    let room = ws.params().get_str("room").unwrap_or_default().to_string();
                    ws.send_text(room).await?;
                    ws.close(CloseCode::Normal).await?;
                    Ok(())
                }),
            )
            .unwrap();

        let (transport, mut client) = kestrel_ws::memory::channel();
        let uri: http::Uri = "/ws/lobby".parse().unwrap();
        let socket = WebSocket::new(&uri, http::HeaderMap::new(), transport);
        assert!(router.dispatch_websocket(socket).await.is_none());

        client.handshake().await.unwrap();
        assert_eq!(client.receive_text().await.unwrap(), "lobby");
    }

    #[tokio::test]
    async fn test_unmatched_websocket_closed_normally() {
        let router = Router::new();
        let (transport, mut client) = kestrel_ws::memory::channel();
        let uri: http::Uri = "/nope".parse().unwrap();
        let socket = WebSocket::new(&uri, http::HeaderMap::new(), transport);
        router.dispatch_websocket(socket).await;

        assert!(client.handshake().await.is_err());
        assert_eq!(client.close_code(), Some(1000));
    }

    #[tokio::test]
    async fn test_dropped_dispatch_does_not_panic() {
        let router = Router::new();
        router
            .route(
                "/slow",
                Endpoint::handler(|_, resp| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(resp)
                }),
            )
            .unwrap();
        let result = tokio::time::timeout(Duration::from_millis(20), router.dispatch(get("/slow"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_through_router() {
        let router = Router::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for event in ["startup", "shutdown"] {
            let runs = Arc::clone(&runs);
            router
                .add_event_handler(
                    event,
                    crate::lifecycle::LifecycleHook::blocking(move || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                )
                .unwrap();
        }
        router.startup().await.unwrap();
        router.shutdown(Duration::from_millis(50)).await.unwrap();
        router.shutdown(Duration::from_millis(50)).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
