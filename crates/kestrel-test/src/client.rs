//! Test client for in-memory HTTP and WebSocket testing.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use indexmap::IndexMap;
use kestrel_server::{LifecycleError, Router};
use kestrel_ws::WebSocket;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::TestError;
use crate::request::{Multipart, TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use crate::websocket::TestWebSocket;

/// Drives a [`Router`] directly, without binding a port.
///
/// Cookies set by responses are kept and sent with later requests, so
/// sessions work across calls.
///
/// # Example
///
/// ```ignore
/// let client = TestClient::new(Arc::new(router));
///
/// let response = client.get("/hello").send().await;
/// response.assert_status(StatusCode::OK).assert_body_eq("hello, world!");
/// ```
#[must_use]
pub struct TestClient {
    router: Arc<Router>,
    default_headers: HeaderMap,
    jar: CookieJar,
}

impl TestClient {
    /// A client for `router`, or for anything that hands out its router.
    pub fn new(router: impl Into<Arc<Router>>) -> Self {
        Self {
            router: router.into(),
            default_headers: HeaderMap::new(),
            jar: CookieJar::default(),
        }
    }

    /// Send `name: value` with every request. Invalid pairs are ignored.
    pub fn with_default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// The router under test.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// A GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// A POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// A PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// A PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// A DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// An OPTIONS request.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::OPTIONS, uri)
    }

    /// A HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::HEAD, uri)
    }

    /// A request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest {
            client: self,
            builder: TestRequestBuilder::new(method, uri),
        }
    }

    /// Dispatch a built request.
    ///
    /// # Errors
    ///
    /// Fails if the request is invalid or the body cannot be read.
    pub async fn execute(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let mut request = request.into_http_request()?;
        for (name, value) in &self.default_headers {
            if !request.headers().contains_key(name) {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }
        if !request.headers().contains_key(COOKIE) {
            if let Some(cookie) = self.jar.header() {
                request.headers_mut().insert(COOKIE, cookie);
            }
        }

        let dispatch = self.router.dispatch(request).await;
        self.jar.store(dispatch.response.headers());
        TestResponse::from_http(dispatch.response, dispatch.error).await
    }

    /// Open a WebSocket to `path` and wait for the server to accept it.
    ///
    /// # Errors
    ///
    /// [`TestError::WebSocketRejected`] if the server closes before
    /// accepting, with the close code it sent.
    pub async fn websocket(&self, path: impl AsRef<str>) -> Result<TestWebSocket, TestError> {
        let uri: http::Uri = path
            .as_ref()
            .parse()
            .map_err(|e| TestError::RequestBuild(format!("invalid URI: {e}")))?;
        let mut headers = self.default_headers.clone();
        if let Some(cookie) = self.jar.header() {
            headers.insert(COOKIE, cookie);
        }

        let (transport, client) = kestrel_ws::memory::channel();
        let socket = WebSocket::new(&uri, headers, transport);
        let router = Arc::clone(&self.router);
        let server = tokio::spawn(async move { router.dispatch_websocket(socket).await });

        let mut ws = TestWebSocket::new(client, server);
        if ws.handshake().await.is_err() {
            return Err(TestError::WebSocketRejected(ws.close_code()));
        }
        Ok(ws)
    }

    /// Current value of a stored cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.jar.get(name)
    }

    /// Store a cookie as if a response had set it.
    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        self.jar.insert(name.into(), value.into());
    }

    /// Forget all cookies.
    pub fn clear_cookies(&self) {
        self.jar.clear();
    }

    /// Run the router's startup hooks.
    ///
    /// # Errors
    ///
    /// The first failing hook.
    pub async fn startup(&self) -> Result<(), LifecycleError> {
        self.router.startup().await
    }

    /// Run the router's shutdown hooks and drain background tasks.
    ///
    /// # Errors
    ///
    /// The first failing hook.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        self.router.shutdown(grace).await
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("default_headers", &self.default_headers)
            .field("cookies", &self.jar.cookies.lock().len())
            .finish_non_exhaustive()
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Set a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Set the Content-Type header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Set the Accept header.
    pub fn accept(mut self, accept: impl AsRef<str>) -> Self {
        self.builder = self.builder.accept(accept);
        self
    }

    /// Set the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Send a plain-text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.builder = self.builder.text(text);
        self
    }

    /// Send a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Send a YAML body.
    pub fn yaml<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.yaml(value);
        self
    }

    /// Send an urlencoded form.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Send a multipart form.
    pub fn multipart(mut self, form: Multipart) -> Self {
        self.builder = self.builder.multipart(form);
        self
    }

    /// Send and read the whole response.
    ///
    /// # Panics
    ///
    /// Panics if the request is invalid or the body cannot be read. Use
    /// [`try_send`](Self::try_send) to handle those cases.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("test request failed: {e}"),
        }
    }

    /// Send and read the whole response.
    ///
    /// # Errors
    ///
    /// Fails if the request is invalid or the body cannot be read.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.execute(request).await
    }
}

/// Cookies remembered between requests, in the order they were first set.
#[derive(Debug, Default)]
struct CookieJar {
    cookies: Mutex<IndexMap<String, String>>,
}

impl CookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).cloned()
    }

    fn insert(&self, name: String, value: String) {
        self.cookies.lock().insert(name, value);
    }

    fn clear(&self) {
        self.cookies.lock().clear();
    }

    fn header(&self) -> Option<HeaderValue> {
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return None;
        }
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::try_from(joined).ok()
    }

    fn store(&self, headers: &HeaderMap) {
        let mut cookies = self.cookies.lock();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let mut attributes = value.split(';');
            let Some((name, cookie)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
                continue;
            };
            let expired = attributes.any(|attr| {
                attr.trim()
                    .split_once('=')
                    .is_some_and(|(k, v)| k.eq_ignore_ascii_case("max-age") && v.trim() == "0")
            });
            let name = name.trim().to_string();
            if expired || cookie.is_empty() {
                cookies.shift_remove(&name);
            } else {
                cookies.insert(name, cookie.trim().to_string());
            }
        }
    }
}
