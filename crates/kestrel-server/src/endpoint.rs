//! What a route points at.
//!
//! An [`Endpoint`] is one of three things:
//!
//! - a function handler ([`Callable`]), async or blocking,
//! - a class-style [`Resource`] with per-method handlers,
//! - a WebSocket connection handler ([`WsCallable`]).
//!
//! Blocking handlers run on the background queue's blocking pool so they never
//! stall the async runtime. Async handlers are awaited in place.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use http::Method;
use indexmap::IndexMap;
use kestrel_core::{BoxFuture, HandlerResult, Request, Response};
use kestrel_router::Params;
use kestrel_tasks::BackgroundQueue;
use kestrel_ws::WebSocket;

/// Future returned by HTTP handlers.
pub type HttpFuture = BoxFuture<'static, HandlerResult<Response>>;

type AsyncFn = Arc<dyn Fn(Request, Response) -> HttpFuture + Send + Sync>;
type BlockingFn = Arc<dyn Fn(&Request, &mut Response) -> HandlerResult + Send + Sync>;

/// A function handler or HTTP before-request hook.
#[derive(Clone)]
pub enum Callable {
    /// Awaited on the runtime.
    Async(AsyncFn),
    /// Run on the blocking pool.
    Blocking(BlockingFn),
}

impl Callable {
    /// Wrap an async function.
    ///
    /// The function receives the request and the response by value and hands
    /// the response back.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        Self::Async(Arc::new(move |req, resp| Box::pin(f(req, resp))))
    }

    /// Wrap a synchronous function.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    /// True for handlers that run on the blocking pool.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }

    /// Run the handler and return the (possibly modified) response.
    pub async fn invoke(
        &self,
        queue: &BackgroundQueue,
        request: Request,
        response: Response,
    ) -> HandlerResult<Response> {
        match self {
            Self::Async(f) => f(request, response).await,
            Self::Blocking(f) => {
                let f = Arc::clone(f);
                let (response, outcome) = queue
                    .call(move || {
                        let mut response = response;
                        let outcome = f(&request, &mut response);
                        (response, outcome)
                    })
                    .await?;
                outcome.map(|()| response)
            }
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_blocking() {
            "Callable::Blocking"
        } else {
            "Callable::Async"
        })
    }
}

type WsFn = Arc<dyn Fn(WebSocket) -> BoxFuture<'static, HandlerResult> + Send + Sync>;
type WsHookFn = Arc<dyn Fn(WebSocket) -> BoxFuture<'static, HandlerResult<WebSocket>> + Send + Sync>;

/// A WebSocket connection handler.
///
/// The handler owns the socket; it must accept it before sending.
#[derive(Clone)]
pub struct WsCallable(WsFn);

impl WsCallable {
    /// Wrap an async connection handler.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move |ws| Box::pin(f(ws))))
    }

    /// Run the handler to completion.
    pub async fn invoke(&self, socket: WebSocket) -> HandlerResult {
        (self.0)(socket).await
    }
}

impl fmt::Debug for WsCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WsCallable")
    }
}

/// A WebSocket before-request hook.
///
/// Hooks get the socket before the handler does and pass it on.
#[derive(Clone)]
pub struct WsHook(WsHookFn);

impl WsHook {
    /// Wrap an async hook.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<WebSocket>> + Send + 'static,
    {
        Self(Arc::new(move |ws| Box::pin(f(ws))))
    }

    /// Run the hook.
    pub async fn invoke(&self, socket: WebSocket) -> HandlerResult<WebSocket> {
        (self.0)(socket).await
    }
}

impl fmt::Debug for WsHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WsHook")
    }
}

type Factory<T> = Arc<dyn Fn(&Params) -> HandlerResult<Arc<T>> + Send + Sync>;

enum ViewMethod<T> {
    Async(Arc<dyn Fn(Arc<T>, Request, Response) -> HttpFuture + Send + Sync>),
    Blocking(Arc<dyn Fn(&T, &Request, &mut Response) -> HandlerResult + Send + Sync>),
}

impl<T> Clone for ViewMethod<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Async(f) => Self::Async(Arc::clone(f)),
            Self::Blocking(f) => Self::Blocking(Arc::clone(f)),
        }
    }
}

impl<T: Send + Sync + 'static> ViewMethod<T> {
    async fn invoke(
        &self,
        queue: &BackgroundQueue,
        view: Arc<T>,
        request: Request,
        response: Response,
    ) -> HandlerResult<Response> {
        match self {
            Self::Async(f) => f(view, request, response).await,
            Self::Blocking(f) => {
                let f = Arc::clone(f);
                let (response, outcome) = queue
                    .call(move || {
                        let mut response = response;
                        let outcome = f(&view, &request, &mut response);
                        (response, outcome)
                    })
                    .await?;
                outcome.map(|()| response)
            }
        }
    }
}

/// Methods reported in `Allow` for a resource with a catch-all handler.
pub const STANDARD_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// A class-style endpoint.
///
/// A fresh view is built by the factory for every request, from the matched
/// path parameters. The catch-all `on_request` handler runs first, then the
/// handler for the request method. A resource with neither for the method is
/// answered with 405.
///
/// ```rust
/// use kestrel_server::Resource;
///
/// #[derive(Default)]
/// struct Greeting;
///
/// let resource = Resource::<Greeting>::from_default()
///     .on_get(|_view, _req, mut resp| async move {
///         resp.text("hello");
///         Ok(resp)
///     });
/// assert_eq!(resource.name(), "Greeting");
/// ```
pub struct Resource<T> {
    name: String,
    factory: Factory<T>,
    on_request: Option<ViewMethod<T>>,
    methods: IndexMap<Method, ViewMethod<T>>,
}

impl<T: Send + Sync + 'static> Resource<T> {
    /// Build views with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Params) -> HandlerResult<T> + Send + Sync + 'static,
    {
        Self::with_factory(Arc::new(move |params| factory(params).map(Arc::new)))
    }

    /// Build views with `T::default()`.
    pub fn from_default() -> Self
    where
        T: Default,
    {
        Self::new(|_| Ok(T::default()))
    }

    /// Share one instance across all requests.
    pub fn from_instance(instance: Arc<T>) -> Self {
        Self::with_factory(Arc::new(move |_| Ok(Arc::clone(&instance))))
    }

    fn with_factory(factory: Factory<T>) -> Self {
        Self {
            name: short_type_name::<T>().to_string(),
            factory,
            on_request: None,
            methods: IndexMap::new(),
        }
    }

    /// Override the name used by `url_for`.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Resource name, the view type's name unless overridden.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the catch-all handler.
    pub fn on_request<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on_request = Some(ViewMethod::Async(Arc::new(move |view, req, resp| {
            Box::pin(f(view, req, resp))
        })));
        self
    }

    /// Set a synchronous catch-all handler.
    pub fn on_request_blocking<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_request = Some(ViewMethod::Blocking(Arc::new(f)));
        self
    }

    /// Set the handler for `method`.
    pub fn on<F, Fut>(mut self, method: Method, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.methods.insert(
            method,
            ViewMethod::Async(Arc::new(move |view, req, resp| Box::pin(f(view, req, resp)))),
        );
        self
    }

    /// Set a synchronous handler for `method`.
    pub fn on_blocking<F>(mut self, method: Method, f: F) -> Self
    where
        F: Fn(&T, &Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
    {
        self.methods.insert(method, ViewMethod::Blocking(Arc::new(f)));
        self
    }

    /// Shorthand for `on(Method::GET, f)`.
    pub fn on_get<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on(Method::GET, f)
    }

    /// Shorthand for `on(Method::POST, f)`.
    pub fn on_post<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on(Method::POST, f)
    }

    /// Shorthand for `on(Method::PUT, f)`.
    pub fn on_put<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on(Method::PUT, f)
    }

    /// Shorthand for `on(Method::PATCH, f)`.
    pub fn on_patch<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on(Method::PATCH, f)
    }

    /// Shorthand for `on(Method::DELETE, f)`.
    pub fn on_delete<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Arc<T>, Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        self.on(Method::DELETE, f)
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("on_request", &self.on_request.is_some())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a [`Resource`], as stored in the route table.
pub trait ResourceDispatch: Send + Sync {
    /// Name used by `url_for`.
    fn name(&self) -> &str;

    /// True if some handler will run for `method`.
    fn handles(&self, method: &Method) -> bool;

    /// Methods listed in a 405 `Allow` header.
    fn allowed_methods(&self) -> Vec<Method>;

    /// Build the view and run the catch-all and method handlers.
    fn dispatch<'a>(
        &'a self,
        queue: &'a BackgroundQueue,
        request: Request,
        response: Response,
    ) -> BoxFuture<'a, HandlerResult<Response>>;
}

impl<T: Send + Sync + 'static> ResourceDispatch for Resource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, method: &Method) -> bool {
        self.on_request.is_some() || self.methods.contains_key(method)
    }

    fn allowed_methods(&self) -> Vec<Method> {
        if self.on_request.is_some() {
            STANDARD_METHODS.to_vec()
        } else {
            self.methods.keys().cloned().collect()
        }
    }

    fn dispatch<'a>(
        &'a self,
        queue: &'a BackgroundQueue,
        request: Request,
        response: Response,
    ) -> BoxFuture<'a, HandlerResult<Response>> {
        Box::pin(async move {
            let view = (self.factory)(request.params())?;
            let mut response = response;
            if let Some(handler) = &self.on_request {
                response = handler
                    .invoke(queue, Arc::clone(&view), request.clone(), response)
                    .await?;
            }
            if let Some(handler) = self.methods.get(request.method()) {
                response = handler.invoke(queue, view, request, response).await?;
            }
            Ok(response)
        })
    }
}

/// Anything a route can be bound to.
#[derive(Clone)]
pub enum Endpoint {
    /// A function handler.
    Function(Callable),
    /// A class-style resource.
    Resource(Arc<dyn ResourceDispatch>),
    /// A WebSocket connection handler.
    Connection(WsCallable),
}

impl Endpoint {
    /// An async function endpoint.
    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Response>> + Send + 'static,
    {
        Self::Function(Callable::new(f))
    }

    /// A synchronous function endpoint.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Function(Callable::blocking(f))
    }

    /// A WebSocket endpoint.
    pub fn websocket<F, Fut>(f: F) -> Self
    where
        F: Fn(WebSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Connection(WsCallable::new(f))
    }

    /// True for WebSocket endpoints.
    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Name the route takes when none is given explicitly.
    pub fn default_name(&self) -> Option<&str> {
        match self {
            Self::Resource(resource) => Some(resource.name()),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Resource(_) => "resource",
            Self::Connection(_) => "websocket",
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(c) => f.debug_tuple("Function").field(c).finish(),
            Self::Resource(r) => f.debug_tuple("Resource").field(&r.name()).finish(),
            Self::Connection(c) => f.debug_tuple("Connection").field(c).finish(),
        }
    }
}

impl From<Callable> for Endpoint {
    fn from(callable: Callable) -> Self {
        Self::Function(callable)
    }
}

impl From<WsCallable> for Endpoint {
    fn from(callable: WsCallable) -> Self {
        Self::Connection(callable)
    }
}

impl<T: Send + Sync + 'static> From<Resource<T>> for Endpoint {
    fn from(resource: Resource<T>) -> Self {
        Self::Resource(Arc::new(resource))
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(method: Method, path: &str) -> Request {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .unwrap()
            .into_parts();
        Request::new(parts, kestrel_core::BodyReader::empty())
    }

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    #[tokio::test]
    async fn test_async_callable() {
        let queue = BackgroundQueue::new();
        let callable = Callable::new(|_req, mut resp| async move {
            resp.text("async");
            Ok(resp)
        });
        let req = request(Method::GET, "/");
        let resp = callable.invoke(&queue, req.clone(), Response::new()).await.unwrap();
        assert_eq!(resp.content().unwrap().as_ref(), b"async");
        assert!(!callable.is_blocking());
    }

    #[tokio::test]
    async fn test_blocking_callable_runs_off_runtime() {
        let queue = BackgroundQueue::new();
        let callable = Callable::blocking(|req, resp| {
            resp.text(format!("path={}", req.path()));
            Ok(())
        });
        let resp = callable
            .invoke(&queue, request(Method::GET, "/x"), Response::new())
            .await
            .unwrap();
        assert_eq!(resp.content().unwrap().as_ref(), b"path=/x");
    }

    #[tokio::test]
    async fn test_blocking_callable_error_propagates() {
        let queue = BackgroundQueue::new();
        let callable = Callable::blocking(|_, _| anyhow::bail!("nope"));
        let err = callable
            .invoke(&queue, request(Method::GET, "/"), Response::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_resource_runs_on_request_then_method() {
        let queue = BackgroundQueue::new();
        let resource = Resource::<Counter>::from_default()
            .on_request(|_view, _req, mut resp| async move {
                resp.set_header("x-order", "on_request").unwrap();
                resp.text("generic");
                Ok(resp)
            })
            .on_get(|_view, _req, mut resp| async move {
                let seen = resp.headers().get("x-order").is_some();
                resp.text(format!("get after on_request: {seen}"));
                Ok(resp)
            });

        let resp = resource
            .dispatch(&queue, request(Method::GET, "/"), Response::new())
            .await
            .unwrap();
        assert_eq!(resp.content().unwrap().as_ref(), b"get after on_request: true");

        let resp = resource
            .dispatch(&queue, request(Method::POST, "/"), Response::new())
            .await
            .unwrap();
        assert_eq!(resp.content().unwrap().as_ref(), b"generic");
    }

    #[tokio::test]
    async fn test_resource_allowed_methods() {
        let only_get = Resource::<Counter>::from_default()
            .on_get(|_, _, resp| async move { Ok(resp) })
            .on_post(|_, _, resp| async move { Ok(resp) });
        assert!(only_get.handles(&Method::GET));
        assert!(!only_get.handles(&Method::DELETE));
        assert_eq!(only_get.allowed_methods(), vec![Method::GET, Method::POST]);

        let catch_all = Resource::<Counter>::from_default()
            .on_request(|_, _, resp| async move { Ok(resp) });
        assert!(catch_all.handles(&Method::DELETE));
        assert_eq!(catch_all.allowed_methods().len(), STANDARD_METHODS.len());
    }

    #[tokio::test]
    async fn test_resource_shared_instance() {
        let queue = BackgroundQueue::new();
        let shared = Arc::new(Counter::default());
        let resource = Resource::from_instance(Arc::clone(&shared)).on_blocking(
            Method::GET,
            |view: &Counter, _req, _resp| {
                view.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        for _ in 0..3 {
            resource
                .dispatch(&queue, request(Method::GET, "/"), Response::new())
                .await
                .unwrap();
        }
        assert_eq!(shared.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resource_factory_sees_params() {
        struct Item {
            id: i64,
        }

        let queue = BackgroundQueue::new();
        let resource = Resource::new(|params: &Params| {
            Ok(Item {
                id: params.get_int("id").unwrap_or(-1),
            })
        })
        .on_get(|view: Arc<Item>, _req, mut resp| async move {
            resp.text(view.id.to_string());
            Ok(resp)
        });

        let (parts, ()) = http::Request::get("/items/7").body(()).unwrap().into_parts();
        let req = Request::builder(parts, kestrel_core::BodyReader::empty())
            .params([("id", 7_i64)].into_iter().collect())
            .build();
        let resp = resource.dispatch(&queue, req, Response::new()).await.unwrap();
        assert_eq!(resp.content().unwrap().as_ref(), b"7");
    }

    #[test]
    fn test_resource_default_name() {
        struct Things<T>(T);
        assert_eq!(Resource::<Counter>::from_default().name(), "Counter");
        assert_eq!(
            Resource::<Things<u8>>::new(|_| Ok(Things(0))).name(),
            "Things"
        );
        assert_eq!(
            Resource::<Counter>::from_default().named("counter").name(),
            "counter"
        );
    }

    #[test]
    fn test_endpoint_kinds() {
        let f = Endpoint::handler(|_, resp| async move { Ok(resp) });
        let r: Endpoint = Resource::<Counter>::from_default().into();
        let ws = Endpoint::websocket(|_ws| async move { Ok(()) });

        assert_eq!(f.kind(), "function");
        assert_eq!(r.kind(), "resource");
        assert!(ws.is_websocket());
        assert_eq!(r.default_name(), Some("Counter"));
        assert_eq!(f.default_name(), None);
        assert!(format!("{r:?}").contains("Counter"));
    }
}
