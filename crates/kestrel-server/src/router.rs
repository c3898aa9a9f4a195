//! The router: routes, hooks, mounts and lifecycle in one place.
//!
//! Registration takes `&self`; every list is a copy-on-write snapshot, so
//! routes can be added while requests are being served and an in-flight
//! dispatch keeps the table it started with.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use kestrel_core::{CookieSigner, FormatRegistry, SessionCodec, Signer, DEFAULT_SESSION_COOKIE};
use kestrel_router::{CowList, ParamValue, Protocol, Route, RouteConfigError, RouteResult, RouteTable};
use kestrel_tasks::BackgroundQueue;
use tracing::debug;

use crate::connection::Application;
use crate::endpoint::{Callable, Endpoint, WsHook};
use crate::error::{DispatchError, LifecycleError};
use crate::lifecycle::{Event, Lifecycle, LifecycleHook};
use crate::mount::MountTable;

/// Options for [`Router::add_route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOptions {
    /// Also serve this endpoint when no route matches.
    pub default: bool,
    /// Register under the WebSocket protocol.
    pub websocket: bool,
    /// Register the endpoint as an HTTP before-request hook instead of a route.
    pub before_request: bool,
    /// Reject a second route with the same template and protocol.
    pub check_existing: bool,
    /// Name for `url_for`.
    pub name: Option<String>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            default: false,
            websocket: false,
            before_request: false,
            check_existing: true,
            name: None,
        }
    }
}

impl RouteOptions {
    /// Plain HTTP route, duplicates rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make this the not-found endpoint too.
    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Register a WebSocket route.
    pub fn websocket(mut self) -> Self {
        self.websocket = true;
        self
    }

    /// Register a before-request hook.
    pub fn before_request(mut self) -> Self {
        self.before_request = true;
        self
    }

    /// Allow a route with the same template and protocol as an existing one.
    pub fn allow_existing(mut self) -> Self {
        self.check_existing = false;
        self
    }

    /// Set the reverse-lookup name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Callback told about every dispatch failure after the 500 has been built.
pub type ErrorReporter = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Routes requests and WebSocket connections to endpoints.
pub struct Router {
    pub(crate) routes: RouteTable<Endpoint>,
    pub(crate) mounts: MountTable,
    pub(crate) http_hooks: CowList<Callable>,
    pub(crate) ws_hooks: CowList<WsHook>,
    pub(crate) default_endpoint: ArcSwapOption<Endpoint>,
    pub(crate) reporters: CowList<ErrorReporter>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) formats: Arc<FormatRegistry>,
    pub(crate) sessions: SessionCodec,
    pub(crate) queue: BackgroundQueue,
    pub(crate) debug: bool,
}

impl Router {
    /// Router with default formats, a random session key and a queue sized to
    /// the machine.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a router.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Register `endpoint` at `path`.
    ///
    /// The route is named `options.name`, else the resource name for
    /// resources, else the template itself.
    pub fn add_route(
        &self,
        path: &str,
        endpoint: impl Into<Endpoint>,
        options: RouteOptions,
    ) -> RouteResult<()> {
        let endpoint = endpoint.into();

        if options.before_request {
            return match endpoint {
                _ if options.websocket => Err(RouteConfigError::invalid_options(
                    path,
                    "websocket before-request hooks are registered with before_ws_request",
                )),
                Endpoint::Function(hook) => {
                    self.before_request(hook);
                    Ok(())
                }
                other => Err(RouteConfigError::invalid_options(
                    path,
                    format!("a {} endpoint cannot be a before-request hook", other.kind()),
                )),
            };
        }

        if options.websocket != endpoint.is_websocket() {
            let reason = if options.websocket {
                "websocket routes need a websocket endpoint"
            } else {
                "websocket endpoints need the websocket option"
            };
            return Err(RouteConfigError::invalid_options(path, reason));
        }
        if options.default && options.websocket {
            return Err(RouteConfigError::invalid_options(
                path,
                "only HTTP routes can be the default endpoint",
            ));
        }

        let protocol = if options.websocket {
            Protocol::WebSocket
        } else {
            Protocol::Http
        };
        let name = options
            .name
            .or_else(|| endpoint.default_name().map(str::to_string));
        let mut route = Route::new(path, protocol, endpoint.clone())?;
        if let Some(name) = name {
            route = route.with_name(name);
        }
        self.routes.insert(route, options.check_existing)?;

        if options.default {
            debug!(route = %path, "default endpoint set");
            self.default_endpoint.store(Some(Arc::new(endpoint)));
        }
        Ok(())
    }

    /// Register an HTTP route with default options.
    pub fn route(&self, path: &str, endpoint: impl Into<Endpoint>) -> RouteResult<()> {
        self.add_route(path, endpoint, RouteOptions::default())
    }

    /// Register a WebSocket route.
    pub fn websocket_route(&self, path: &str, endpoint: impl Into<Endpoint>) -> RouteResult<()> {
        self.add_route(path, endpoint, RouteOptions::default().websocket())
    }

    /// Build the URL of the route named `name`.
    ///
    /// Fails with [`RouteConfigError::UnknownEndpoint`] if no route has that
    /// name, or with a parameter error if `params` do not fit the template.
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> RouteResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        self.routes
            .find_by_name(name)
            .ok_or_else(|| RouteConfigError::unknown_endpoint(name))?
            .url(params)
    }

    /// Add an HTTP before-request hook. Hooks run in registration order.
    pub fn before_request(&self, hook: Callable) {
        self.http_hooks.push(hook);
    }

    /// Add a WebSocket before-request hook.
    pub fn before_ws_request(&self, hook: WsHook) {
        self.ws_hooks.push(hook);
    }

    /// Register a lifecycle hook by event name (`"startup"` or `"shutdown"`).
    pub fn add_event_handler(&self, event: &str, hook: LifecycleHook) -> Result<(), LifecycleError> {
        let event = event.parse::<Event>()?;
        self.lifecycle.add(event, hook);
        Ok(())
    }

    /// Register a lifecycle hook.
    pub fn on_event(&self, event: Event, hook: LifecycleHook) {
        self.lifecycle.add(event, hook);
    }

    /// Serve `app` under `prefix`.
    pub fn mount(&self, prefix: &str, app: Arc<dyn Application>) -> RouteResult<()> {
        self.mounts.insert(prefix, app)
    }

    /// Add a callback told about every dispatch failure.
    pub fn on_error<F>(&self, reporter: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.reporters.push(Arc::new(reporter));
    }

    /// Current route table, in match order.
    pub fn routes(&self) -> Arc<Vec<Arc<Route<Endpoint>>>> {
        self.routes.snapshot()
    }

    /// Lifecycle hooks.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Background task queue shared with blocking handlers.
    pub fn queue(&self) -> &BackgroundQueue {
        &self.queue
    }

    /// Registered body formats.
    pub fn formats(&self) -> &Arc<FormatRegistry> {
        &self.formats
    }

    /// Session cookie codec.
    pub fn sessions(&self) -> &SessionCodec {
        &self.sessions
    }

    /// True if error responses carry the error chain.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn report(&self, error: &DispatchError) {
        for reporter in self.reporters.load().iter() {
            reporter(error);
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("mounts", &self.mounts.len())
            .field("http_hooks", &self.http_hooks.len())
            .field("ws_hooks", &self.ws_hooks.len())
            .field("lifecycle", &self.lifecycle)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Router`].
#[derive(Default)]
#[must_use]
pub struct RouterBuilder {
    debug: bool,
    formats: Option<FormatRegistry>,
    signer: Option<Arc<dyn Signer>>,
    session_cookie: Option<String>,
    queue: Option<BackgroundQueue>,
}

impl RouterBuilder {
    /// Put the error chain in 500 bodies.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the default format registry.
    pub fn formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Sign session cookies with `signer`.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Name of the session cookie.
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = Some(name.into());
        self
    }

    /// Use an existing background queue.
    pub fn queue(mut self, queue: BackgroundQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Build the router.
    pub fn build(self) -> Router {
        let signer = self
            .signer
            .unwrap_or_else(|| Arc::new(CookieSigner::generate()));
        let cookie = self
            .session_cookie
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
        Router {
            routes: RouteTable::new(),
            mounts: MountTable::new(),
            http_hooks: CowList::new(),
            ws_hooks: CowList::new(),
            default_endpoint: ArcSwapOption::empty(),
            reporters: CowList::new(),
            lifecycle: Lifecycle::new(),
            formats: Arc::new(self.formats.unwrap_or_else(FormatRegistry::with_defaults)),
            sessions: SessionCodec::new(signer, cookie),
            queue: self.queue.unwrap_or_default(),
            debug: self.debug,
        }
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("debug", &self.debug)
            .field("session_cookie", &self.session_cookie)
            .finish_non_exhaustive()
    }
}
