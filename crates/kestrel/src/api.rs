//! The application object.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kestrel_config::KestrelConfig;
use kestrel_core::{BodyReader, CookieSigner, FormatRegistry, ResponseBody, Signer};
use kestrel_router::{ParamValue, RouteResult};
use kestrel_server::{
    Application, Callable, DispatchError, Endpoint, Event, LifecycleError, LifecycleHook,
    RouteOptions, Router, Server, ServerConfig, ShutdownSignal, WsHook,
};
use kestrel_tasks::{BackgroundQueue, QueueConfig};
use kestrel_telemetry::TelemetryError;
use kestrel_ws::WebSocket;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};

/// A Kestrel application.
///
/// Owns the router and the configuration it was built from. Registration
/// methods take `&self`, so routes and hooks can be added while serving.
///
/// ```rust
/// use kestrel::{Api, Endpoint};
///
/// let api = Api::new();
/// api.route("/{greeting}", Endpoint::blocking(|req, resp| {
///     resp.text(format!("{}, world!", req.params().get_str("greeting").unwrap_or("hello")));
///     Ok(())
/// }))
/// .unwrap();
///
/// assert_eq!(api.url_for("/{greeting}", [("greeting", "hi")]).unwrap(), "/hi");
/// ```
pub struct Api {
    router: Arc<Router>,
    config: KestrelConfig,
}

impl Api {
    /// An application with default settings and no logging setup.
    pub fn new() -> Self {
        Self {
            router: Arc::new(Router::new()),
            config: KestrelConfig::default(),
        }
    }

    /// Start configuring an application.
    pub fn builder() -> ApiBuilder {
        ApiBuilder::default()
    }

    /// Build from a loaded configuration. Logging is initialised when
    /// `logging.enabled` is set.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn from_config(config: KestrelConfig) -> ApiResult<Self> {
        Self::builder().config(config).with_logging().build()
    }

    /// The router behind this application.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The configuration this application was built from.
    pub fn config(&self) -> &KestrelConfig {
        &self.config
    }

    /// Register `endpoint` at `path` with explicit options.
    pub fn add_route(
        &self,
        path: &str,
        endpoint: impl Into<Endpoint>,
        options: RouteOptions,
    ) -> RouteResult<()> {
        self.router.add_route(path, endpoint, options)
    }

    /// Register an HTTP route.
    pub fn route(&self, path: &str, endpoint: impl Into<Endpoint>) -> RouteResult<()> {
        self.router.route(path, endpoint)
    }

    /// Register a WebSocket route.
    pub fn websocket_route(&self, path: &str, endpoint: impl Into<Endpoint>) -> RouteResult<()> {
        self.router.websocket_route(path, endpoint)
    }

    /// URL of the route named `name`, filled from `params`.
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> RouteResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<ParamValue>,
    {
        self.router.url_for(name, params)
    }

    /// Run `hook` before every matched HTTP handler.
    pub fn before_request(&self, hook: Callable) {
        self.router.before_request(hook);
    }

    /// Run `hook` before every matched WebSocket handler.
    pub fn before_ws_request(&self, hook: WsHook) {
        self.router.before_ws_request(hook);
    }

    /// Register a `"startup"` or `"shutdown"` hook.
    pub fn add_event_handler(&self, event: &str, hook: LifecycleHook) -> Result<(), LifecycleError> {
        self.router.add_event_handler(event, hook)
    }

    /// Register a lifecycle hook by [`Event`].
    pub fn on_event(&self, event: Event, hook: LifecycleHook) {
        self.router.on_event(event, hook);
    }

    /// Serve `app` under `prefix`.
    pub fn mount(&self, prefix: &str, app: Arc<dyn Application>) -> RouteResult<()> {
        self.router.mount(prefix, app)
    }

    /// Be told about every request or connection that ends in an error.
    pub fn on_error<F>(&self, reporter: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.router.on_error(reporter);
    }

    /// The background task queue.
    pub fn background(&self) -> &BackgroundQueue {
        self.router.queue()
    }

    /// Registered body formats.
    pub fn formats(&self) -> &Arc<FormatRegistry> {
        self.router.formats()
    }

    /// Listener settings: `[server]` from the configuration, with the port
    /// and an all-interfaces bind taken from `PORT` when it is set.
    ///
    /// # Errors
    ///
    /// Fails if `server.host` is not an IP address.
    pub fn server_config(&self) -> ApiResult<ServerConfig> {
        let from_env = std::env::var("PORT")
            .ok()
            .filter(|port| port.trim().parse::<u16>().is_ok());
        let config = if from_env.is_some() {
            ServerConfig::from_env()
        } else {
            let addr = self.config.server.socket_addr().map_err(|e| {
                kestrel_config::ConfigError::invalid_value("server.host", e.to_string())
            })?;
            ServerConfig::new(addr)
        };
        Ok(config.with_shutdown_timeout(self.config.server.shutdown_timeout()))
    }

    fn server(&self) -> ApiResult<Server> {
        let app: Arc<dyn Application> = self.router.clone();
        Ok(Server::new(app).with_config(self.server_config()?))
    }

    /// Serve until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot bind or startup hooks fail.
    pub async fn run(&self) -> ApiResult<()> {
        let server = self.server()?;
        info!(addr = %server.config().addr(), "starting kestrel");
        server.run().await?;
        Ok(())
    }

    /// Serve until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Fails if the listener cannot bind or startup hooks fail.
    pub async fn serve(&self, shutdown: ShutdownSignal) -> ApiResult<()> {
        self.server()?.run_with_shutdown(shutdown).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Fails if startup hooks fail.
    pub async fn serve_listener(&self, listener: TcpListener, shutdown: ShutdownSignal) -> ApiResult<()> {
        self.server()?.serve(listener, shutdown).await?;
        Ok(())
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}

impl From<&Api> for Arc<Router> {
    fn from(api: &Api) -> Self {
        Arc::clone(&api.router)
    }
}

#[async_trait]
impl Application for Api {
    async fn serve_http(&self, request: http::Request<BodyReader>) -> http::Response<ResponseBody> {
        self.router.serve_http(request).await
    }

    async fn serve_websocket(&self, socket: WebSocket) {
        self.router.serve_websocket(socket).await;
    }

    async fn startup(&self) -> Result<(), LifecycleError> {
        self.router.startup().await
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), LifecycleError> {
        self.router.shutdown(grace).await
    }
}

/// Builder for [`Api`].
#[derive(Default)]
#[must_use]
pub struct ApiBuilder {
    config: KestrelConfig,
    formats: Option<FormatRegistry>,
    signer: Option<Arc<dyn Signer>>,
    logging: bool,
}

impl ApiBuilder {
    /// Start from `config` instead of the defaults.
    pub fn config(mut self, config: KestrelConfig) -> Self {
        self.config = config;
        self
    }

    /// Put the error chain in 500 bodies.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.app.debug = debug;
        self
    }

    /// Derive the session signing key from `key`.
    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.config.app.secret_key = Some(key.into());
        self
    }

    /// Name of the session cookie.
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.config.app.session_cookie = name.into();
        self
    }

    /// Size of the background pool.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.background.workers = Some(workers);
        self
    }

    /// Replace the default body formats.
    pub fn formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Sign sessions with `signer`, ignoring any secret key.
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Install the global log subscriber from `[logging]` on build.
    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Validate the configuration and build the application.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] for an invalid configuration, or
    /// [`ApiError::SecretKey`] for a key that cannot sign.
    pub fn build(self) -> ApiResult<Api> {
        let config = self.config;
        config.validate()?;

        if self.logging && config.logging.enabled {
            match kestrel_telemetry::init_logging(&config.logging.to_log_config()) {
                Ok(()) | Err(TelemetryError::AlreadyInitialized) => {}
                Err(e) => return Err(kestrel_config::ConfigError::invalid_value("logging", e.to_string()).into()),
            }
        }

        let signer: Arc<dyn Signer> = match (self.signer, &config.app.secret_key) {
            (Some(signer), _) => signer,
            (None, Some(key)) => Arc::new(CookieSigner::from_secret(key.as_bytes())?),
            (None, None) => {
                debug!("no secret key configured, sessions use a random key");
                Arc::new(CookieSigner::generate())
            }
        };

        let queue = match config.background.workers {
            Some(workers) => BackgroundQueue::with_config(QueueConfig::new().with_workers(workers)),
            None => BackgroundQueue::new(),
        };

        let mut router = Router::builder()
            .debug(config.app.debug)
            .signer(signer)
            .session_cookie(config.app.session_cookie.clone())
            .queue(queue);
        if let Some(formats) = self.formats {
            router = router.formats(formats);
        }

        Ok(Api {
            router: Arc::new(router.build()),
            config,
        })
    }
}

impl std::fmt::Debug for ApiBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiBuilder")
            .field("config", &self.config)
            .field("logging", &self.logging)
            .finish_non_exhaustive()
    }
}
