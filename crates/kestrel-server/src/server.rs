//! TCP server loop.
//!
//! Binds a listener, serves HTTP/1.1 connections (with upgrades, for
//! WebSockets) through [`KestrelService`], and shuts down gracefully:
//!
//! 1. startup hooks run before the first accept,
//! 2. on shutdown the accept loop stops and open connections are asked to
//!    finish their current request,
//! 3. after they close, or the grace period expires, shutdown hooks run.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kestrel_server::{Router, Server};
//!
//! let router = Router::new();
//! Server::new(Arc::new(router)).run().await?;
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::connection::Application;
use crate::error::ServerError;
use crate::service::KestrelService;
use crate::shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5042;

/// Default grace period for open connections on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Listen on `addr`.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// `127.0.0.1:5042`, or `0.0.0.0:$PORT` when `PORT` holds a valid port.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_port_var(std::env::var("PORT").ok().as_deref())
    }

    fn with_port_var(port: Option<&str>) -> Self {
        match port.and_then(|p| p.trim().parse::<u16>().ok()) {
            Some(port) => Self::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))),
            None => Self::default(),
        }
    }

    /// Set the grace period for open connections on shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Grace period for open connections on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)))
    }
}

/// Serves an [`Application`] over TCP.
pub struct Server {
    app: Arc<dyn Application>,
    config: ServerConfig,
}

impl Server {
    /// Serve `app` with [`ServerConfig::from_env`].
    pub fn new(app: Arc<dyn Application>) -> Self {
        Self {
            app,
            config: ServerConfig::from_env(),
        }
    }

    /// Replace the listener settings.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Listener settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// See [`run_with_shutdown`](Self::run_with_shutdown).
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Bind the configured address and run until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound, a startup hook fails, or a
    /// shutdown hook fails.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// # Errors
    ///
    /// Fails if a startup or shutdown hook fails.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        self.app.startup().await?;

        let local = listener.local_addr()?;
        info!(addr = %local, "listening");

        let service = KestrelService::new(Arc::clone(&self.app));
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let token = tracker.acquire();
                        let service = service.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(serve_connection(stream, peer, service, shutdown, token));
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => break,
            }
        }

        drop(listener);
        let grace = self.config.shutdown_timeout;
        info!(
            connections = tracker.active_connections(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "shutting down"
        );
        if tokio::time::timeout(grace, tracker.wait_for_idle()).await.is_err() {
            warn!(
                connections = tracker.active_connections(),
                "grace period expired with connections still open"
            );
        }

        self.app.shutdown(grace).await?;
        info!("server stopped");
        Ok(())
    }
}

/// Serve one accepted connection until it closes or shutdown finishes it.
fn serve_connection<A: Application + ?Sized>(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    service: KestrelService<A>,
    shutdown: ShutdownSignal,
    token: ConnectionToken,
) -> impl std::future::Future<Output = ()> + Send {
    async move {
        let conn = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .with_upgrades();
        tokio::pin!(conn);
        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };
        if let Err(e) = result {
            debug!(peer = %peer, error = %e, "connection closed with error");
        }
        drop(token);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish_non_exhaustive()
    }
}
