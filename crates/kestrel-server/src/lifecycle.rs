//! Startup and shutdown hooks.
//!
//! Both lists run in registration order and each runs at most once per
//! [`Lifecycle`]. The first failing startup hook stops the rest and is
//! returned to the caller; shutdown keeps going and reports every failure.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kestrel_core::{BoxFuture, HandlerResult};
use parking_lot::Mutex;

use crate::error::LifecycleError;

/// Lifecycle event a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Before the first connection is served.
    Startup,
    /// After the last connection is served.
    Shutdown,
}

impl Event {
    /// Event name as accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
        }
    }
}

impl FromStr for Event {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::Startup),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(LifecycleError::UnknownEvent(other.to_string())),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle hook.
///
/// A failing startup hook aborts startup. A failing shutdown hook is logged
/// and collected while the remaining hooks still run.
#[derive(Clone)]
pub enum LifecycleHook {
    /// Awaited on the runtime.
    Async(Arc<dyn Fn() -> BoxFuture<'static, HandlerResult> + Send + Sync>),
    /// Called inline.
    Blocking(Arc<dyn Fn() -> HandlerResult + Send + Sync>),
}

impl LifecycleHook {
    /// Wrap an async hook.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(move || Box::pin(f())))
    }

    /// Wrap a synchronous hook.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() -> HandlerResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }

    async fn run(&self) -> HandlerResult {
        match self {
            Self::Async(f) => f().await,
            Self::Blocking(f) => f(),
        }
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Async(_) => "LifecycleHook::Async",
            Self::Blocking(_) => "LifecycleHook::Blocking",
        })
    }
}

/// Registered startup and shutdown hooks.
///
/// The router owns one of these; [`Router::startup`](crate::Router::startup)
/// and [`Router::shutdown`](crate::Router::shutdown) drive it. Each phase runs
/// once, so a second `run_startup` is a no-op.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use kestrel_server::{Event, Lifecycle, LifecycleHook};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let opened = Arc::new(AtomicUsize::new(0));
/// let lifecycle = Lifecycle::new();
///
/// let counter = Arc::clone(&opened);
/// lifecycle.add(
///     Event::Startup,
///     LifecycleHook::blocking(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }),
/// );
/// lifecycle.add(Event::Shutdown, LifecycleHook::new(|| async { Ok(()) }));
///
/// lifecycle.run_startup().await.unwrap();
/// lifecycle.run_startup().await.unwrap();
/// assert_eq!(opened.load(Ordering::SeqCst), 1);
/// assert_eq!(lifecycle.hook_count(Event::Shutdown), 1);
///
/// lifecycle.run_shutdown().await.unwrap();
/// # }
/// ```
#[derive(Default)]
pub struct Lifecycle {
    startup: Mutex<Vec<(String, LifecycleHook)>>,
    shutdown: Mutex<Vec<(String, LifecycleHook)>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("startup_hooks", &self.startup.lock().len())
            .field("shutdown_hooks", &self.shutdown.lock().len())
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

impl Lifecycle {
    /// Create an empty set of hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `event`.
    ///
    /// Hooks are labelled `startup_0`, `startup_1`, ... for logs.
    pub fn add(&self, event: Event, hook: LifecycleHook) {
        let list = self.list(event);
        let mut hooks = list.lock();
        let name = format!("{}_{}", event, hooks.len());
        tracing::debug!(event = %event, hook = %name, "lifecycle hook registered");
        hooks.push((name, hook));
    }

    /// Register `hook` under an explicit label.
    pub fn add_named(&self, event: Event, name: impl Into<String>, hook: LifecycleHook) {
        self.list(event).lock().push((name.into(), hook));
    }

    /// Number of hooks registered for `event`.
    pub fn hook_count(&self, event: Event) -> usize {
        self.list(event).lock().len()
    }

    /// True once startup hooks have run.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run startup hooks in registration order.
    ///
    /// Later calls return immediately.
    pub async fn run_startup(&self) -> Result<(), LifecycleError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let hooks = self.startup.lock().clone();
        for (name, hook) in hooks {
            tracing::debug!(hook = %name, "running startup hook");
            if let Err(source) = hook.run().await {
                tracing::error!(hook = %name, error = %format!("{source:#}"), "startup hook failed");
                return Err(LifecycleError::StartupFailed { hook: name, source });
            }
        }
        Ok(())
    }

    /// Run shutdown hooks in registration order.
    ///
    /// Every hook runs even if an earlier one fails. Later calls return
    /// immediately.
    pub async fn run_shutdown(&self) -> Result<(), LifecycleError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let hooks = self.shutdown.lock().clone();
        let mut failures = Vec::new();
        for (name, hook) in hooks {
            tracing::debug!(hook = %name, "running shutdown hook");
            if let Err(e) = hook.run().await {
                tracing::error!(hook = %name, error = %format!("{e:#}"), "shutdown hook failed");
                failures.push(format!("{name}: {e:#}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ShutdownFailed { failures })
        }
    }

    fn list(&self, event: Event) -> &Mutex<Vec<(String, LifecycleHook)>> {
        match event {
            Event::Startup => &self.startup,
            Event::Shutdown => &self.shutdown,
        }
    }
}
