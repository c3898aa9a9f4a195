//! Error types for dispatch, lifecycle and the server loop.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use kestrel_core::FinalizeError;
use thiserror::Error;

/// Dispatch state in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Matching the path against mounts and routes.
    Resolving,
    /// Running before-request hooks.
    BeforeHooks,
    /// Running the endpoint.
    Handling,
    /// Encoding the response.
    Finalizing,
}

impl Stage {
    /// Lowercase name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::BeforeHooks => "before_hooks",
            Self::Handling => "handling",
            Self::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request failed after it was routed.
///
/// The client only ever sees a generic 500; this value keeps the original
/// error for logs, error reporters and test assertions.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler or hook returned an error.
    #[error("{stage} failed: {source:#}")]
    Handler {
        /// Where it happened.
        stage: Stage,
        /// The error the handler returned.
        #[source]
        source: anyhow::Error,
    },

    /// A handler or hook panicked.
    #[error("{stage} panicked: {message}")]
    Panicked {
        /// Where it happened.
        stage: Stage,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The response could not be encoded.
    #[error("finalizing failed: {0}")]
    Finalize(#[from] FinalizeError),

    /// The request URI could not be rewritten for a mount.
    #[error("resolving failed: {0}")]
    InvalidUri(String),
}

impl DispatchError {
    /// Wrap a handler error.
    pub fn handler(stage: Stage, source: anyhow::Error) -> Self {
        Self::Handler { stage, source }
    }

    /// Record a caught panic.
    pub fn panicked(stage: Stage, message: impl Into<String>) -> Self {
        Self::Panicked {
            stage,
            message: message.into(),
        }
    }

    /// Dispatch state the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Handler { stage, .. } | Self::Panicked { stage, .. } => *stage,
            Self::Finalize(_) => Stage::Finalizing,
            Self::InvalidUri(_) => Stage::Resolving,
        }
    }

    /// True if the failure was a panic rather than a returned error.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Downcast the handler's original error.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Handler { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Startup or shutdown hooks failed.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A startup hook failed; later hooks did not run.
    #[error("startup hook {hook} failed: {source:#}")]
    StartupFailed {
        /// Hook label.
        hook: String,
        /// The hook's error.
        #[source]
        source: anyhow::Error,
    },

    /// One or more shutdown hooks failed; all of them ran.
    #[error("shutdown hooks failed: {}", .failures.join("; "))]
    ShutdownFailed {
        /// `label: error` for every failed hook, in run order.
        failures: Vec<String>,
    },

    /// The event name is neither `startup` nor `shutdown`.
    #[error("unknown lifecycle event {0:?}, expected \"startup\" or \"shutdown\"")]
    UnknownEvent(String),
}

/// The server loop could not start or stopped abnormally.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Startup hooks failed; no connection was accepted.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Socket error outside a single connection.
    #[error(transparent)]
    Io(#[from] io::Error),
}
