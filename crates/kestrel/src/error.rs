//! Errors raised while building or serving an [`Api`](crate::Api).

use kestrel_config::ConfigError;
use kestrel_core::SignatureError;
use kestrel_router::RouteConfigError;
use kestrel_server::ServerError;
use thiserror::Error;

/// Building or serving an application failed.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A route, mount or reverse lookup is invalid.
    #[error(transparent)]
    Route(#[from] RouteConfigError),

    /// The secret key cannot sign sessions.
    #[error("invalid secret key: {0}")]
    SecretKey(#[from] SignatureError),

    /// The server failed to start or stopped abnormally.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Result alias for [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;
