//! Typed configuration for Kestrel applications.
//!
//! [`KestrelConfig`] is strict: unknown sections or keys are errors, not
//! silently ignored. [`ConfigLoader`] layers defaults, files, strings and
//! environment variables.
//!
//! # File format
//!
//! ```toml
//! [app]
//! debug = false
//! session_cookie = "Kestrel-Session"
//! secret_key = "at least thirty-two bytes of secret material"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5042
//! shutdown_timeout_secs = 30
//!
//! [background]
//! workers = 8
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment overrides
//!
//! `KESTREL__APP__DEBUG=true`, `KESTREL__SERVER__PORT=8000`,
//! `KESTREL__LOGGING__FORMAT=pretty`, and so on for every key above.

#![doc(html_root_url = "https://docs.rs/kestrel-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{KestrelConfig, KestrelConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    AppConfig, BackgroundConfig, LoggingConfig, ServerSection, DEFAULT_SESSION_COOKIE,
    MIN_SECRET_KEY_LEN,
};

pub use kestrel_telemetry::LogFormat;
