//! Logging setup for Kestrel applications.
//!
//! Every Kestrel crate emits `tracing` events with structured fields; this
//! crate installs the subscriber that prints them, as JSON in production
//! and pretty-printed during development.

#![doc(html_root_url = "https://docs.rs/kestrel-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
