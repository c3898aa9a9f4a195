//! Configuration sections.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use kestrel_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "Kestrel-Session";

/// Minimum length of a configured secret key, in bytes.
pub const MIN_SECRET_KEY_LEN: usize = 32;

/// `[app]`: application behaviour.
///
/// ```
/// use kestrel_config::AppConfig;
///
/// let app = AppConfig::default();
/// assert!(!app.debug);
/// assert_eq!(app.session_cookie, "Kestrel-Session");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Include error chains in 500 responses.
    #[serde(default)]
    pub debug: bool,

    /// Name of the signed session cookie.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Key for signing session cookies. A random key is generated when
    /// unset, so sessions do not survive a restart.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            session_cookie: default_session_cookie(),
            secret_key: None,
        }
    }
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// `[server]`: listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period for open connections on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl ServerSection {
    /// `host:port` as a socket address.
    ///
    /// # Errors
    ///
    /// Fails if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5042
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// `[background]`: the background task pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackgroundConfig {
    /// Worker count; available parallelism when unset.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// `[logging]`: log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_level")]
    pub level: String,

    /// `json` or `pretty`.
    #[serde(default)]
    pub format: LogFormat,

    /// Include the module path.
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// Include file and line.
    #[serde(default)]
    pub include_location: bool,
}

impl LoggingConfig {
    /// Settings for [`kestrel_telemetry::init_logging`].
    pub fn to_log_config(&self) -> LogConfig {
        let preset = match self.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            include_target: self.include_target,
            include_location: self.include_location,
            ..preset
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::default(),
            include_target: true,
            include_location: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_socket_addr() {
        let server = ServerSection::default();
        assert_eq!(server.socket_addr().unwrap(), "127.0.0.1:5042".parse().unwrap());
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(30));

        let server = ServerSection {
            host: "localhost".to_string(),
            ..ServerSection::default()
        };
        assert!(server.socket_addr().is_err());
    }

    #[test]
    fn test_logging_to_log_config() {
        let logging = LoggingConfig {
            format: LogFormat::Pretty,
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        let config = logging.to_log_config();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "warn");
        assert!(!config.include_location);
        assert!(config.span_events);
    }

    #[test]
    fn test_sections_reject_unknown_fields() {
        let err = serde_json::from_str::<AppConfig>(r#"{"debugg": true}"#);
        assert!(err.is_err());
    }
}
