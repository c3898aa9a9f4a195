//! The root [`KestrelConfig`] and its builder.

use kestrel_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

use crate::schema::MIN_SECRET_KEY_LEN;
use crate::{AppConfig, BackgroundConfig, ConfigError, LoggingConfig, ServerSection};

/// Complete application configuration.
///
/// Load it with [`ConfigLoader`](crate::ConfigLoader) or build it in code:
///
/// ```
/// use kestrel_config::KestrelConfig;
///
/// let config = KestrelConfig::builder().debug(true).workers(4).build();
/// assert!(config.app.debug);
/// assert_eq!(config.background.workers, Some(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct KestrelConfig {
    /// `[app]`
    #[serde(default)]
    pub app: AppConfig,

    /// `[server]`
    #[serde(default)]
    pub server: ServerSection,

    /// `[background]`
    #[serde(default)]
    pub background: BackgroundConfig,

    /// `[logging]`
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KestrelConfig {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> KestrelConfigBuilder {
        KestrelConfigBuilder::default()
    }

    /// Debug mode with pretty debug-level logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.app.debug = true;
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config
    }

    /// JSON logs at `info`, listening on all interfaces.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.server.host = "0.0.0.0".to_string();
        config.logging.format = LogFormat::Json;
        config
    }

    /// Check values that the schema alone cannot.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.app.secret_key {
            if key.len() < MIN_SECRET_KEY_LEN {
                return Err(ConfigError::invalid_value(
                    "app.secret_key",
                    format!("must be at least {MIN_SECRET_KEY_LEN} bytes"),
                ));
            }
        }

        let cookie = &self.app.session_cookie;
        if cookie.is_empty()
            || cookie
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ',' | '='))
        {
            return Err(ConfigError::invalid_value(
                "app.session_cookie",
                format!("not a valid cookie name: {cookie:?}"),
            ));
        }

        if self.server.socket_addr().is_err() {
            return Err(ConfigError::invalid_value(
                "server.host",
                format!("not an IP address: {}", self.server.host),
            ));
        }

        if self.background.workers == Some(0) {
            return Err(ConfigError::invalid_value(
                "background.workers",
                "must be at least 1",
            ));
        }

        if let Err(e) = kestrel_telemetry::create_env_filter(&self.logging.level) {
            return Err(ConfigError::invalid_value("logging.level", e.to_string()));
        }

        Ok(())
    }
}

/// Builder for [`KestrelConfig`].
#[derive(Debug, Default)]
pub struct KestrelConfigBuilder {
    config: KestrelConfig,
}

impl KestrelConfigBuilder {
    /// Set `app.debug`.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.app.debug = debug;
        self
    }

    /// Set `app.session_cookie`.
    #[must_use]
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.config.app.session_cookie = name.into();
        self
    }

    /// Set `app.secret_key`.
    #[must_use]
    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.config.app.secret_key = Some(key.into());
        self
    }

    /// Set `server.host`.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set `server.port`.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set `background.workers`.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.background.workers = Some(workers);
        self
    }

    /// Set `logging.level`.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Set `logging.format`.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    /// Finish without validating.
    #[must_use]
    pub fn build(self) -> KestrelConfig {
        self.config
    }

    /// Finish and validate.
    ///
    /// # Errors
    ///
    /// See [`KestrelConfig::validate`].
    pub fn build_validated(self) -> Result<KestrelConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
