//! Layered configuration loading.
//!
//! Layers apply in order, later ones overriding earlier ones key by key:
//!
//! 1. built-in defaults (or a preset)
//! 2. files and strings, TOML or JSON
//! 3. environment variables `PREFIX__SECTION__KEY`, optionally seeded from
//!    a `.env` file

use std::env;
use std::fs;
use std::path::Path;

use kestrel_telemetry::LogFormat;
use serde_json::{Map, Value};

use crate::{ConfigError, KestrelConfig};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "KESTREL";

/// Builds a [`KestrelConfig`] from several sources.
///
/// ```no_run
/// use kestrel_config::ConfigLoader;
///
/// # fn main() -> Result<(), kestrel_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("kestrel.toml")?
///     .with_dotenv()?
///     .with_env_prefix("KESTREL")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    layers: Value,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Start from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::from_base(&KestrelConfig::default())
    }

    /// Start from [`KestrelConfig::development`].
    #[must_use]
    pub fn with_development(self) -> Self {
        Self {
            env_prefix: self.env_prefix,
            ..Self::from_base(&KestrelConfig::development())
        }
    }

    /// Start from [`KestrelConfig::production`].
    #[must_use]
    pub fn with_production(self) -> Self {
        Self {
            env_prefix: self.env_prefix,
            ..Self::from_base(&KestrelConfig::production())
        }
    }

    fn from_base(base: &KestrelConfig) -> Self {
        Self {
            layers: serde_json::to_value(base).unwrap_or_else(|_| Value::Object(Map::new())),
            env_prefix: None,
        }
    }

    /// Merge a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, or has unknown
    /// keys.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.with_string(&content, &format)
    }

    /// Merge a file if it exists.
    ///
    /// # Errors
    ///
    /// As [`with_file`](Self::with_file), except for a missing file.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merge configuration text in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Fails on malformed text, unknown keys or an unknown format.
    ///
    /// ```
    /// use kestrel_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[app]\ndebug = true", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert!(config.app.debug);
    /// assert_eq!(config.app.session_cookie, "Kestrel-Session");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => serde_json::to_value(toml::from_str::<toml::Table>(content)?)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        // Reject unknown keys at the layer that introduced them.
        serde_json::from_value::<KestrelConfig>(layer.clone())?;
        merge(&mut self.layers, layer);
        Ok(self)
    }

    /// Read `.env` from the current directory into the process
    /// environment, if present.
    ///
    /// # Errors
    ///
    /// Fails if `.env` exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Read a specific dotenv file into the process environment.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or cannot be parsed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        Ok(self)
    }

    /// Apply `PREFIX__SECTION__KEY` environment overrides on load.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Fails on a malformed override or an invalid final value.
    pub fn load(self) -> Result<KestrelConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Fails on a malformed override.
    pub fn load_unvalidated(self) -> Result<KestrelConfig, ConfigError> {
        let mut config: KestrelConfig = serde_json::from_value(self.layers)?;
        if let Some(prefix) = &self.env_prefix {
            let marker = format!("{prefix}__");
            let mut vars: Vec<(String, String)> =
                env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
            vars.sort();
            for (key, value) in vars {
                apply_env_var(&mut config, &key, &value, &marker)?;
            }
        }
        Ok(config)
    }
}

fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn apply_env_var(
    config: &mut KestrelConfig,
    key: &str,
    value: &str,
    marker: &str,
) -> Result<(), ConfigError> {
    let path = key
        .strip_prefix(marker)
        .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;
    let parts: Vec<&str> = path.split("__").collect();

    match parts.as_slice() {
        ["APP", "DEBUG"] => config.app.debug = parse_bool(key, value)?,
        ["APP", "SESSION_COOKIE"] => config.app.session_cookie = value.to_string(),
        ["APP", "SECRET_KEY"] => {
            config.app.secret_key = (!value.is_empty()).then(|| value.to_string());
        }

        ["SERVER", "HOST"] => config.server.host = value.to_string(),
        ["SERVER", "PORT"] => config.server.port = parse_number(key, value)?,
        ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
            config.server.shutdown_timeout_secs = parse_number(key, value)?;
        }

        ["BACKGROUND", "WORKERS"] => {
            config.background.workers = if value.is_empty() || value.eq_ignore_ascii_case("auto") {
                None
            } else {
                Some(parse_number(key, value)?)
            };
        }

        ["LOGGING", "ENABLED"] => config.logging.enabled = parse_bool(key, value)?,
        ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
        ["LOGGING", "FORMAT"] => {
            config.logging.format = match value.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
            };
        }
        ["LOGGING", "INCLUDE_TARGET"] => config.logging.include_target = parse_bool(key, value)?,
        ["LOGGING", "INCLUDE_LOCATION"] => {
            config.logging.include_location = parse_bool(key, value)?;
        }

        _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, KestrelConfig::default());
    }

    #[test]
    fn test_layers_merge_key_by_key() {
        let config = ConfigLoader::new()
            .with_string("[app]\ndebug = true\n[server]\nport = 8000", "toml")
            .unwrap()
            .with_string(r#"{"server": {"host": "0.0.0.0"}}"#, "json")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.app.debug);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ConfigLoader::new()
            .with_string("[app]\ndebugg = true", "toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::JsonError(_)));

        let err = ConfigLoader::new()
            .with_string("[metrics]\nenabled = true", "toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            ConfigLoader::new().with_string("app: {}", "yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[background]\nworkers = 3\n[logging]\nformat = \"pretty\"").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.background.workers, Some(3));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_missing_files() {
        assert!(matches!(
            ConfigLoader::new().with_file("/definitely/not/here.toml"),
            Err(ConfigError::FileNotFound { .. })
        ));
        assert!(ConfigLoader::new()
            .with_optional_file("/definitely/not/here.toml")
            .is_ok());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("KESTREL_ENV_TEST__APP__DEBUG", "yes");
        env::set_var("KESTREL_ENV_TEST__SERVER__PORT", "9001");
        env::set_var("KESTREL_ENV_TEST__BACKGROUND__WORKERS", "6");
        env::set_var("KESTREL_ENV_TEST__LOGGING__FORMAT", "pretty");

        let config = ConfigLoader::new()
            .with_string("[server]\nport = 8000", "toml")
            .unwrap()
            .with_env_prefix("kestrel_env_test")
            .load()
            .unwrap();
        assert!(config.app.debug);
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.background.workers, Some(6));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_bad_env_override() {
        env::set_var("KESTREL_BAD_ENV__APP__DEBUG", "maybe");
        let err = ConfigLoader::new()
            .with_env_prefix("KESTREL_BAD_ENV")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
    }

    #[test]
    fn test_dotenv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "KESTREL_DOTENV_TEST__SERVER__HOST=0.0.0.0").unwrap();

        let config = ConfigLoader::new()
            .with_dotenv_file(file.path())
            .unwrap()
            .with_env_prefix("KESTREL_DOTENV_TEST")
            .load()
            .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_validation_runs_on_load() {
        let err = ConfigLoader::new()
            .with_string(r#"{"app": {"secret_key": "short"}}"#, "json")
            .unwrap()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_preset_then_file() {
        let config = ConfigLoader::new()
            .with_development()
            .with_string("[logging]\nlevel = \"warn\"", "toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.app.debug);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }
}
