//! Application configuration.
//!
//! Loaded from YAML files and environment variables into a single Config
//! struct.

mod controller;

pub use controller::{ControllerConfig, RetrySettings};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "datachannel.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "DATACHANNEL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "DATACHANNEL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "DATACHANNEL_LOG";
/// Environment variable selecting the log output format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "DATACHANNEL_LOG_FORMAT";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reconciliation settings.
    pub controller: ControllerConfig,
    /// Requeue backoff for failed passes.
    pub retry: RetrySettings,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `datachannel.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.controller.requeue_after_write_ms = 0;
        config.retry.jitter = 0.0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.controller.namespace.is_none());
        assert_eq!(config.controller.default_prepare_ttl_minutes, 30);
        assert_eq!(config.controller.dependency_wait_secs, 5);
        assert_eq!(config.retry.max_retries, 10);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "controller:\n  namespace: data\n  dependency_wait_secs: 9\nretry:\n  max_retries: 3"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.controller.namespace.as_deref(), Some("data"));
        assert_eq!(config.controller.dependency_wait_secs, 9);
        assert_eq!(config.controller.default_prepare_ttl_minutes, 30);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "controller:\n  default_prepare_ttl_minutes: 10").unwrap();

        std::env::set_var("DATACHANNEL__CONTROLLER__DEFAULT_PREPARE_TTL_MINUTES", "45");
        let config = Config::load(file.path().to_str());
        std::env::remove_var("DATACHANNEL__CONTROLLER__DEFAULT_PREPARE_TTL_MINUTES");

        assert_eq!(config.unwrap().controller.default_prepare_ttl_minutes, 45);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Config::load(Some("/nonexistent/datachannel.yaml")).is_err());
    }
}
