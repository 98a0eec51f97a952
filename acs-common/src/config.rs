//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is a small TOML file. Every field has a built-in
//! default, and a missing file is not an error: the service starts with
//! compiled defaults and logs a warning.
//!
//! # Config File Resolution Priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ACS_CONFIG`)
//! 3. Platform config directory (`<config_dir>/acs/config.toml`)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ACS_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Upper bound on how long `stop_playing` waits for an agent's pending
    /// notifications before proceeding
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Per-subscriber buffer of the event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_delivery_timeout_ms() -> u64 {
    5000 // five one-second polls
}

fn default_event_capacity() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration following the resolution priority
    ///
    /// A resolved file that is missing or unreadable falls back to defaults
    /// with a warning. A file that exists but does not parse is an error.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let Some(path) = resolve_config_path(cli_arg, CONFIG_ENV_VAR) else {
            info!("No configuration file found, using compiled defaults");
            return Ok(Self::default());
        };

        match Self::from_file(&path) {
            Ok(config) => Ok(config),
            Err(Error::Io(e)) => {
                warn!(
                    "Could not read config file {}: {}; using compiled defaults",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Runtime settings consumed by the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub delivery_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig::from(&TomlConfig::default())
    }
}

impl From<&TomlConfig> for ServiceConfig {
    fn from(toml: &TomlConfig) -> Self {
        Self {
            delivery_timeout: Duration::from_millis(toml.delivery_timeout_ms),
            event_capacity: toml.event_capacity,
        }
    }
}

/// Resolve which config file to read, if any
///
/// Returns `None` when neither an explicit path nor a platform config file
/// exists.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_file().filter(|p| p.exists())
}

/// Platform default config file location
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("acs").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.delivery_timeout_ms, 5000);
        assert_eq!(config.event_capacity, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = TomlConfig::from_toml_str("delivery_timeout_ms = 250").unwrap();
        assert_eq!(config.delivery_timeout_ms, 250);
        assert_eq!(config.event_capacity, 100);

        let service = ServiceConfig::from(&config);
        assert_eq!(service.delivery_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = TomlConfig::from_toml_str("event_capacity = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
