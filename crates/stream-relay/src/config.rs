//! Configuration resolution for relays.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (JSON)
//! 3. Environment variables (highest priority)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::listener::{END_CHANNEL, ERROR_CHANNEL, VALUE_CHANNEL};

/// Environment variable overriding [`RelayConfig::event_name`].
pub const ENV_EVENT_NAME: &str = "STREAM_RELAY_EVENT_NAME";
/// Environment variable overriding [`RelayConfig::log_level`].
pub const ENV_LOG_LEVEL: &str = "STREAM_RELAY_LOG_LEVEL";
/// Environment variable overriding [`RelayConfig::log_json`].
pub const ENV_LOG_JSON: &str = "STREAM_RELAY_LOG_JSON";
/// Environment variable overriding [`RelayConfig::warn_unobserved_errors`].
pub const ENV_WARN_UNOBSERVED_ERRORS: &str = "STREAM_RELAY_WARN_UNOBSERVED_ERRORS";

/// Relay settings that can be loaded from a file or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Channel name values are published on.
    pub event_name: String,
    /// Log level used by [`crate::tracing_init::init_from_config`].
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
    /// Log a warning when an error is published with no `"error"` listener.
    pub warn_unobserved_errors: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            event_name: VALUE_CHANNEL.to_string(),
            log_level: "info".to_string(),
            log_json: false,
            warn_unobserved_errors: true,
        }
    }
}

impl RelayConfig {
    /// Check that the settings describe a usable relay.
    pub fn validate(&self) -> Result<()> {
        if self.event_name.trim().is_empty() {
            return Err(Error::Config("event_name must not be empty".into()));
        }
        if self.event_name == END_CHANNEL || self.event_name == ERROR_CHANNEL {
            return Err(Error::Config(format!(
                "event_name '{}' is reserved",
                self.event_name
            )));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// A missing `settings_path` is not an error; the defaults apply.
pub fn load_config(settings_path: Option<&Path>) -> Result<RelayConfig> {
    let mut config = RelayConfig::default();

    if let Some(path) = settings_path
        && path.exists()
    {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<RelayConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut RelayConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var(ENV_EVENT_NAME) {
        config.event_name = val;
    }
    if let Some(val) = var(ENV_LOG_LEVEL) {
        config.log_level = val;
    }
    if let Some(val) = var(ENV_LOG_JSON)
        && let Some(flag) = parse_flag(&val)
    {
        config.log_json = flag;
    }
    if let Some(val) = var(ENV_WARN_UNOBSERVED_ERRORS)
        && let Some(flag) = parse_flag(&val)
    {
        config.warn_unobserved_errors = flag;
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
