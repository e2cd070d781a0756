//! Configuration module for Chrollo.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::script::ResourceLimits;
use crate::{ChrolloError, Result};

/// Scripting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptingConfig {
    /// Directory scanned for `.lua` user scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    /// Wall-clock budget per script execution or hook call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum Lua heap size in megabytes.
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,
    /// Expose the `chrollo.test` namespace to scripts.
    #[serde(default)]
    pub test_api: bool,
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_max_memory_mb() -> usize {
    16
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            timeout_ms: default_timeout_ms(),
            max_memory_mb: default_max_memory_mb(),
            test_api: false,
        }
    }
}

impl ScriptingConfig {
    /// Sandbox limits derived from this configuration.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_execution: Duration::from_millis(self.timeout_ms),
            max_memory: self.max_memory_mb * 1024 * 1024,
        }
    }
}

/// Protocol plugin configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PluginsConfig {
    /// Id of the active protocol plugin, if any.
    #[serde(default)]
    pub active: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/chrollo.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Scripting configuration.
    #[serde(default)]
    pub scripting: ScriptingConfig,
    /// Protocol plugin configuration.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ChrolloError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ChrolloError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CHROLLO_LOG_LEVEL`: Override the log level
    /// - `CHROLLO_ACTIVE_PLUGIN`: Override the active protocol plugin
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("CHROLLO_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(plugin) = std::env::var("CHROLLO_ACTIVE_PLUGIN") {
            if !plugin.is_empty() {
                self.plugins.active = Some(plugin);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.scripting.timeout_ms == 0 {
            return Err(ChrolloError::Validation(
                "scripting.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.scripting.max_memory_mb == 0 {
            return Err(ChrolloError::Validation(
                "scripting.max_memory_mb must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
