//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tagscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tagscope/` (~/.config/tagscope/)
//! - State/Logs: `$XDG_STATE_HOME/tagscope/` (~/.local/state/tagscope/)

use crate::collector::PollPolicy;
use crate::error::{Error, Result};
use crate::types::PairingRule;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Collector timing and source settings
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Pairing rules; the built-in rules are used when empty
    #[serde(default)]
    pub pairing: Vec<PairingRule>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Source name used when the caller doesn't supply one
    #[serde(default)]
    pub source_name: Option<String>,

    /// Milliseconds between readiness probes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Probe attempts before giving up; 0 polls forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Milliseconds after creation at which the auto summary fires
    #[serde(default = "default_auto_summary_delay_ms")]
    pub auto_summary_delay_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source_name: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            auto_summary_delay_ms: default_auto_summary_delay_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    200
}

// 150 probes at 200ms gives up at the 30s auto-summary mark
fn default_max_attempts() -> u32 {
    150
}

fn default_auto_summary_delay_ms() -> u64 {
    30_000
}

impl CollectorConfig {
    /// Readiness polling policy described by this config
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }

    /// Delay before the auto summary fires
    pub fn auto_summary_delay(&self) -> Duration {
        Duration::from_millis(self.auto_summary_delay_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "collector.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.collector.validate()?;

        let mut names = HashSet::new();
        for rule in &self.pairing {
            if rule.name.trim().is_empty() {
                return Err(Error::Config("pairing rule name must not be empty".to_string()));
            }
            if rule.key.trim().is_empty() {
                return Err(Error::Config(format!(
                    "pairing rule '{}' needs a correlation key",
                    rule.name
                )));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate pairing rule '{}'",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    /// Pairing rules in effect: the configured ones, or the built-in defaults
    pub fn pairing_rules(&self) -> Vec<PairingRule> {
        if self.pairing.is_empty() {
            PairingRule::defaults()
        } else {
            self.pairing.clone()
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tagscope/config.toml` (~/.config/tagscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tagscope").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tagscope/` (~/.local/state/tagscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tagscope")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tagscope/tagscope.log` (~/.local/state/tagscope/tagscope.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tagscope.log")
    }
}
