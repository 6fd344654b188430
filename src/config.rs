//! Configuration module for the UPS daemon
//!
//! Reads/writes configuration from ~/.config/rmcp-pivoyager/pivoyager.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BINARY: &str = "/usr/local/bin/pivoyager";

/// What the supervisor does when a status query fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryErrorPolicy {
    /// End the supervisor on the first failure, without shutting down
    Stop,
    /// Keep polling until `max_query_failures` consecutive failures
    Retry,
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the vendor `pivoyager` binary
    pub path: PathBuf,
    /// Supervisor polling interval in seconds
    pub refresh_time: u64,
    /// Watchdog timeout armed when the supervisor starts, in seconds
    pub watchdog_timeout: u64,
    /// How often the daemon refreshes the display, in seconds
    pub ui_refresh_time: u64,
    /// How often connectivity is probed until the host is online, in seconds
    pub online_check_interval: u64,
    pub query_errors: QueryErrorPolicy,
    pub max_query_failures: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_BINARY),
            refresh_time: 3,
            watchdog_timeout: 60,
            ui_refresh_time: 5,
            online_check_interval: 30,
            query_errors: QueryErrorPolicy::Retry,
            max_query_failures: 5,
        }
    }
}

fn seconds(value: u64) -> Duration {
    Duration::from_secs(value.max(1))
}

impl Config {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rmcp-pivoyager").join("pivoyager.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path` as pretty TOML
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        seconds(self.refresh_time)
    }

    pub fn ui_refresh_interval(&self) -> Duration {
        seconds(self.ui_refresh_time)
    }

    pub fn online_check_interval(&self) -> Duration {
        seconds(self.online_check_interval)
    }
}
