//! Persistent application configuration model and file-backed manager.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

const MAX_PUSH_CONCURRENCY: usize = 16;

/// Represents the application configuration persisted on disk: display policy, debounce
/// window, batch push fan-out, search size and the database file name.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// When false the timer never writes display text to the notification sink.
    pub show_timer_in_tray: bool,
    pub description_debounce_ms: u64,
    pub push_concurrency: usize,
    pub search_max_results: u32,
    pub database_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_timer_in_tray: true,
            description_debounce_ms: 500,
            push_concurrency: 4,
            search_max_results: 50,
            database_file: "jira-timekeeper.db".to_string(),
        }
    }
}

impl Config {
    pub fn description_debounce(&self) -> Duration {
        Duration::from_millis(self.description_debounce_ms)
    }

    /// Number of remote pushes a batch may have in flight, clamped to 1..=16.
    pub fn effective_push_concurrency(&self) -> usize {
        self.push_concurrency.clamp(1, MAX_PUSH_CONCURRENCY)
    }
}

/// Manages loading and saving of the configuration to a JSON file in the platform config
/// directory, and knows where the ledger database lives.
pub struct ConfigManager {
    path: PathBuf,
    data_dir: PathBuf,
}

impl ConfigManager {
    /// Creates a manager bound to the platform-specific config and data paths.
    pub fn new() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("dev", "timekeeper", "jira-timekeeper")
            .ok_or_else(|| Error::Config("could not determine a home directory".to_string()))?;
        Ok(Self {
            path: dirs.config_dir().join("config.json"),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    /// A manager rooted in an explicit directory; config and data share it.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join("config.json"),
            data_dir: dir,
        }
    }

    pub fn database_path(&self, config: &Config) -> PathBuf {
        self.data_dir.join(&config.database_file)
    }

    /// Loads config from disk, falling back to defaults on read/parse errors.
    pub fn load(&self) -> Config {
        if !self.path.exists() {
            return Config::default();
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                log::warn!("ignoring malformed config {}: {err}", self.path.display());
                Config::default()
            }),
            Err(err) => {
                log::warn!("cannot read config {}: {err}", self.path.display());
                Config::default()
            }
        }
    }

    /// Persists config to disk, creating parent directories when needed.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)
            .map_err(|err| Error::Config(err.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}
