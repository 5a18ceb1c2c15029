//! Application configuration

use crate::display::OutputFormat;
use anyhow::{Context, Result};
use hw_sens_core::{SchedulerConfig, DEFAULT_UPDATE_INTERVAL_MS, MIN_UPDATE_INTERVAL_MS};
use hw_sens_sources::{SourceKind, DEFAULT_HWMON_ROOT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config file format
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("update interval of {0} ms is below the minimum of {min} ms", min = MIN_UPDATE_INTERVAL_MS)]
    IntervalTooShort(u64),
    #[error("config version {0} is newer than supported version {supported}", supported = CONFIG_VERSION)]
    UnsupportedVersion(u32),
    #[error("hwmon root must not be empty")]
    EmptyHwmonRoot,
}

/// Application-wide configuration
///
/// Missing fields take their defaults, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Version of the config format
    pub version: u32,
    /// Sampling period in milliseconds
    pub update_interval_ms: u64,
    pub source: SourceKind,
    /// Where hwmon devices are discovered
    pub hwmon_root: PathBuf,
    /// Stop after this many consecutive ticks in which every read failed; 0 never stops
    pub max_failed_ticks: u32,
    pub output: OutputFormat,
}

impl AppConfig {
    /// Load configuration from disk, or defaults when there is no file yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            log::info!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "github.hw_sens", "hw-sens")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        if self.update_interval_ms < MIN_UPDATE_INTERVAL_MS {
            return Err(ConfigError::IntervalTooShort(self.update_interval_ms));
        }
        if self.hwmon_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyHwmonRoot);
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.update_interval(),
            max_failed_ticks: self.max_failed_ticks,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            source: SourceKind::default(),
            hwmon_root: PathBuf::from(DEFAULT_HWMON_ROOT),
            max_failed_ticks: 0,
            output: OutputFormat::default(),
        }
    }
}
