use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::diagnostics::bus::BusCapacity;
use crate::core::diagnostics::store::JsonFileStore;
use crate::core::diagnostics::tasks::LogMonitorConfig;
use crate::core::diagnostics::thresholds::PerformanceThresholds;

/// Replay/overflow sizes of every bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusCapacities {
    pub crash: BusCapacity,
    pub database: BusCapacity,
    pub network: BusCapacity,
    pub performance: BusCapacity,
    pub log: BusCapacity,
    pub engine: BusCapacity,
}

impl Default for BusCapacities {
    fn default() -> Self {
        Self {
            crash: BusCapacity::CRASH,
            database: BusCapacity::DATABASE,
            network: BusCapacity::NETWORK,
            performance: BusCapacity::PERFORMANCE,
            log: BusCapacity::LOG,
            engine: BusCapacity::ENGINE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buses: BusCapacities,
    pub thresholds: PerformanceThresholds,
    pub log_monitor: LogMonitorConfig,
    pub install_crash_handler: bool,
    /// Crash history file; the platform data directory when unset
    pub crash_history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buses: BusCapacities::default(),
            thresholds: PerformanceThresholds::default(),
            log_monitor: LogMonitorConfig::default(),
            install_crash_handler: true,
            crash_history_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load from `path`; missing, empty or unreadable files give the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.is_empty() {
            return Ok(Config::default());
        }

        Ok(serde_json::from_slice(&data).unwrap_or_else(|e| {
            log::warn!("Ignoring corrupted config file {:?}: {}", path, e);
            Config::default()
        }))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_vec_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, data)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("devbot").join("config.json"))
    }

    /// Where crash history is persisted
    pub fn crash_history_file(&self) -> Option<PathBuf> {
        self.crash_history_path
            .clone()
            .or_else(|| JsonFileStore::default_path().ok())
    }
}
