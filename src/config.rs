//! Configuration management
//!
//! Dataset and model locations, sampling cadence, forest hyperparameters and
//! the viewer server address, read from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::ForestParams;
use crate::monitor::MonitorSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dataset and model artifact locations
    #[serde(default)]
    pub data: DataConfig,
    /// Sampling loop settings
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Regressor hyperparameters
    #[serde(default)]
    pub training: TrainingConfig,
    /// Viewer server settings
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// CSV of historical observations with lab-measured targets
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,
    /// Directory holding one artifact per target
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("wastewater_data.csv")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            models_dir: default_models_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Seconds to wait after each cycle
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Extra pause after a failed cycle
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Try the sensor device before falling back to synthetic readings
    #[serde(default = "default_true")]
    pub use_device: bool,
    /// Serial device path, or tcp://host:port for a network serial bridge
    #[serde(default = "default_device")]
    pub device: String,
    /// Bound on each device line read
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_interval() -> u64 {
    5
}

fn default_cooldown() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_device() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_read_timeout() -> u64 {
    2
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            cooldown_secs: default_cooldown(),
            use_device: true,
            device: default_device(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl SamplingConfig {
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.interval_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Unlimited when absent
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_leaf")]
    pub min_samples_leaf: usize,
}

fn default_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_min_split() -> usize {
    2
}

fn default_min_leaf() -> usize {
    1
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_estimators(),
            seed: default_seed(),
            max_depth: None,
            min_samples_split: default_min_split(),
            min_samples_leaf: default_min_leaf(),
        }
    }
}

impl TrainingConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            seed: self.seed,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Events buffered per viewer before it starts lagging
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            channel_capacity: default_capacity(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults there on first use
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "aqua-monitor", "aqua-monitor")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}
