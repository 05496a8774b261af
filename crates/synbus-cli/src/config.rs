//! Configuration management for the synbus CLI

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use synbus_runtime::UidStrategy;

use crate::error::{CliError, CliResult};

/// Global CLI configuration, read from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default logging level
    pub log_level: Option<String>,

    /// Default number of worker threads
    pub threads: Option<usize>,

    /// Log progress every this many ticks
    pub progress_interval: Option<u64>,

    /// UID strategy for generated components
    pub uid_strategy: UidStrategy,

    /// Defaults for `synbus run`
    pub run: RunDefaults,
}

/// Network parameters `synbus run` does not take as flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    /// Largest initial weight, weights are drawn from `[0, max_weight)`
    pub max_weight: f32,

    /// Synaptic delay in ticks
    pub delay: u32,

    /// BLIFAT activation threshold
    pub activation_threshold: f32,

    /// Potential retained per tick
    pub potential_decay: f32,

    /// Absolute refractory period in ticks
    pub refractory_period: u64,

    /// Free resource per neuron for resource STDP
    pub resource_max: f32,

    /// Hebbian increment for resource STDP
    pub d_h: f32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            threads: None,
            progress_interval: None,
            uid_strategy: UidStrategy::Random,
            run: RunDefaults::default(),
        }
    }
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            max_weight: 0.5,
            delay: 1,
            activation_threshold: 1.0,
            potential_decay: 0.9,
            refractory_period: 2,
            resource_max: 1.0,
            d_h: 0.05,
        }
    }
}

impl CliConfig {
    /// Load configuration from file, defaults when it does not exist
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| CliError::config(format!("Invalid config file {}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::config("Could not determine config directory"))?;
        Ok(config_dir.join("synbus").join("config.toml"))
    }

    /// Configuration from an explicit file, which must exist, or from the
    /// default location
    pub fn resolve(explicit: Option<&Path>) -> CliResult<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(CliError::config(format!(
                "Config file {} not found",
                path.display()
            ))),
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Ok(path) => Self::load_from_file(&path),
                Err(_) => Ok(Self::default()),
            },
        }
    }
}
