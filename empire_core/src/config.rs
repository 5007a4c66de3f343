//! Configuration for the relay and the tick engine.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use empire_rules::LoyaltyRules;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_EMPIRE_CONFIG: &str = include_str!("data/empire_config.toml");

/// Environment variable naming a TOML file that overrides the builtin config.
pub const CONFIG_PATH_ENV: &str = "EMPIRE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EmpireConfig {
    pub relay: RelayConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Send a STATUS_UPDATE back to the origin when a forwarded command completes.
    pub auto_status_updates: bool,
    /// Leading text of automatic status updates.
    pub status_update_prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            auto_status_updates: true,
            status_update_prefix: "Command executed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rebellion_threshold: f64,
    pub loyalty_baseline: f64,
    pub loyalty_drift_rate: f64,
    pub upgrade_loyalty_bonus: f64,
    pub crisis_loyalty_penalty: f64,
    /// Crisis chance at loyalty 0; scales linearly down to 0 at loyalty 100.
    pub crisis_base_chance: f64,
    /// Seed for reproducible runs. Entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rebellion_threshold: 25.0,
            loyalty_baseline: 50.0,
            loyalty_drift_rate: 0.10,
            upgrade_loyalty_bonus: 1.0,
            crisis_loyalty_penalty: 0.5,
            crisis_base_chance: 0.30,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn loyalty_rules(&self) -> LoyaltyRules {
        LoyaltyRules {
            baseline: self.loyalty_baseline,
            drift_rate: self.loyalty_drift_rate,
            upgrade_bonus: self.upgrade_loyalty_bonus,
            crisis_penalty: self.crisis_loyalty_penalty,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse empire config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read empire config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid empire config: {0}")]
    Invalid(String),
}

impl EmpireConfig {
    pub fn builtin() -> Self {
        Self::from_toml_str(BUILTIN_EMPIRE_CONFIG).expect("builtin empire config should parse")
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let config: EmpireConfig = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if !(0.0..=100.0).contains(&sim.rebellion_threshold) {
            return Err(ConfigError::Invalid(format!(
                "rebellion_threshold {} outside [0, 100]",
                sim.rebellion_threshold
            )));
        }
        if !(0.0..=100.0).contains(&sim.loyalty_baseline) {
            return Err(ConfigError::Invalid(format!(
                "loyalty_baseline {} outside [0, 100]",
                sim.loyalty_baseline
            )));
        }
        for (name, value) in [
            ("loyalty_drift_rate", sim.loyalty_drift_rate),
            ("crisis_base_chance", sim.crisis_base_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} {value} outside [0, 1]")));
            }
        }
        for (name, value) in [
            ("upgrade_loyalty_bonus", sim.upgrade_loyalty_bonus),
            ("crisis_loyalty_penalty", sim.crisis_loyalty_penalty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} {value} must be >= 0")));
            }
        }
        Ok(())
    }
}

/// Load the config named by `EMPIRE_CONFIG_PATH`, falling back to the builtin.
pub fn load_config_from_env() -> EmpireConfig {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        match EmpireConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "empire::config",
                    path = %path.display(),
                    "config.loaded"
                );
                return config;
            }
            Err(err) => {
                tracing::warn!(
                    target: "empire::config",
                    path = %path.display(),
                    error = %err,
                    "config.load_failed"
                );
            }
        }
    }
    EmpireConfig::builtin()
}
