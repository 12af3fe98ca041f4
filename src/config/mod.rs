//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to load layered config: {0}")]
    LayerError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Narrative (AI commentary) source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// When false every match uses the local random generator
    #[serde(default = "default_narrative_enabled")]
    pub enabled: bool,

    /// Backend type: "ollama" or "gemini"
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Environment variable holding the API key (remote backends)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_narrative_enabled() -> bool {
    true
}

fn default_backend() -> String {
    "ollama".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: default_narrative_enabled(),
            backend: default_backend(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_seconds: default_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Match simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Penalty rounds before sudden death
    #[serde(default = "default_standard_rounds")]
    pub standard_rounds: u32,

    #[serde(default = "default_penalty_success_rate")]
    pub penalty_success_rate: f64,

    #[serde(default = "default_sudden_death_success_rate")]
    pub sudden_death_success_rate: f64,

    /// Sudden-death rounds before a coin flip settles the shootout
    #[serde(default = "default_max_sudden_death_rounds")]
    pub max_sudden_death_rounds: u32,

    /// Upper bound of goals per team in the random fallback
    #[serde(default = "default_max_goals_per_team")]
    pub max_goals_per_team: u32,

    /// Roster names passed to the narrative source (starting XI)
    #[serde(default = "default_roster_limit")]
    pub roster_limit: usize,

    /// Pause between revealed events; 0 resolves instantly
    #[serde(default)]
    pub event_delay_ms: u64,

    /// Fixed RNG seed for reproducible tournaments
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_standard_rounds() -> u32 {
    5
}

fn default_penalty_success_rate() -> f64 {
    0.75
}

fn default_sudden_death_success_rate() -> f64 {
    0.70
}

fn default_max_sudden_death_rounds() -> u32 {
    15
}

fn default_max_goals_per_team() -> u32 {
    4
}

fn default_roster_limit() -> usize {
    11
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            standard_rounds: default_standard_rounds(),
            penalty_success_rate: default_penalty_success_rate(),
            sudden_death_success_rate: default_sudden_death_success_rate(),
            max_sudden_death_rounds: default_max_sudden_death_rounds(),
            max_goals_per_team: default_max_goals_per_team(),
            roster_limit: default_roster_limit(),
            event_delay_ms: 0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn event_delay(&self) -> Duration {
        Duration::from_millis(self.event_delay_ms)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub narrative: NarrativeConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            narrative: NarrativeConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Prefix for environment overrides, e.g. `KNOCKOUT__SIMULATION__SEED=42`.
pub const ENV_PREFIX: &str = "KNOCKOUT";

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional TOML file with environment overrides layered on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let layered = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = layered.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.narrative.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Narrative timeout must be greater than 0".to_string(),
            ));
        }

        let sim = &self.simulation;
        if sim.standard_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "Shootout needs at least one standard round".to_string(),
            ));
        }

        for (name, rate) in [
            ("penalty_success_rate", sim.penalty_success_rate),
            ("sudden_death_success_rate", sim.sudden_death_success_rate),
        ] {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be in (0, 1], got {rate}"
                )));
            }
        }

        if sim.roster_limit == 0 {
            return Err(ConfigError::ValidationError(
                "Roster limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
