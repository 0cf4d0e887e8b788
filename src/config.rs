use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::environment::TradingEnvConfig;
use crate::policy::PolicyConfig;
use crate::training::DqnTrainerParameters;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub trainer: DqnTrainerParameters,
    pub policy: PolicyConfig,
    pub network: NetworkConfig,
    /// Demo environment parameters
    pub market: TradingEnvConfig,
    pub logging: LoggingConfig,
    /// Seed for every random generator; entropy when absent
    pub seed: Option<u64>,
}

/// Q-network shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Width of the first hidden layer
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_dim: default_hidden_dim(),
        }
    }
}

fn default_hidden_dim() -> usize {
    128
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADER_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADER_TRAINER__BATCH_SIZE, etc.)
            .add_source(env_overrides());

        builder.build()?.try_deserialize()
    }

    /// Load a single explicit file, still honouring environment overrides
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .add_source(env_overrides())
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(trainer) = self.trainer.validate() {
            errors.extend(trainer.into_iter().map(|e| format!("trainer.{e}")));
        }
        if let Err(policy) = self.policy.validate() {
            errors.extend(policy.into_iter().map(|e| format!("policy.{e}")));
        }
        if self.network.hidden_dim < 2 {
            errors.push("network.hidden_dim must be at least 2".to_string());
        }
        if let Err(market) = self.market.validate() {
            errors.extend(market);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix("TRADER")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
