use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::rules::MAX_WEBHOOK_TIMEOUT_MS;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid sample_count: {0}. Must be at least 2")]
    InvalidSampleCount(usize),

    #[error("Invalid {name}: {value}. Must be in (0, 1]")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid risk thresholds: red_confidence ({red}) must not exceed green_confidence ({green})")]
    InvertedRiskThresholds { red: f64, green: f64 },

    #[error("Invalid {name}: must be positive")]
    NonPositive { name: &'static str },

    #[error("Invalid budgets: async_ms ({async_ms}) must be at least sync_ms ({sync_ms})")]
    InvalidBudget { sync_ms: u64, async_ms: u64 },

    #[error("Invalid webhook_timeout_ms: {0}. Must be between 1 and {max}", max = MAX_WEBHOOK_TIMEOUT_MS)]
    InvalidWebhookTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid embedding provider: {0}. Must be one of: hashing, openai")]
    InvalidEmbeddingProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .vlayer/config.yaml (project config)
    /// 3. .vlayer/local.yaml (local overrides, optional)
    /// 4. Environment variables (VLAYER_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `root` instead of the working directory.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(".vlayer");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("VLAYER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.divergence.sample_count < 2 {
            return Err(ConfigError::InvalidSampleCount(config.divergence.sample_count));
        }

        let unit_thresholds = [
            ("divergence.entropy_threshold", config.divergence.entropy_threshold),
            ("risk.green_confidence", config.risk.green_confidence),
            ("risk.red_confidence", config.risk.red_confidence),
            ("risk.violation_penalty", config.risk.violation_penalty),
            ("circuit_breaker.failure_rate_threshold", config.circuit_breaker.failure_rate_threshold),
            ("circuit_breaker.probe_success_rate", config.circuit_breaker.probe_success_rate),
            ("constraints.energy_tolerance", config.constraints.energy_tolerance),
        ];
        for (name, value) in unit_thresholds {
            if value.is_nan() || value <= 0.0 || value > 1.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if config.risk.red_confidence > config.risk.green_confidence {
            return Err(ConfigError::InvertedRiskThresholds {
                red: config.risk.red_confidence,
                green: config.risk.green_confidence,
            });
        }

        if config.drift.z_threshold.is_nan() || config.drift.z_threshold <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "drift.z_threshold",
            });
        }
        if config.drift.capacity == 0 {
            return Err(ConfigError::NonPositive {
                name: "drift.capacity",
            });
        }

        let positive_limits = [
            ("constraints.max_loss", config.constraints.max_loss),
            ("constraints.max_leverage", config.constraints.max_leverage),
        ];
        for (name, value) in positive_limits {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name });
            }
        }
        if config.constraints.temperature_min_k >= config.constraints.temperature_max_k
            || config.constraints.pressure_min_atm >= config.constraints.pressure_max_atm
        {
            return Err(ConfigError::ValidationFailed(
                "physical range minimum must be below its maximum".to_string(),
            ));
        }

        let budget = &config.budget;
        if budget.sync_ms == 0 {
            return Err(ConfigError::NonPositive {
                name: "budget.sync_ms",
            });
        }
        if budget.async_ms < budget.sync_ms {
            return Err(ConfigError::InvalidBudget {
                sync_ms: budget.sync_ms,
                async_ms: budget.async_ms,
            });
        }
        if budget.webhook_timeout_ms == 0 || budget.webhook_timeout_ms > MAX_WEBHOOK_TIMEOUT_MS {
            return Err(ConfigError::InvalidWebhookTimeout(budget.webhook_timeout_ms));
        }

        let breaker = &config.circuit_breaker;
        if breaker.window_secs == 0 {
            return Err(ConfigError::NonPositive {
                name: "circuit_breaker.window_secs",
            });
        }
        if breaker.probe_quota == 0 {
            return Err(ConfigError::NonPositive {
                name: "circuit_breaker.probe_quota",
            });
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let valid_providers = ["hashing", "openai"];
        if !valid_providers.contains(&config.embedding.provider.as_str()) {
            return Err(ConfigError::InvalidEmbeddingProvider(
                config.embedding.provider.clone(),
            ));
        }
        if config.embedding.dimension == 0 {
            return Err(ConfigError::NonPositive {
                name: "embedding.dimension",
            });
        }

        Ok(())
    }
}
