//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Must be one of: claude, codex, opencode")]
    InvalidProvider(String),

    #[error("Invalid stagnation_threshold: {0}. Must be at least 1")]
    InvalidStagnationThreshold(u32),

    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid max_wall_clock_minutes: {0}. Must be at least 1")]
    InvalidWallClock(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid retry caps: rate-limit {0} / transient {1}. Neither may be 0")]
    InvalidRetryCaps(u32, u32),
}

/// Loads configuration from defaults, project files, and environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.proofloop/config.yaml` (project config)
    /// 3. `.proofloop/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`PROOFLOOP_*`, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".proofloop/config.yaml"))
            .merge(Yaml::file(".proofloop/local.yaml"))
            .merge(Env::prefixed("PROOFLOOP_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
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

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_providers = ["claude", "codex", "opencode"];
        if !valid_providers.contains(&config.provider.name.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidProvider(config.provider.name.clone()));
        }

        if config.delivery.stagnation_threshold == 0 {
            return Err(ConfigError::InvalidStagnationThreshold(
                config.delivery.stagnation_threshold,
            ));
        }
        if config.delivery.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(
                config.delivery.max_iterations,
            ));
        }
        if config.delivery.max_wall_clock_minutes == 0 {
            return Err(ConfigError::InvalidWallClock(
                config.delivery.max_wall_clock_minutes,
            ));
        }

        if config.retry.max_rate_limit_retries == 0 || config.retry.max_transient_retries == 0 {
            return Err(ConfigError::InvalidRetryCaps(
                config.retry.max_rate_limit_retries,
                config.retry.max_transient_retries,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ConfigLoader::validate(&Config::default()).unwrap();
    }

    #[test]
    fn bad_provider_is_rejected() {
        let mut config = Config::default();
        config.provider.name = "gemini".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidProvider(_))
        ));
    }

    #[test]
    fn zero_stagnation_threshold_is_rejected() {
        let mut config = Config::default();
        config.delivery.stagnation_threshold = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "provider:\n  name: codex\ndelivery:\n  stagnation_threshold: 5\n",
        )
        .unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.provider.name, "codex");
        assert_eq!(config.delivery.stagnation_threshold, 5);
        // Untouched fields keep defaults.
        assert_eq!(config.delivery.max_iterations, 10);
    }
}
