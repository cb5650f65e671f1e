//! Runtime configuration model.
//!
//! Loaded by the figment-based loader in `infrastructure::config` from
//! defaults, `.proofloop/config.yaml`, `.proofloop/local.yaml`, and
//! `PROOFLOOP_*` environment variables.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which agent provider to drive and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// `claude`, `codex`, or `opencode`.
    pub name: String,
    /// Executable override; defaults to the provider name on PATH.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "claude".to_string(),
            binary: None,
            model: None,
        }
    }
}

/// Iteration-loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Consecutive stagnated iterations before the task blocks.
    pub stagnation_threshold: u32,
    pub max_iterations: u32,
    pub max_wall_clock_minutes: u64,
    /// With zero blocking conditions, require a non-empty diff before
    /// completing instead of completing after one iteration.
    pub require_diff_when_unconditioned: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            stagnation_threshold: 3,
            max_iterations: 10,
            max_wall_clock_minutes: 60,
            require_diff_when_unconditioned: false,
        }
    }
}

/// Retry caps; the wait ladder itself is fixed by the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_rate_limit_retries: u32,
    pub max_transient_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 100,
            max_transient_retries: 10,
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
    /// Directory for the non-blocking file appender; stderr-only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}
