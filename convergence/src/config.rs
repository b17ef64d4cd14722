//! Operator configuration for the exclusion path.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `EXCLUDE_MISSING_PROCESS_THRESHOLD` | `gate.missing_process_threshold` |
//! | `EXCLUDE_DELAYED_REQUEUE_SECS` | `requeue.delayed_requeue_secs` |
//! | `EXCLUDE_USE_LOCKS` | `lock.use_locks` |
//! | `EXCLUDE_LOCK_DURATION_SECS` | `lock.lock_duration_secs` |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Fraction of the desired processes of a class that must be healthy before
/// a new exclusion of that class is started.
pub const DEFAULT_MISSING_PROCESS_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Quorum gate policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub missing_process_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            missing_process_threshold: DEFAULT_MISSING_PROCESS_THRESHOLD,
        }
    }
}

/// How long the scheduler waits before re-running a step that asked for a
/// delayed requeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequeueConfig {
    pub delayed_requeue_secs: u64,
}

impl RequeueConfig {
    pub fn delayed_requeue(&self) -> Duration {
        Duration::from_secs(self.delayed_requeue_secs)
    }
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            delayed_requeue_secs: 30,
        }
    }
}

/// Cluster lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// When false, lock requests are granted without contacting the lock service.
    pub use_locks: bool,
    pub lock_duration_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            use_locks: true,
            lock_duration_secs: 600,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub gate: GateConfig,
    pub requeue: RequeueConfig,
    pub lock: LockConfig,
}

impl OperatorConfig {
    /// Parses TOML without applying environment overrides.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EXCLUDE_MISSING_PROCESS_THRESHOLD") {
            self.gate.missing_process_threshold =
                parse_env("EXCLUDE_MISSING_PROCESS_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("EXCLUDE_DELAYED_REQUEUE_SECS") {
            self.requeue.delayed_requeue_secs = parse_env("EXCLUDE_DELAYED_REQUEUE_SECS", &v)?;
        }
        if let Some(v) = lookup("EXCLUDE_USE_LOCKS") {
            self.lock.use_locks = parse_env("EXCLUDE_USE_LOCKS", &v)?;
        }
        if let Some(v) = lookup("EXCLUDE_LOCK_DURATION_SECS") {
            self.lock.lock_duration_secs = parse_env("EXCLUDE_LOCK_DURATION_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.gate.missing_process_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "gate.missing_process_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.lock.lock_duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "lock.lock_duration_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}
