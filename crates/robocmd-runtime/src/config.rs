//! Runtime configuration – reads `robocmd.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! After loading, `ROBOCMD_*` environment variables override file values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log line format for the console subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue {
                key: "log_format",
                value: other.to_string(),
            }),
        }
    }
}

/// Host loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeConfig {
    /// Scheduler tick period in milliseconds.
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,

    /// Log a warning whenever a tick takes longer than its period.
    #[serde(default = "default_warn_on_overrun")]
    pub warn_on_overrun: bool,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Service name reported to the OTLP collector.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_tick_period_ms() -> u64 {
    20
}
fn default_warn_on_overrun() -> bool {
    true
}
fn default_log_filter() -> String {
    "info".to_string()
}
fn default_service_name() -> String {
    "robocmd".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            warn_on_overrun: default_warn_on_overrun(),
            log_filter: default_log_filter(),
            log_format: LogFormat::default(),
            service_name: default_service_name(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl RuntimeConfig {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `ROBOCMD_*` environment variable overrides.
    ///
    /// | Variable | Config field |
    /// |---|---|
    /// | `ROBOCMD_TICK_PERIOD_MS` | `tick_period_ms` |
    /// | `ROBOCMD_LOG_FILTER` | `log_filter` |
    /// | `ROBOCMD_LOG_FORMAT` | `log_format` |
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.  Extracted so tests do not
    /// have to mutate the process environment.
    pub(crate) fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ROBOCMD_TICK_PERIOD_MS") {
            self.tick_period_ms = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "tick_period_ms",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("ROBOCMD_LOG_FILTER") {
            self.log_filter = v;
        }
        if let Some(v) = lookup("ROBOCMD_LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }
}
