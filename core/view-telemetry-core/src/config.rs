//! Runtime configuration loaded from `~/.view-telemetry/config.toml`.
//!
//! Every section and field is optional; a missing file yields defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TelemetryError};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".view-telemetry/config.toml";

pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.1;
pub const DEFAULT_UNLOAD_ACK_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub visibility: VisibilityConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StabilityConfig {
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Items visible for less than this are held back from stable batches.
    #[serde(default)]
    pub min_dwell_ms: u64,
}

impl StabilityConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            min_dwell_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VisibilityConfig {
    /// Fraction of an item's area that must intersect the viewport.
    #[serde(default = "default_visibility_threshold")]
    pub threshold: f64,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            threshold: default_visibility_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_unload_ack_timeout_ms")]
    pub unload_ack_timeout_ms: u64,
}

impl RuntimeConfig {
    pub fn unload_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.unload_ack_timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unload_ack_timeout_ms: default_unload_ack_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Tracing,
    Stdout,
    File,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stability.quiet_period_ms == 0 {
            return Err(TelemetryError::InvalidConfig(
                "stability.quiet_period_ms must be greater than 0".to_string(),
            ));
        }
        let threshold = self.visibility.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(TelemetryError::InvalidConfig(format!(
                "visibility.threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.sink.kind == SinkKind::File && self.sink.path.is_none() {
            return Err(TelemetryError::InvalidConfig(
                "sink.path is required when sink.kind = \"file\"".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(TelemetryError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads and validates the configuration at `path` (or the default location).
pub fn load_config(path: Option<&Path>) -> Result<TelemetryConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(TelemetryConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| TelemetryError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    let config = toml::from_str::<TelemetryConfig>(&content).map_err(|err| {
        TelemetryError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        }
    })?;
    config.validate()?;
    Ok(config)
}

fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}

fn default_visibility_threshold() -> f64 {
    DEFAULT_VISIBILITY_THRESHOLD
}

fn default_unload_ack_timeout_ms() -> u64 {
    DEFAULT_UNLOAD_ACK_TIMEOUT_MS
}
