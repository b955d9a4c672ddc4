//! scheduler.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a configuration value is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Host filters, applied in the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Retry,
    Ram,
    Core,
    Disk,
    GroupAntiAffinity,
}

/// Host weighers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeigherKind {
    Ram,
    Cpu,
    Disk,
}

/// A weigher together with the multiplier applied to its raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeigherSpec {
    pub kind: WeigherKind,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scheduling attempts allowed per retry chain. 1 disables retries.
    pub max_attempts: i64,
    /// Number of best-weighted hosts the final random pick is drawn from.
    pub host_subset_size: i64,
    pub ram_allocation_ratio: f64,
    pub cpu_allocation_ratio: f64,
    pub disk_allocation_ratio: f64,
    /// Heartbeat age after which a compute service counts as down.
    pub service_down_time_secs: u64,
    /// Protocol version tag carried by remote compute calls.
    pub rpc_version: String,
    /// Filter order. Retry and group anti-affinity run even when omitted.
    pub filters: Vec<FilterKind>,
    pub weighers: Vec<WeigherSpec>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            host_subset_size: 1,
            ram_allocation_ratio: 1.5,
            cpu_allocation_ratio: 16.0,
            disk_allocation_ratio: 1.0,
            service_down_time_secs: 60,
            rpc_version: "2.0".to_string(),
            filters: vec![
                FilterKind::Retry,
                FilterKind::Ram,
                FilterKind::Core,
                FilterKind::Disk,
                FilterKind::GroupAntiAffinity,
            ],
            weighers: vec![WeigherSpec {
                kind: WeigherKind::Ram,
                multiplier: 1.0,
            }],
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Subset size actually used for selection; anything below 1 means 1.
    pub fn subset_size(&self) -> usize {
        usize::try_from(self.host_subset_size.max(1)).unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                message: format!("must be >= 1, got {}", self.max_attempts),
            });
        }
        for (field, ratio) in [
            ("ram_allocation_ratio", self.ram_allocation_ratio),
            ("cpu_allocation_ratio", self.cpu_allocation_ratio),
            ("disk_allocation_ratio", self.disk_allocation_ratio),
        ] {
            if !ratio.is_finite() || ratio < 1.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must be a finite number >= 1.0, got {ratio}"),
                });
            }
        }
        if let Some(w) = self.weighers.iter().find(|w| !w.multiplier.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "weighers",
                message: format!("multiplier for {:?} is not finite", w.kind),
            });
        }
        Ok(())
    }
}
