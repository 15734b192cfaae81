//! Configuration for the orchestration core
//!
//! Every section and field is optional in the TOML file; omitted values fall
//! back to the defaults used by the in-process dispatcher.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct McpConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub harness: HarnessSection,
}

/// Orchestrator section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorSection {
    /// Per-handler dispatch deadline in milliseconds; absent means unbounded
    pub handler_timeout_ms: Option<u64>,
}

impl OrchestratorSection {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

/// Task monitor section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSection {
    /// Whether processing records are kept at all
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,
    /// Number of records retained after eviction
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            max_records: default_max_records(),
        }
    }
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_max_records() -> usize {
    1000
}

/// Distribution test harness section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessSection {
    /// Interval between completion polls (default: 100)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time allowed for a test task to reach a terminal state (default: 10000)
    #[serde(default = "default_harness_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_harness_timeout_ms(),
        }
    }
}

impl HarnessSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_harness_timeout_ms() -> u64 {
    10_000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl McpConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: McpConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.handler_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "orchestrator.handler_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.monitor.max_records == 0 {
            return Err(ConfigError::InvalidConfig(
                "monitor.max_records must be greater than zero".to_string(),
            ));
        }
        if self.harness.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "harness.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.harness.timeout_ms < self.harness.poll_interval_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "harness.timeout_ms ({}) must not be shorter than harness.poll_interval_ms ({})",
                self.harness.timeout_ms, self.harness.poll_interval_ms
            )));
        }
        Ok(())
    }
}
