//! Engine configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists or it doesn't parse.

use crate::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    /// Step-level retry delays.
    pub retry: BackoffPolicy,
    pub batch: BatchConfig,
}

/// How a scheduler group is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Tool calls through the batcher, everything else concurrently.
    #[default]
    Batched,
    /// One step at a time, in plan order.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub strategy: StrategyKind,
    /// Reject plans whose `$result` references name unknown steps.
    pub strict_references: bool,
    /// Write an `execution_summary` memory record when a run ends.
    pub store_summary: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Batched,
            strict_references: false,
            store_summary: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Tool calls in flight at once, per batch.
    pub max_concurrency: usize,
    /// Deadline for one tool call attempt.
    pub call_timeout_ms: u64,
    /// Keep launching later batch levels after a call fails.
    pub continue_on_error: bool,
    pub backoff: BackoffPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            call_timeout_ms: 30_000,
            continue_on_error: false,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl BatchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse config from a TOML string. Unlike [`load`](Self::load) this
    /// reports errors.
    pub fn from_toml(content: &str) -> taskflow_core::Result<Self> {
        toml::from_str(content).map_err(|e| taskflow_core::Error::ConfigError(e.to_string()))
    }

    pub fn to_toml(&self) -> taskflow_core::Result<String> {
        toml::to_string_pretty(self).map_err(|e| taskflow_core::Error::ConfigError(e.to_string()))
    }
}
