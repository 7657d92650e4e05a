//! Retry delay policy shared by the step runner and the tool batcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `(attempt + 1) * base`
    Linear,
    /// `2^attempt * base`
    #[default]
    Exponential,
}

/// How long to wait before retry number `attempt + 1`.
///
/// `attempt` counts failures so far, starting at 0. Delays never exceed
/// `max_delay_ms`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub policy: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            policy: BackoffKind::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    pub fn linear(base_delay_ms: u64) -> Self {
        Self {
            policy: BackoffKind::Linear,
            base_delay_ms,
            ..Default::default()
        }
    }

    pub fn exponential(base_delay_ms: u64) -> Self {
        Self {
            policy: BackoffKind::Exponential,
            base_delay_ms,
            ..Default::default()
        }
    }

    pub fn with_max(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = match self.policy {
            BackoffKind::Linear => self.base_delay_ms.saturating_mul(attempt as u64 + 1),
            BackoffKind::Exponential => self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt)),
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}
