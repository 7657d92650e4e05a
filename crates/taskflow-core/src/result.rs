//! Step and task results

use crate::error::StepError;
use crate::state::RunStatus;
use crate::types::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one step, after retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub success: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Attempts beyond the first.
    pub retries: u32,
    /// Never attempted (a dependency did not complete, or its batch aborted).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(step_id: impl Into<StepId>, output: Value, duration_ms: u64, retries: u32) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            output,
            error: None,
            duration_ms,
            retries,
            skipped: false,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        step_id: impl Into<StepId>,
        error: &StepError,
        duration_ms: u64,
        retries: u32,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            output: Value::Null,
            error: Some(error.to_string()),
            duration_ms,
            retries,
            skipped: false,
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(step_id: impl Into<StepId>, reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::failure(step_id, &StepError::Skipped(reason.into()), 0, 0)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// In completion order.
    pub completed_steps: Vec<StepId>,
    pub failed_steps: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_steps: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rolled_back_steps: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<StepId>,
    pub duration_ms: u64,
    pub step_count: usize,
    /// The alternative plan that produced this result, if the primary failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// What the caller of `execute`/`resume` receives. Never a bare crash: the
/// flag and the metadata describe everything that happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub status: RunStatus,
    /// Successful step outputs keyed by step id.
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: TaskMetadata,
}

impl TaskResult {
    /// A run that never got past validation.
    pub fn rejected(task_id: impl Into<String>, error: impl Into<String>, step_count: usize) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            status: RunStatus::Failed,
            output: Value::Null,
            error: Some(error.into()),
            metadata: TaskMetadata {
                step_count,
                ..Default::default()
            },
        }
    }
}
