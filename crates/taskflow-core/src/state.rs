//! Run lifecycle state and checkpoints

use crate::types::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one run.
///
/// `NotStarted -> Running -> {Completed | Failed | RolledBack}`, with
/// `Running <-> Paused` as the only reversible edge. A paused run may also be
/// cancelled, which lands in `Failed`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Paused,
    Completed,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (*self, next),
            (Self::NotStarted, Self::Running)
                | (Self::NotStarted, Self::Failed)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::RolledBack)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Failed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Progress of a run. `completed` keeps completion order, which is the order
/// the rollback sweep reverses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub current_step: Option<StepId>,
    pub completed: Vec<StepId>,
    pub failed: Vec<StepId>,
    pub skipped: Vec<StepId>,
    pub status: RunStatus,
}

impl ExecutionState {
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.iter().any(|s| s == id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.iter().any(|s| s == id)
    }

    pub fn is_skipped(&self, id: &str) -> bool {
        self.skipped.iter().any(|s| s == id)
    }

    /// Whether the step has reached any final outcome.
    pub fn is_settled(&self, id: &str) -> bool {
        self.is_completed(id) || self.is_failed(id) || self.is_skipped(id)
    }
}

/// Immutable snapshot of [`ExecutionState`] taken after a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step_id: StepId,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(step_id: impl Into<StepId>, state: &ExecutionState) -> Self {
        Self {
            step_id: step_id.into(),
            state: state.clone(),
            created_at: Utc::now(),
        }
    }
}
