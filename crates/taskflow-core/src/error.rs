//! Error types for Taskflow

use crate::state::RunStatus;
use crate::types::StepId;
use thiserror::Error;

/// A malformed plan. Raised before any action runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("plan has no steps")]
    EmptyPlan,

    #[error("duplicate step id: {0}")]
    DuplicateStep(StepId),

    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("step {0} depends on itself")]
    SelfDependency(StepId),

    #[error("dependency cycle among steps: {}", .0.join(", "))]
    Cycle(Vec<StepId>),

    #[error("artifact {artifact} is published by both {first} and {second}")]
    DuplicateArtifact {
        artifact: String,
        first: StepId,
        second: StepId,
    },

    #[error("step {step} references the result of unknown step {target}")]
    UnknownReference { step: StepId, target: StepId },
}

/// Why a single step (or batched call) failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("action failed: {0}")]
    Execution(String),

    #[error("precondition not met: {0}")]
    Precondition(String),

    #[error("postcondition not met: {0}")]
    Postcondition(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool error: {name} - {message}")]
    Tool { name: String, message: String },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown compensation handler: {0}")]
    UnknownHandler(String),

    #[error("memory store error: {0}")]
    Memory(String),

    #[error("skipped: {0}")]
    Skipped(String),
}

impl StepError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Failures that another attempt cannot fix end the retry loop early.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Precondition(_)
                | Self::ToolNotFound(_)
                | Self::UnknownFunction(_)
                | Self::UnknownHandler(_)
                | Self::Skipped(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("plan validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("step {step} failed: {source}")]
    Step {
        step: StepId,
        #[source]
        source: StepError,
    },

    #[error("rollback of step {step} failed: {message}")]
    Rollback { step: StepId, message: String },

    #[error("no active run for id: {0}")]
    RunNotFound(String),

    #[error("run already exists: {0}")]
    RunExists(String),

    #[error("invalid transition for run {run}: {from} -> {to}")]
    InvalidTransition {
        run: String,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn step(step: impl Into<StepId>, source: StepError) -> Self {
        Self::Step {
            step: step.into(),
            source,
        }
    }

    pub fn rollback(step: impl Into<StepId>, message: impl Into<String>) -> Self {
        Self::Rollback {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(run: impl Into<String>, from: RunStatus, to: RunStatus) -> Self {
        Self::InvalidTransition {
            run: run.into(),
            from,
            to,
        }
    }
}
