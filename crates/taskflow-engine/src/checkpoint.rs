//! Rollback of a failed run.
//!
//! The sweep walks completed steps in reverse completion order and runs each
//! step's declared rollback action, then the plan-level cleanup steps. It is
//! best effort: a failing rollback is logged and the sweep moves on.
//! Checkpoints themselves live on the [`ExecutionContext`].

use crate::context::ExecutionContext;
use crate::resolve::resolve;
use crate::runner::StepRunner;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use taskflow_core::{Error, ExecutionPlan, RollbackAction, Step, StepError};
use tracing::{info, warn};

/// Caller-supplied undo logic, referenced from plans by name.
#[async_trait::async_trait]
pub trait CompensationHandler: Send + Sync {
    async fn compensate(&self, step_id: &str, input: Value) -> Result<Value, String>;
}

pub struct RollbackManager {
    runner: Arc<StepRunner>,
    handlers: HashMap<String, Arc<dyn CompensationHandler>>,
}

/// Outcome of a rollback sweep.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Steps whose rollback action succeeded, in sweep order.
    pub rolled_back: Vec<String>,
    pub errors: Vec<Error>,
}

impl RollbackManager {
    pub fn new(runner: Arc<StepRunner>, handlers: HashMap<String, Arc<dyn CompensationHandler>>) -> Self {
        Self { runner, handlers }
    }

    pub async fn rollback(&self, plan: &ExecutionPlan, ctx: &mut ExecutionContext) -> RollbackReport {
        let mut report = RollbackReport::default();
        // Restoring a checkpoint rewrites `completed`; sweep the list as it
        // was when the failure happened.
        let completed = ctx.state.completed.clone();
        info!(run_id = %ctx.run_id, steps = completed.len(), "rolling back");

        for id in completed.iter().rev() {
            let Some(step) = plan.step(id) else { continue };
            let Some(action) = &step.rollback else { continue };

            match self.undo(step, action, ctx).await {
                Ok(()) => {
                    info!(run_id = %ctx.run_id, step = %id, "rolled back");
                    ctx.mark_rolled_back(id);
                    report.rolled_back.push(id.clone());
                }
                Err(e) => {
                    warn!(run_id = %ctx.run_id, step = %id, "rollback failed: {}", e);
                    report.errors.push(e);
                }
            }
        }

        for step in &plan.rollback.steps {
            let result = self.runner.run_step(step, ctx).await;
            if !result.success {
                let message = result.error.unwrap_or_default();
                warn!(run_id = %ctx.run_id, step = %step.id, "rollback step failed: {}", message);
                report.errors.push(Error::rollback(&step.id, message));
            }
        }

        report
    }

    async fn undo(&self, step: &Step, action: &RollbackAction, ctx: &mut ExecutionContext) -> Result<(), Error> {
        match action {
            RollbackAction::Compensate { tool, parameters } => {
                let params = resolve(parameters, &*ctx);
                self.runner
                    .batcher()
                    .call_tool(tool, params)
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::rollback(&step.id, e.to_string()))
            }
            RollbackAction::RestoreCheckpoint { checkpoint } => {
                if ctx.restore(checkpoint) {
                    Ok(())
                } else {
                    Err(Error::rollback(&step.id, format!("no checkpoint for step {}", checkpoint)))
                }
            }
            RollbackAction::Handler { name, input } => {
                let handler = self
                    .handlers
                    .get(name)
                    .ok_or_else(|| Error::step(&step.id, StepError::UnknownHandler(name.clone())))?;
                handler
                    .compensate(&step.id, resolve(input, &*ctx))
                    .await
                    .map(|_| ())
                    .map_err(|message| Error::rollback(&step.id, message))
            }
        }
    }
}
