//! Per-run execution context: results, artifacts, checkpoints and progress.
//!
//! Owned by the run's driving loop. Steps of a group only read it (through
//! [`Scope`]); their results are merged after the group completes. Results,
//! artifacts and checkpoints are write-once per key.

use crate::resolve::Scope;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Instant;
use taskflow_core::{
    Checkpoint, ExecutionPlan, ExecutionState, RunId, RunStatus, StepId, StepResult, Task,
    TaskMetadata, TaskResult,
};
use tracing::{debug, warn};

pub struct ExecutionContext {
    pub run_id: RunId,
    pub plan_id: String,
    pub task_id: String,
    pub state: ExecutionState,
    /// Index of the next scheduler group to run.
    pub next_group: usize,
    step_count: usize,
    results: HashMap<StepId, StepResult>,
    artifacts: HashMap<String, Value>,
    checkpoints: HashMap<StepId, Checkpoint>,
    checkpoint_order: Vec<StepId>,
    rolled_back: Vec<StepId>,
    started: Instant,
}

impl ExecutionContext {
    pub fn new(task: &Task, plan: &ExecutionPlan) -> Self {
        Self {
            run_id: task.run_id(),
            plan_id: plan.id.clone(),
            task_id: task.id.clone(),
            state: ExecutionState {
                status: RunStatus::Running,
                ..Default::default()
            },
            next_group: 0,
            step_count: plan.steps.len(),
            results: HashMap::new(),
            artifacts: HashMap::new(),
            checkpoints: HashMap::new(),
            checkpoint_order: Vec::new(),
            rolled_back: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn result(&self, step: &str) -> Option<&StepResult> {
        self.results.get(step)
    }

    pub fn artifacts(&self) -> &HashMap<String, Value> {
        &self.artifacts
    }

    pub fn checkpoint(&self, step: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(step)
    }

    pub fn rolled_back(&self) -> &[StepId] {
        &self.rolled_back
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Merge one step's outcome. A successful output is also published as
    /// `artifact` when given. Returns false if the step already has a result.
    pub fn record(&mut self, result: StepResult, artifact: Option<&str>) -> bool {
        if self.results.contains_key(&result.step_id) {
            warn!(run_id = %self.run_id, step = %result.step_id, "result already recorded, ignoring");
            return false;
        }

        let id = result.step_id.clone();
        if result.skipped {
            self.state.skipped.push(id.clone());
        } else if result.success {
            if let Some(name) = artifact {
                self.publish(name, result.output.clone());
            }
            self.state.completed.push(id.clone());
        } else {
            self.state.failed.push(id.clone());
        }
        self.state.current_step = Some(id.clone());
        self.results.insert(id, result);
        true
    }

    /// Record `step` as skipped without running it.
    pub fn skip(&mut self, step: &str, reason: impl Into<String>) -> bool {
        self.record(StepResult::skipped(step, reason), None)
    }

    pub fn publish(&mut self, name: &str, value: Value) -> bool {
        if self.artifacts.contains_key(name) {
            warn!(run_id = %self.run_id, artifact = name, "artifact already published, ignoring");
            return false;
        }
        self.artifacts.insert(name.to_string(), value);
        true
    }

    /// Snapshot the current state under `step`. Write-once.
    pub fn take_checkpoint(&mut self, step: &str) -> bool {
        if self.checkpoints.contains_key(step) {
            return false;
        }
        debug!(run_id = %self.run_id, step, "checkpoint");
        self.checkpoints
            .insert(step.to_string(), Checkpoint::capture(step, &self.state));
        self.checkpoint_order.push(step.to_string());
        true
    }

    /// Put progress back to the checkpoint taken after `step`. The run
    /// status is left alone, and failures recorded since the checkpoint stay
    /// in `failed`.
    pub fn restore(&mut self, step: &str) -> bool {
        let Some(checkpoint) = self.checkpoints.get(step) else {
            return false;
        };
        let status = self.state.status;
        let failed = std::mem::take(&mut self.state.failed);
        self.state = checkpoint.state.clone();
        self.state.status = status;
        for id in failed {
            if !self.state.is_failed(&id) {
                self.state.failed.push(id);
            }
        }
        true
    }

    pub fn mark_rolled_back(&mut self, step: &str) {
        self.rolled_back.push(step.to_string());
    }

    /// Successful outputs keyed by step id.
    pub fn output(&self) -> Value {
        Value::Object(
            self.results
                .values()
                .filter(|r| r.success)
                .map(|r| (r.step_id.clone(), r.output.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Progress so far, without outputs.
    pub fn metadata(&self) -> TaskMetadata {
        TaskMetadata {
            completed_steps: self.state.completed.clone(),
            failed_steps: self.state.failed.clone(),
            skipped_steps: self.state.skipped.clone(),
            rolled_back_steps: self.rolled_back.clone(),
            checkpoints: self.checkpoint_order.clone(),
            duration_ms: self.elapsed_ms(),
            step_count: self.step_count,
            fallback: None,
        }
    }

    pub fn to_task_result(&self, status: RunStatus, error: Option<String>) -> TaskResult {
        TaskResult {
            task_id: self.task_id.clone(),
            success: status == RunStatus::Completed,
            status,
            output: self.output(),
            error,
            metadata: self.metadata(),
        }
    }
}

impl Scope for ExecutionContext {
    fn result_output(&self, step: &str) -> Option<&Value> {
        self.results.get(step).filter(|r| r.success).map(|r| &r.output)
    }

    fn artifact(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskflow_core::{Action, Param, Step, StepError};

    fn ctx() -> ExecutionContext {
        let plan = ExecutionPlan::new(
            "p",
            "t",
            vec![Step::new("a", Action::transform("identity", Param::default()))],
        );
        ExecutionContext::new(&Task::new("t", ""), &plan)
    }

    #[test]
    fn results_are_write_once() {
        let mut ctx = ctx();
        assert!(ctx.record(StepResult::success("a", json!(1), 0, 0), Some("x")));
        assert!(!ctx.record(StepResult::success("a", json!(2), 0, 0), Some("x")));
        assert_eq!(ctx.result_output("a"), Some(&json!(1)));
        assert_eq!(ctx.artifact("x"), Some(&json!(1)));
        assert_eq!(ctx.state.completed, vec!["a"]);
    }

    #[test]
    fn failed_output_is_not_visible() {
        let mut ctx = ctx();
        ctx.record(StepResult::failure("a", &StepError::execution("x"), 0, 0), None);
        assert_eq!(ctx.result_output("a"), None);
        assert_eq!(ctx.state.failed, vec!["a"]);
        assert_eq!(ctx.output(), json!({}));
    }

    #[test]
    fn restore_keeps_status_and_failures() {
        let mut ctx = ctx();
        ctx.record(StepResult::success("a", json!(1), 0, 0), None);
        assert!(ctx.take_checkpoint("a"));
        ctx.state.failed.push("b".into());
        ctx.state.status = RunStatus::Paused;

        ctx.state.completed.push("c".into());

        assert!(ctx.restore("a"));
        assert_eq!(ctx.state.completed, vec!["a"]);
        assert_eq!(ctx.state.failed, vec!["b"]);
        assert_eq!(ctx.state.status, RunStatus::Paused);
        assert!(!ctx.restore("zzz"));
    }
}
