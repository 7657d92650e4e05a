//! Run controller: drives a plan group by group and owns the run lifecycle.
//!
//! `NotStarted -> Running -> {Completed | Failed | RolledBack}`, with
//! `Running <-> Paused`. Pause and cancel are cooperative: they take effect
//! at the next group boundary, never in the middle of a group.

use crate::analyzer::{Analyzer, StructuralAnalyzer};
use crate::batch::ToolBatcher;
use crate::checkpoint::{CompensationHandler, RollbackManager};
use crate::config::{EngineConfig, StrategyKind};
use crate::context::ExecutionContext;
use crate::functions::FunctionRegistry;
use crate::memory::{InMemoryStore, MemoryRecord, MemoryStore};
use crate::registry::{ParkedRun, RunHandle, RunRegistry};
use crate::runner::StepRunner;
use crate::scheduler;
use crate::strategy::{BatchedStrategy, GroupStrategy, SequentialStrategy};
use crate::validate::validate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use taskflow_core::{
    AlternativePlan, Error, ExecutionPlan, Result, RunId, RunStatus, StepId, Task, TaskMetadata,
    TaskResult, ValidationError,
};
use taskflow_tools::ToolRegistry;
use tracing::{debug, info, warn};

pub struct EngineBuilder {
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
    memory: Option<Arc<dyn MemoryStore>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    functions: FunctionRegistry,
    handlers: HashMap<String, Arc<dyn CompensationHandler>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Add a transform function next to the builtins.
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.register(name, f);
        self
    }

    /// Register a compensation handler for `handler` rollback actions.
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn CompensationHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn build(self) -> Engine {
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn MemoryStore>);
        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(StructuralAnalyzer) as Arc<dyn Analyzer>);
        let batcher = Arc::new(ToolBatcher::new(self.tools, self.config.batch.clone()));
        let runner = Arc::new(StepRunner::new(
            batcher,
            self.functions,
            analyzer,
            memory.clone(),
            self.config.retry.clone(),
        ));

        let strategy: Arc<dyn GroupStrategy> = match self.config.engine.strategy {
            StrategyKind::Batched => Arc::new(BatchedStrategy::new(runner.clone())),
            StrategyKind::Sequential => Arc::new(SequentialStrategy::new(runner.clone())),
        };

        Engine {
            rollback: RollbackManager::new(runner.clone(), self.handlers),
            sequential: SequentialStrategy::new(runner),
            strategy,
            memory,
            runs: RunRegistry::new(),
            config: self.config,
        }
    }
}

/// The plan execution engine.
pub struct Engine {
    config: EngineConfig,
    strategy: Arc<dyn GroupStrategy>,
    /// For plans that are not parallelizable.
    sequential: SequentialStrategy,
    rollback: RollbackManager,
    memory: Arc<dyn MemoryStore>,
    runs: RunRegistry,
}

impl Engine {
    pub fn builder(tools: impl Into<Arc<ToolRegistry>>) -> EngineBuilder {
        EngineBuilder {
            tools: tools.into(),
            config: EngineConfig::default(),
            memory: None,
            analyzer: None,
            functions: FunctionRegistry::with_builtins(),
            handlers: HashMap::new(),
        }
    }

    pub fn new(tools: impl Into<Arc<ToolRegistry>>) -> Self {
        Self::builder(tools).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    /// Status of an active or finished run.
    pub async fn status(&self, id: &RunId) -> Result<RunStatus> {
        match self.runs.get(id) {
            Ok(handle) => Ok(handle.status().await),
            Err(e) => self.runs.finished_status(id).ok_or(e),
        }
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        self.runs.list_active()
    }

    /// Validate and run `plan` for `task`.
    ///
    /// Fails only if the task's run id was already used. Anything that goes
    /// wrong inside the run, a rejected plan included, is reported through
    /// the returned [`TaskResult`].
    pub async fn execute(&self, task: &Task, plan: ExecutionPlan) -> Result<TaskResult> {
        let run_id = task.run_id();
        let handle = self.runs.insert(run_id.clone(), &task.id)?;
        info!(run_id = %run_id, plan = %plan.id, steps = plan.steps.len(), "run started");

        let groups = match self.prepare(&plan) {
            Ok(groups) => groups,
            Err(e) => {
                warn!(run_id = %run_id, "plan rejected: {}", e);
                {
                    let mut state = handle.state.lock().await;
                    if state.status == RunStatus::NotStarted {
                        state.status = RunStatus::Failed;
                    }
                }
                self.runs.finish(&run_id, RunStatus::Failed);
                return Ok(TaskResult::rejected(
                    &task.id,
                    Error::from(e).to_string(),
                    plan.steps.len(),
                ));
            }
        };
        debug!(run_id = %run_id, groups = ?groups, "schedule");

        {
            let mut state = handle.state.lock().await;
            if state.status == RunStatus::NotStarted {
                state.status = RunStatus::Running;
            }
        }

        let run = ParkedRun {
            task: task.clone(),
            ctx: ExecutionContext::new(task, &plan),
            plan: Arc::new(plan),
            groups,
            fallback: None,
        };
        Ok(self.drive(handle, run).await)
    }

    /// Ask a running run to stop at its next group boundary.
    pub async fn pause(&self, id: &RunId) -> Result<()> {
        let handle = self.runs.get(id)?;
        let mut state = handle.state.lock().await;
        if state.status != RunStatus::Running {
            return Err(Error::invalid_transition(id.as_str(), state.status, RunStatus::Paused));
        }
        state.status = RunStatus::Paused;
        info!(run_id = %id, "pause requested");
        Ok(())
    }

    /// Continue a paused run.
    ///
    /// If the run already stopped at a boundary, this drives it to its next
    /// stop and returns that result. If the pause had not reached a boundary
    /// yet, the pause is withdrawn and the original `execute` call keeps
    /// going; the returned result is only an in-flight snapshot.
    pub async fn resume(&self, id: &RunId) -> Result<TaskResult> {
        let handle = self.runs.get(id)?;
        let parked = {
            let mut state = handle.state.lock().await;
            if state.status != RunStatus::Paused {
                return Err(Error::invalid_transition(id.as_str(), state.status, RunStatus::Running));
            }
            state.status = RunStatus::Running;
            state.parked.take()
        };

        match parked {
            Some(mut run) => {
                info!(run_id = %id, next_group = run.ctx.next_group, "run resumed");
                run.ctx.state.status = RunStatus::Running;
                Ok(self.drive(handle, run).await)
            }
            None => {
                info!(run_id = %id, "pause withdrawn before reaching a group boundary");
                let progress = handle.state.lock().await.progress.clone();
                Ok(TaskResult {
                    task_id: handle.task_id.clone(),
                    success: false,
                    status: RunStatus::Running,
                    output: Value::Null,
                    error: None,
                    metadata: progress,
                })
            }
        }
    }

    /// Stop a running or paused run. The run ends `Failed`; a step already
    /// in flight finishes on its own.
    pub async fn cancel(&self, id: &RunId) -> Result<()> {
        let handle = self.runs.get(id)?;
        let mut state = handle.state.lock().await;
        if !state.status.can_transition_to(RunStatus::Failed) {
            return Err(Error::invalid_transition(id.as_str(), state.status, RunStatus::Failed));
        }
        state.status = RunStatus::Failed;
        let parked = state.parked.take();
        handle.cancel.cancel();
        self.runs.finish(id, RunStatus::Failed);
        info!(run_id = %id, parked = parked.is_some(), "run cancelled");
        Ok(())
    }

    fn prepare(&self, plan: &ExecutionPlan) -> std::result::Result<Vec<Vec<StepId>>, ValidationError> {
        validate(plan, self.config.engine.strict_references)?;
        scheduler::group(&plan.steps)
    }

    /// Run groups until the run ends or parks.
    async fn drive(&self, handle: Arc<RunHandle>, mut run: ParkedRun) -> TaskResult {
        loop {
            {
                let mut state = handle.state.lock().await;
                if handle.cancel.is_cancelled() {
                    return cancelled(run);
                }
                state.progress = progress(&run);
                if state.status == RunStatus::Paused {
                    info!(run_id = %handle.id, next_group = run.ctx.next_group, "run paused");
                    run.ctx.state.status = RunStatus::Paused;
                    let result = snapshot(&run, RunStatus::Paused, None);
                    state.parked = Some(run);
                    return result;
                }
            }

            if run.ctx.next_group >= run.groups.len() {
                return self.conclude(&handle, run, RunStatus::Completed, None).await;
            }

            let Err(error) = self.run_group(&mut run).await else {
                continue;
            };

            let mut status = RunStatus::Failed;
            let plan = run.plan.clone();
            // Restoring a checkpoint during rollback can rewrite this list.
            let failed = run.ctx.state.failed.clone();
            if plan.rollback.enabled {
                let report = self.rollback.rollback(&plan, &mut run.ctx).await;
                info!(
                    run_id = %handle.id,
                    rolled_back = report.rolled_back.len(),
                    errors = report.errors.len(),
                    "rollback finished"
                );
                status = RunStatus::RolledBack;
            }

            if run.fallback.is_none() {
                if let Some(alternative) = plan.alternative_for(&failed) {
                    match self.fallback_run(&run, alternative) {
                        Ok(next) => {
                            info!(
                                run_id = %handle.id,
                                alternative = %alternative.id,
                                "primary plan failed, running alternative"
                            );
                            run = next;
                            continue;
                        }
                        Err(e) => {
                            warn!(run_id = %handle.id, alternative = %alternative.id, "alternative plan rejected: {}", e)
                        }
                    }
                }
            }

            return self.conclude(&handle, run, status, Some(error)).await;
        }
    }

    /// Run the next group and merge its results. `Err` carries the message
    /// of the first fatal failure.
    async fn run_group(&self, run: &mut ParkedRun) -> std::result::Result<(), String> {
        let plan = run.plan.clone();
        let index = run.ctx.next_group;
        run.ctx.next_group += 1;

        let mut ready = Vec::with_capacity(run.groups[index].len());
        for id in &run.groups[index] {
            let Some(step) = plan.step(id) else { continue };
            match step.dependencies.iter().find(|d| !run.ctx.state.is_completed(d)) {
                Some(dep) => {
                    debug!(run_id = %run.ctx.run_id, step = %id, dependency = %dep, "skipping step");
                    run.ctx.skip(id, format!("dependency {} did not complete", dep));
                }
                None => ready.push(step),
            }
        }
        if ready.is_empty() {
            return Ok(());
        }

        let strategy: &dyn GroupStrategy = if plan.parallelizable {
            self.strategy.as_ref()
        } else {
            &self.sequential
        };
        info!(
            run_id = %run.ctx.run_id,
            group = index,
            steps = ready.len(),
            strategy = strategy.name(),
            "executing group"
        );

        let mut results = strategy.execute_group(&ready, &run.ctx).await;
        results.sort_by_key(|r| r.finished_at);

        let mut fatal = None;
        for result in results {
            let Some(step) = plan.step(&result.step_id) else { continue };
            let failed = !result.success && !result.skipped;
            let succeeded = result.success;
            let error = result.error.clone().unwrap_or_default();
            if !run.ctx.record(result, step.artifact.as_deref()) {
                continue;
            }

            if succeeded && plan.wants_checkpoint(step) {
                run.ctx.take_checkpoint(&step.id);
            } else if failed && step.failure_is_fatal() {
                if fatal.is_none() {
                    fatal = Some(format!("step {} failed: {}", step.id, error));
                }
            } else if failed {
                warn!(run_id = %run.ctx.run_id, step = %step.id, "step failed, continuing: {}", error);
            }
        }

        match fatal {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn fallback_run(
        &self,
        run: &ParkedRun,
        alternative: &AlternativePlan,
    ) -> std::result::Result<ParkedRun, ValidationError> {
        let mut plan = ExecutionPlan::new(&alternative.id, &run.plan.task_id, alternative.steps.clone());
        plan.parallelizable = run.plan.parallelizable;
        plan.rollback = run.plan.rollback.clone();
        let groups = self.prepare(&plan)?;

        Ok(ParkedRun {
            task: run.task.clone(),
            ctx: ExecutionContext::new(&run.task, &plan),
            plan: Arc::new(plan),
            groups,
            fallback: Some(alternative.id.clone()),
        })
    }

    async fn conclude(
        &self,
        handle: &RunHandle,
        mut run: ParkedRun,
        status: RunStatus,
        error: Option<String>,
    ) -> TaskResult {
        {
            let mut state = handle.state.lock().await;
            if handle.cancel.is_cancelled() {
                return cancelled(run);
            }
            state.status = status;
        }
        self.runs.finish(&handle.id, status);
        run.ctx.state.status = status;

        let result = snapshot(&run, status, error);
        info!(
            run_id = %handle.id,
            plan = %run.ctx.plan_id,
            status = %status,
            completed = result.metadata.completed_steps.len(),
            failed = result.metadata.failed_steps.len(),
            skipped = result.metadata.skipped_steps.len(),
            duration_ms = result.metadata.duration_ms,
            "run finished"
        );

        if self.config.engine.store_summary {
            self.store_summary(&result).await;
        }
        result
    }

    async fn store_summary(&self, result: &TaskResult) {
        let record = MemoryRecord::new(
            "execution_summary",
            json!({
                "task_id": result.task_id,
                "success": result.success,
                "duration_ms": result.metadata.duration_ms,
                "step_count": result.metadata.step_count,
            }),
            Some(result.task_id.clone()),
        );
        if let Err(e) = self.memory.store(record).await {
            warn!(task_id = %result.task_id, "failed to store execution summary: {}", e);
        }
    }
}

fn progress(run: &ParkedRun) -> TaskMetadata {
    let mut metadata = run.ctx.metadata();
    metadata.fallback = run.fallback.clone();
    metadata
}

fn snapshot(run: &ParkedRun, status: RunStatus, error: Option<String>) -> TaskResult {
    let mut result = run.ctx.to_task_result(status, error);
    result.metadata.fallback = run.fallback.clone();
    result
}

fn cancelled(run: ParkedRun) -> TaskResult {
    info!(run_id = %run.ctx.run_id, next_group = run.ctx.next_group, "run stopped by cancellation");
    snapshot(&run, RunStatus::Failed, Some("run cancelled".to_string()))
}
