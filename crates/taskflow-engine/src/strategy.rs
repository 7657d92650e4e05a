//! How the steps of one scheduler group are executed.

use crate::context::ExecutionContext;
use crate::runner::StepRunner;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use taskflow_core::{Step, StepResult};

#[async_trait]
pub trait GroupStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Run `steps` (all ready, mutually independent) and report one result
    /// per step.
    async fn execute_group(&self, steps: &[&Step], ctx: &ExecutionContext) -> Vec<StepResult>;
}

/// One step at a time, in plan order.
pub struct SequentialStrategy {
    runner: Arc<StepRunner>,
}

impl SequentialStrategy {
    pub fn new(runner: Arc<StepRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl GroupStrategy for SequentialStrategy {
    fn name(&self) -> &str {
        "sequential"
    }

    async fn execute_group(&self, steps: &[&Step], ctx: &ExecutionContext) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len());
        for step in steps {
            results.push(self.runner.run_step(step, ctx).await);
        }
        results
    }
}

/// Tool calls go through the batcher; the other steps run concurrently
/// alongside the batch.
pub struct BatchedStrategy {
    runner: Arc<StepRunner>,
}

impl BatchedStrategy {
    pub fn new(runner: Arc<StepRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl GroupStrategy for BatchedStrategy {
    fn name(&self) -> &str {
        "batched"
    }

    async fn execute_group(&self, steps: &[&Step], ctx: &ExecutionContext) -> Vec<StepResult> {
        let (tools, others): (Vec<&Step>, Vec<&Step>) =
            steps.iter().copied().partition(|s| s.action.is_tool_call());

        let (batch, rest) = tokio::join!(
            self.runner.batcher().execute_batch(&tools, ctx),
            join_all(others.iter().map(|s| self.runner.run_step(s, ctx))),
        );

        batch
            .into_iter()
            .map(|r| r.into_step_result())
            .chain(rest)
            .collect()
    }
}
