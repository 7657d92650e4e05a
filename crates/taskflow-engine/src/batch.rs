//! Tool batcher: runs a set of tool-calling steps with a concurrency
//! ceiling, a per-call deadline and per-call retries.
//!
//! Calls are leveled by their dependencies on each other (dependencies
//! outside the batch are ignored). Each level runs under a shared semaphore;
//! outputs of earlier levels are visible to later ones through an
//! [`Overlay`].

use crate::checks::validate_rules;
use crate::config::BatchConfig;
use crate::resolve::{resolve, Overlay, Scope};
use crate::scheduler::level_indices;
use futures::future::join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskflow_core::{Action, Param, Step, StepError, StepId, StepResult};
use taskflow_tools::ToolRegistry;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// A tool-calling step, borrowed from its plan.
pub struct BatchCall<'a> {
    pub step: &'a Step,
    pub tool: &'a str,
    pub parameters: &'a Param,
}

impl<'a> BatchCall<'a> {
    pub fn from_step(step: &'a Step) -> Option<Self> {
        match &step.action {
            Action::ToolCall { tool, parameters } => Some(Self {
                step,
                tool: tool.as_str(),
                parameters,
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchExecutionResult {
    pub step_id: StepId,
    pub success: bool,
    pub result: Value,
    pub error: Option<StepError>,
    pub duration: Duration,
    pub retries: u32,
    /// Not launched: a dependency failed or the batch aborted.
    pub skipped: bool,
}

impl BatchExecutionResult {
    fn skipped(step_id: &str, reason: String) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: false,
            result: Value::Null,
            error: Some(StepError::Skipped(reason)),
            duration: Duration::ZERO,
            retries: 0,
            skipped: true,
        }
    }

    pub fn into_step_result(self) -> StepResult {
        let ms = self.duration.as_millis() as u64;
        if self.success {
            return StepResult::success(self.step_id, self.result, ms, self.retries);
        }
        match self.error {
            Some(StepError::Skipped(reason)) if self.skipped => StepResult::skipped(self.step_id, reason),
            Some(error) => StepResult::failure(self.step_id, &error, ms, self.retries),
            None => StepResult::failure(self.step_id, &StepError::execution("unknown failure"), ms, self.retries),
        }
    }
}

pub struct ToolBatcher {
    tools: Arc<ToolRegistry>,
    config: BatchConfig,
}

impl ToolBatcher {
    pub fn new(tools: Arc<ToolRegistry>, config: BatchConfig) -> Self {
        Self { tools, config }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// One attempt of one tool call, raced against the call deadline.
    /// This is also the path for tool calls made outside a batch.
    pub async fn call_tool(&self, name: &str, params: Value) -> Result<Value, StepError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| StepError::ToolNotFound(name.to_string()))?;

        debug!(tool = name, "tool call");
        match tokio::time::timeout(self.config.call_timeout(), tool.execute(params)).await {
            Ok(result) => result.into_output().map_err(|message| StepError::tool(name, message)),
            Err(_) => Err(StepError::Timeout(self.config.call_timeout_ms)),
        }
    }

    /// Run every tool-calling step in `steps`; other steps are ignored.
    /// Results come back in the order of `steps`.
    pub async fn execute_batch(&self, steps: &[&Step], scope: &dyn Scope) -> Vec<BatchExecutionResult> {
        let calls: Vec<BatchCall<'_>> = steps.iter().filter_map(|s| BatchCall::from_step(s)).collect();
        if calls.is_empty() {
            return Vec::new();
        }

        let index: HashMap<&str, usize> = calls
            .iter()
            .enumerate()
            .map(|(i, c)| (c.step.id.as_str(), i))
            .collect();
        let deps: Vec<Vec<usize>> = calls
            .iter()
            .map(|c| {
                c.step
                    .dependencies
                    .iter()
                    .filter_map(|d| index.get(d.as_str()).copied())
                    .collect()
            })
            .collect();

        let levels = match level_indices(&deps) {
            Ok(levels) => levels,
            Err(stuck) => {
                warn!(calls = stuck.len(), "dependency cycle inside tool batch");
                return calls
                    .iter()
                    .map(|c| BatchExecutionResult::skipped(&c.step.id, "dependency cycle in batch".into()))
                    .collect();
            }
        };

        info!(
            calls = calls.len(),
            levels = levels.len(),
            max_concurrency = self.config.max_concurrency,
            "executing tool batch"
        );

        let semaphore = Semaphore::new(self.config.max_concurrency.max(1));
        let mut local: HashMap<StepId, Value> = HashMap::new();
        let mut failed: HashSet<StepId> = HashSet::new();
        let mut results: HashMap<usize, BatchExecutionResult> = HashMap::with_capacity(calls.len());
        let mut aborted = false;

        for level in levels {
            let mut launch = Vec::with_capacity(level.len());
            for i in level {
                let call = &calls[i];
                if aborted {
                    results.insert(i, BatchExecutionResult::skipped(&call.step.id, "batch aborted".into()));
                    continue;
                }
                match call.step.dependencies.iter().find(|d| failed.contains(*d)) {
                    Some(dep) => {
                        failed.insert(call.step.id.clone());
                        results.insert(
                            i,
                            BatchExecutionResult::skipped(&call.step.id, format!("dependency {} failed", dep)),
                        );
                    }
                    None => launch.push(i),
                }
            }

            let outcomes = {
                let overlay = Overlay::new(scope, &local);
                join_all(
                    launch
                        .iter()
                        .map(|&i| self.run_call(&calls[i], &overlay, &semaphore)),
                )
                .await
            };

            for (i, outcome) in launch.into_iter().zip(outcomes) {
                if outcome.success {
                    local.insert(outcome.step_id.clone(), outcome.result.clone());
                } else {
                    failed.insert(outcome.step_id.clone());
                    if !self.config.continue_on_error {
                        aborted = true;
                    }
                }
                results.insert(i, outcome);
            }
        }

        (0..calls.len()).filter_map(|i| results.remove(&i)).collect()
    }

    /// One call with validation and retries. The semaphore permit is held
    /// for the attempt only, not during backoff.
    async fn run_call(
        &self,
        call: &BatchCall<'_>,
        scope: &dyn Scope,
        semaphore: &Semaphore,
    ) -> BatchExecutionResult {
        let started = Instant::now();
        let step = call.step;
        let mut attempt = 0;

        loop {
            let outcome = match semaphore.acquire().await {
                Ok(_permit) => self.attempt_call(call, scope).await,
                Err(_) => Err(StepError::execution("batch semaphore closed")),
            };

            match outcome {
                Ok(result) => {
                    return BatchExecutionResult {
                        step_id: step.id.clone(),
                        success: true,
                        result,
                        error: None,
                        duration: started.elapsed(),
                        retries: attempt,
                        skipped: false,
                    }
                }
                Err(e) if e.is_retryable() && attempt < step.max_retries => {
                    let delay = self.config.backoff.delay(attempt);
                    debug!(step = %step.id, attempt, delay_ms = delay.as_millis() as u64, "retrying tool call: {}", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(step = %step.id, tool = call.tool, retries = attempt, "tool call failed: {}", e);
                    return BatchExecutionResult {
                        step_id: step.id.clone(),
                        success: false,
                        result: Value::Null,
                        error: Some(e),
                        duration: started.elapsed(),
                        retries: attempt,
                        skipped: false,
                    };
                }
            }
        }
    }

    async fn attempt_call(&self, call: &BatchCall<'_>, scope: &dyn Scope) -> Result<Value, StepError> {
        let params = resolve(call.parameters, scope);
        validate_rules(&call.step.pre_validation, &params, scope).map_err(StepError::Precondition)?;
        let output = self.call_tool(call.tool, params).await?;
        validate_rules(&call.step.post_validation, &output, scope).map_err(StepError::Postcondition)?;
        Ok(output)
    }
}
