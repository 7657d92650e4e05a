//! Step runner: executes one step's action with pre/post validation and
//! retries.

use crate::analyzer::Analyzer;
use crate::backoff::BackoffPolicy;
use crate::batch::ToolBatcher;
use crate::checks::{evaluate, validate_rules};
use crate::context::ExecutionContext;
use crate::functions::FunctionRegistry;
use crate::memory::{MemoryRecord, MemoryStore};
use crate::resolve::{resolve, resolve_reference};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use taskflow_core::{is_truthy, Action, Param, Step, StepError, StepResult};
use tracing::{debug, warn};

type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>>;

pub struct StepRunner {
    batcher: Arc<ToolBatcher>,
    functions: FunctionRegistry,
    analyzer: Arc<dyn Analyzer>,
    memory: Arc<dyn MemoryStore>,
    retry: BackoffPolicy,
}

impl StepRunner {
    pub fn new(
        batcher: Arc<ToolBatcher>,
        functions: FunctionRegistry,
        analyzer: Arc<dyn Analyzer>,
        memory: Arc<dyn MemoryStore>,
        retry: BackoffPolicy,
    ) -> Self {
        Self {
            batcher,
            functions,
            analyzer,
            memory,
            retry,
        }
    }

    pub fn batcher(&self) -> &ToolBatcher {
        &self.batcher
    }

    /// Run `step` to a final outcome.
    ///
    /// A failed pre-condition ends the step at once; any other failure is
    /// retried up to `max_retries` times with the retry backoff.
    pub async fn run_step(&self, step: &Step, ctx: &ExecutionContext) -> StepResult {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            match self.attempt(step, ctx).await {
                Ok(output) => {
                    debug!(step = %step.id, retries = attempt, "step completed");
                    return StepResult::success(&step.id, output, elapsed_ms(started), attempt);
                }
                Err(e) if e.is_retryable() && attempt < step.max_retries => {
                    let delay = self.retry.delay(attempt);
                    debug!(
                        step = %step.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying step: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(step = %step.id, kind = step.action.kind(), retries = attempt, "step failed: {}", e);
                    return StepResult::failure(&step.id, &e, elapsed_ms(started), attempt);
                }
            }
        }
    }

    async fn attempt(&self, step: &Step, ctx: &ExecutionContext) -> Result<Value, StepError> {
        let input = self.primary_input(&step.action, ctx);
        validate_rules(&step.pre_validation, &input, ctx).map_err(StepError::Precondition)?;
        let output = self.dispatch(&step.action, ctx).await?;
        validate_rules(&step.post_validation, &output, ctx).map_err(StepError::Postcondition)?;
        Ok(output)
    }

    /// What an unqualified pre-condition inspects.
    fn primary_input(&self, action: &Action, ctx: &ExecutionContext) -> Value {
        match action {
            Action::ToolCall { parameters, .. } => resolve(parameters, ctx),
            Action::Transform { input, .. } | Action::Analyze { input, .. } => resolve(input, ctx),
            Action::Store { data, .. } => resolve(data, ctx),
            Action::Recall { query, .. } => resolve(query, ctx),
            Action::Decide { .. }
            | Action::Compose { .. }
            | Action::Parallel { .. }
            | Action::Sequential { .. }
            | Action::Conditional { .. } => Value::Null,
        }
    }

    /// Run one action. Composite actions recurse.
    pub fn dispatch<'a>(&'a self, action: &'a Action, ctx: &'a ExecutionContext) -> ActionFuture<'a> {
        Box::pin(async move {
            match action {
                Action::ToolCall { tool, parameters } => {
                    self.batcher.call_tool(tool, resolve(parameters, ctx)).await
                }
                Action::Transform { function, input } => {
                    self.functions.call(function, resolve(input, ctx))
                }
                Action::Analyze { analysis, input } => self
                    .analyzer
                    .analyze(analysis, &resolve(input, ctx))
                    .await
                    .map_err(StepError::Execution),
                Action::Decide { criteria, default } => Ok(criteria
                    .iter()
                    .find(|c| evaluate(&c.check, &resolve(&c.subject, ctx)))
                    .map_or_else(|| default.clone(), |c| c.outcome.clone())),
                Action::Store { data, memory_type } => {
                    let record = MemoryRecord::new(
                        memory_type.as_str(),
                        resolve(data, ctx),
                        Some(ctx.task_id.clone()),
                    );
                    let id = record.id.clone();
                    self.memory.store(record).await?;
                    Ok(json!({ "id": id, "memory_type": memory_type }))
                }
                Action::Recall { query, limit } => {
                    let query = match resolve(query, ctx) {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    let records = self.memory.recall(&query, *limit).await?;
                    serde_json::to_value(records).map_err(|e| StepError::Memory(e.to_string()))
                }
                Action::Compose { sources, template } => Ok(compose(sources, template.as_deref(), ctx)),
                Action::Parallel { actions } => {
                    let outputs = join_all(actions.iter().map(|a| self.dispatch(a, ctx))).await;
                    outputs
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Array)
                }
                Action::Sequential { actions } => {
                    let mut outputs = Vec::with_capacity(actions.len());
                    for a in actions {
                        outputs.push(self.dispatch(a, ctx).await?);
                    }
                    Ok(Value::Array(outputs))
                }
                Action::Conditional {
                    predicate,
                    then,
                    otherwise,
                } => {
                    if is_truthy(&resolve_reference(predicate, ctx)) {
                        self.dispatch(then, ctx).await
                    } else {
                        match otherwise {
                            Some(otherwise) => self.dispatch(otherwise, ctx).await,
                            None => Ok(Value::Null),
                        }
                    }
                }
            }
        })
    }
}

/// Fill `{name}` placeholders from the resolved sources: strings verbatim,
/// other values as compact JSON. Without a template, the sources themselves.
fn compose(sources: &BTreeMap<String, Param>, template: Option<&str>, ctx: &ExecutionContext) -> Value {
    let resolved: Map<String, Value> = sources
        .iter()
        .map(|(name, param)| (name.clone(), resolve(param, ctx)))
        .collect();

    let Some(template) = template else {
        return Value::Object(resolved);
    };

    Value::String(fill_template(template, &resolved))
}

/// Single pass over `template`: inserted values are never scanned again, so
/// a value containing `{name}` stays as written. Unknown placeholders are
/// kept.
fn fill_template(template: &str, values: &Map<String, Value>) -> String {
    let mut text = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let placeholder = after
            .find('}')
            .and_then(|close| values.get(&after[..close]).map(|v| (v, close)));
        match placeholder {
            Some((Value::String(s), close)) => {
                text.push_str(s);
                rest = &after[close + 1..];
            }
            Some((other, close)) => {
                text.push_str(&other.to_string());
                rest = &after[close + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    text
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
