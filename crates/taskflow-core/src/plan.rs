//! Plan data model: steps, actions, parameters and per-step policy.
//!
//! A plan is authored once (by a planner, or loaded from a file) and is read
//! only for the lifetime of a run. Parameters never carry "magic" strings:
//! references to earlier outputs are an explicit [`Reference`] value decided
//! at authoring time.

use crate::types::StepId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// References and parameter trees
// ---------------------------------------------------------------------------

/// A symbolic pointer into the run's results or artifacts.
///
/// Serialized as a single-key map: `{"$result": "fetch"}`,
/// `{"$artifact": "report"}` or `{"$literal": <any value>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    /// The output of a completed step.
    #[serde(rename = "$result")]
    Result(StepId),
    /// A named artifact published by an earlier step.
    #[serde(rename = "$artifact")]
    Artifact(String),
    /// A value taken as-is, even if it looks like a reference.
    #[serde(rename = "$literal")]
    Literal(Value),
}

/// An action input: plain JSON with references embedded at any depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Ref(Reference),
    List(Vec<Param>),
    Object(BTreeMap<String, Param>),
    Value(Value),
}

impl Default for Param {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Reference> for Param {
    fn from(reference: Reference) -> Self {
        Self::Ref(reference)
    }
}

impl Param {
    pub fn result(step: impl Into<StepId>) -> Self {
        Self::Ref(Reference::Result(step.into()))
    }

    pub fn artifact(name: impl Into<String>) -> Self {
        Self::Ref(Reference::Artifact(name.into()))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Param)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Call `f` for every reference in this tree.
    pub fn visit_references<'a>(&'a self, f: &mut dyn FnMut(&'a Reference)) {
        match self {
            Self::Ref(r) => f(r),
            Self::List(items) => items.iter().for_each(|p| p.visit_references(f)),
            Self::Object(fields) => fields.values().for_each(|p| p.visit_references(f)),
            Self::Value(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Validation rules
// ---------------------------------------------------------------------------

/// A predicate over a JSON value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    NotNull,
    Truthy,
    Equals(Value),
    NotEquals(Value),
    Contains(String),
    Matches(String),
    MinLength(usize),
    HasField(String),
}

/// A pre- or post-condition on a step.
///
/// Without a subject, a pre-condition inspects the resolved action input and a
/// post-condition inspects the action output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Param>,
    pub check: Check,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationRule {
    pub fn new(check: Check) -> Self {
        Self {
            subject: None,
            check,
            message: None,
        }
    }

    pub fn on(mut self, subject: Param) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One branch of a `decide` action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub subject: Param,
    pub check: Check,
    pub outcome: Value,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What a step does. Closed: every handler matches exhaustively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ToolCall {
        tool: String,
        #[serde(default)]
        parameters: Param,
    },
    Transform {
        function: String,
        #[serde(default)]
        input: Param,
    },
    Analyze {
        analysis: String,
        #[serde(default)]
        input: Param,
    },
    Decide {
        #[serde(default)]
        criteria: Vec<Criterion>,
        #[serde(default)]
        default: Value,
    },
    Store {
        data: Param,
        #[serde(default = "default_memory_type")]
        memory_type: String,
    },
    Recall {
        query: Param,
        #[serde(default = "default_recall_limit")]
        limit: usize,
    },
    Compose {
        sources: BTreeMap<String, Param>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
    Parallel {
        actions: Vec<Action>,
    },
    Sequential {
        actions: Vec<Action>,
    },
    Conditional {
        predicate: Reference,
        then: Box<Action>,
        #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Action>>,
    },
}

fn default_memory_type() -> String {
    "fact".to_string()
}

fn default_recall_limit() -> usize {
    10
}

impl Action {
    pub fn tool(tool: impl Into<String>, parameters: Param) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            parameters,
        }
    }

    pub fn transform(function: impl Into<String>, input: Param) -> Self {
        Self::Transform {
            function: function.into(),
            input,
        }
    }

    /// Short name of the variant, as it appears in plan files.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::Transform { .. } => "transform",
            Self::Analyze { .. } => "analyze",
            Self::Decide { .. } => "decide",
            Self::Store { .. } => "store",
            Self::Recall { .. } => "recall",
            Self::Compose { .. } => "compose",
            Self::Parallel { .. } => "parallel",
            Self::Sequential { .. } => "sequential",
            Self::Conditional { .. } => "conditional",
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    /// Call `f` for every reference reachable from this action, nested
    /// actions included.
    pub fn visit_references<'a>(&'a self, f: &mut dyn FnMut(&'a Reference)) {
        match self {
            Self::ToolCall { parameters, .. } => parameters.visit_references(f),
            Self::Transform { input, .. } | Self::Analyze { input, .. } => input.visit_references(f),
            Self::Decide { criteria, .. } => {
                criteria.iter().for_each(|c| c.subject.visit_references(f))
            }
            Self::Store { data, .. } => data.visit_references(f),
            Self::Recall { query, .. } => query.visit_references(f),
            Self::Compose { sources, .. } => sources.values().for_each(|p| p.visit_references(f)),
            Self::Parallel { actions } | Self::Sequential { actions } => {
                actions.iter().for_each(|a| a.visit_references(f))
            }
            Self::Conditional {
                predicate,
                then,
                otherwise,
            } => {
                f(predicate);
                then.visit_references(f);
                if let Some(otherwise) = otherwise {
                    otherwise.visit_references(f);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

/// How to undo a completed step's effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackAction {
    /// Run a compensating tool call.
    Compensate {
        tool: String,
        #[serde(default)]
        parameters: Param,
    },
    /// Put the run state back to an earlier checkpoint.
    RestoreCheckpoint { checkpoint: StepId },
    /// Invoke a compensation handler registered with the engine.
    Handler {
        name: String,
        #[serde(default)]
        input: Param,
    },
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One node of the plan graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub action: Action,
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub checkpoint: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_validation: Vec<ValidationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_validation: Vec<ValidationRule>,
    /// Publish the successful output under this artifact name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<StepId>, action: Action) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            action,
            dependencies: Vec::new(),
            max_retries: 0,
            critical: false,
            continue_on_error: false,
            checkpoint: false,
            rollback: None,
            pre_validation: Vec::new(),
            post_validation: Vec::new(),
            artifact: None,
        }
    }

    pub fn depends_on<S: Into<StepId>>(mut self, deps: impl IntoIterator<Item = S>) -> Self {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    pub fn checkpoint(mut self) -> Self {
        self.checkpoint = true;
        self
    }

    pub fn rollback(mut self, action: RollbackAction) -> Self {
        self.rollback = Some(action);
        self
    }

    pub fn pre(mut self, rule: ValidationRule) -> Self {
        self.pre_validation.push(rule);
        self
    }

    pub fn post(mut self, rule: ValidationRule) -> Self {
        self.post_validation.push(rule);
        self
    }

    pub fn artifact(mut self, name: impl Into<String>) -> Self {
        self.artifact = Some(name.into());
        self
    }

    /// A failure of this step ends the run. Critical steps are always fatal.
    pub fn failure_is_fatal(&self) -> bool {
        self.critical || !self.continue_on_error
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Cleanup steps run after the per-step sweep, best effort.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// When an alternative plan takes over from a failed one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    AnyFailure,
    StepFailed(StepId),
}

impl Trigger {
    pub fn matches(&self, failed: &[StepId]) -> bool {
        match self {
            Self::AnyFailure => !failed.is_empty(),
            Self::StepFailed(id) => failed.iter().any(|f| f == id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlternativePlan {
    pub id: String,
    pub trigger: Trigger,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub task_id: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub parallelizable: bool,
    #[serde(default)]
    pub rollback: RollbackPolicy,
    /// Steps checkpointed in addition to their own `checkpoint` flag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkpoints: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<AlternativePlan>,
}

impl ExecutionPlan {
    pub fn new(id: impl Into<String>, task_id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            steps,
            estimated_duration_ms: 0,
            parallelizable: true,
            rollback: RollbackPolicy::default(),
            checkpoints: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback.enabled = enabled;
        self
    }

    pub fn with_alternative(mut self, alternative: AlternativePlan) -> Self {
        self.alternatives.push(alternative);
        self
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Whether a successful completion of `step` should be checkpointed.
    pub fn wants_checkpoint(&self, step: &Step) -> bool {
        step.checkpoint || step.critical || self.checkpoints.iter().any(|c| *c == step.id)
    }

    /// The highest-priority alternative whose trigger matches `failed`.
    /// Ties go to the one declared first.
    pub fn alternative_for(&self, failed: &[StepId]) -> Option<&AlternativePlan> {
        let mut best: Option<&AlternativePlan> = None;
        for alt in self.alternatives.iter().filter(|a| a.trigger.matches(failed)) {
            if best.map_or(true, |b| alt.priority > b.priority) {
                best = Some(alt);
            }
        }
        best
    }
}

/// Loose truthiness used by conditionals and the `truthy` check.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
