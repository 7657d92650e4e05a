//! Tests for the plan data model, run state and errors.

use serde_json::json;
use taskflow_core::*;

// ===========================================================================
// Plan files
// ===========================================================================

const PLAN_YAML: &str = r#"
id: p1
task_id: t1
parallelizable: true
steps:
  - id: fetch
    action:
      kind: tool_call
      tool: read_file
      parameters: { path: notes.txt }
  - id: shout
    dependencies: [fetch]
    max_retries: 2
    artifact: loud
    action:
      kind: transform
      function: uppercase
      input: { $result: fetch }
  - id: keep
    dependencies: [shout]
    action:
      kind: store
      data:
        text: { $artifact: loud }
        raw: { $literal: { $result: fetch } }
"#;

#[test]
fn test_plan_from_yaml() {
    let plan: ExecutionPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
    assert_eq!(plan.id, "p1");
    assert_eq!(plan.steps.len(), 3);
    assert!(plan.parallelizable);
    assert!(!plan.rollback.enabled);

    let shout = plan.step("shout").unwrap();
    assert_eq!(shout.dependencies, vec!["fetch".to_string()]);
    assert_eq!(shout.max_retries, 2);
    assert_eq!(shout.name, "");
    assert_eq!(shout.artifact.as_deref(), Some("loud"));
    assert_eq!(
        shout.action,
        Action::transform("uppercase", Param::result("fetch"))
    );
}

#[test]
fn test_plan_step_defaults() {
    let plan: ExecutionPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
    let fetch = plan.step("fetch").unwrap();
    assert_eq!(fetch.max_retries, 0);
    assert!(!fetch.critical);
    assert!(!fetch.continue_on_error);
    assert!(fetch.failure_is_fatal());
    assert!(fetch.rollback.is_none());
    assert!(plan.step("missing").is_none());
}

#[test]
fn test_store_defaults_and_nested_references() {
    let plan: ExecutionPlan = serde_yaml::from_str(PLAN_YAML).unwrap();
    let Action::Store { data, memory_type } = &plan.step("keep").unwrap().action else {
        panic!("expected store action");
    };
    assert_eq!(memory_type, "fact");

    let mut seen = Vec::new();
    data.visit_references(&mut |r| seen.push(r.clone()));
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&Reference::Artifact("loud".into())));
    assert!(seen.contains(&Reference::Literal(json!({"$result": "fetch"}))));
}

#[test]
fn test_plan_from_json() {
    let plan: ExecutionPlan = serde_json::from_value(json!({
        "id": "p2",
        "task_id": "t2",
        "steps": [
            {"id": "a", "action": {"kind": "recall", "query": "notes"}},
            {"id": "b", "dependencies": ["a"], "action": {"kind": "decide",
                "criteria": [{"subject": {"$result": "a"}, "check": "truthy", "outcome": "found"}],
                "default": "empty"}}
        ]
    }))
    .unwrap();

    // parallelizable is opt-in for plan files
    assert!(!plan.parallelizable);
    let Action::Recall { query, limit } = &plan.steps[0].action else {
        panic!("expected recall action");
    };
    assert_eq!(*limit, 10);
    assert_eq!(*query, Param::Value(json!("notes")));

    let Action::Decide { criteria, default } = &plan.steps[1].action else {
        panic!("expected decide action");
    };
    assert_eq!(criteria[0].subject, Param::result("a"));
    assert_eq!(criteria[0].check, Check::Truthy);
    assert_eq!(*default, json!("empty"));
}

#[test]
fn test_conditional_else_key() {
    let action: Action = serde_json::from_value(json!({
        "kind": "conditional",
        "predicate": {"$result": "check"},
        "then": {"kind": "transform", "function": "identity", "input": 1},
        "else": {"kind": "transform", "function": "identity", "input": 2}
    }))
    .unwrap();
    assert_eq!(action.kind(), "conditional");

    let Action::Conditional { otherwise, .. } = &action else {
        panic!("expected conditional");
    };
    assert!(otherwise.is_some());

    let back = serde_json::to_value(&action).unwrap();
    assert!(back.get("else").is_some());
    assert!(back.get("otherwise").is_none());
}

#[test]
fn test_unknown_action_kind_rejected() {
    let err = serde_json::from_value::<Action>(json!({"kind": "teleport"}));
    assert!(err.is_err());
}

#[test]
fn test_rollback_action_and_checks_from_yaml() {
    let step: Step = serde_yaml::from_str(
        r#"
id: write
action: { kind: tool_call, tool: write_file, parameters: { path: a.txt, content: hi } }
rollback: { kind: restore_checkpoint, checkpoint: seed }
pre_validation:
  - check: not_null
  - check: { has_field: path }
    message: need a path
post_validation:
  - subject: { $result: seed }
    check: { equals: 3 }
"#,
    )
    .unwrap();

    assert_eq!(
        step.rollback,
        Some(RollbackAction::RestoreCheckpoint {
            checkpoint: "seed".into()
        })
    );
    assert_eq!(step.pre_validation[0], ValidationRule::new(Check::NotNull));
    assert_eq!(
        step.pre_validation[1],
        ValidationRule::new(Check::HasField("path".into())).message("need a path")
    );
    assert_eq!(
        step.post_validation[0],
        ValidationRule::new(Check::Equals(json!(3))).on(Param::result("seed"))
    );
}

#[test]
fn test_param_plain_object_is_not_a_reference() {
    let p: Param = serde_json::from_value(json!({"label": "a", "n": [1, {"$result": "x"}]})).unwrap();
    let Param::Object(fields) = &p else {
        panic!("expected object, got {:?}", p);
    };
    assert_eq!(fields["label"], Param::Value(json!("a")));

    let mut seen = Vec::new();
    p.visit_references(&mut |r| seen.push(r.clone()));
    assert_eq!(seen, vec![Reference::Result("x".into())]);
}

// ===========================================================================
// Plan helpers
// ===========================================================================

fn echo(id: &str) -> Step {
    Step::new(id, Action::tool("echo", Param::default()))
}

#[test]
fn test_step_builder() {
    let s = echo("b")
        .depends_on(["a"])
        .retries(3)
        .continue_on_error()
        .checkpoint()
        .artifact("out");
    assert_eq!(s.name, "b");
    assert_eq!(s.dependencies, vec!["a".to_string()]);
    assert_eq!(s.max_retries, 3);
    assert!(!s.failure_is_fatal());
    assert!(s.clone().critical().failure_is_fatal());
}

#[test]
fn test_wants_checkpoint() {
    let mut plan = ExecutionPlan::new("p", "t", vec![echo("a"), echo("b").checkpoint(), echo("c").critical(), echo("d")]);
    plan.checkpoints.push("d".into());

    let wants: Vec<bool> = plan.steps.iter().map(|s| plan.wants_checkpoint(s)).collect();
    assert_eq!(wants, vec![false, true, true, true]);
}

fn alt(id: &str, trigger: Trigger, priority: i32) -> AlternativePlan {
    AlternativePlan {
        id: id.into(),
        trigger,
        priority,
        steps: vec![echo("x")],
    }
}

#[test]
fn test_trigger_matches() {
    let failed = vec!["a".to_string()];
    assert!(Trigger::AnyFailure.matches(&failed));
    assert!(!Trigger::AnyFailure.matches(&[]));
    assert!(Trigger::StepFailed("a".into()).matches(&failed));
    assert!(!Trigger::StepFailed("b".into()).matches(&failed));
}

#[test]
fn test_alternative_for_priority() {
    let plan = ExecutionPlan::new("p", "t", vec![echo("a")])
        .with_alternative(alt("low", Trigger::AnyFailure, 1))
        .with_alternative(alt("high", Trigger::AnyFailure, 5))
        .with_alternative(alt("other", Trigger::StepFailed("b".into()), 9));

    let failed = vec!["a".to_string()];
    assert_eq!(plan.alternative_for(&failed).unwrap().id, "high");
    assert!(plan.alternative_for(&[]).is_none());
}

#[test]
fn test_alternative_for_tie_goes_to_first() {
    let plan = ExecutionPlan::new("p", "t", vec![echo("a")])
        .with_alternative(alt("first", Trigger::StepFailed("a".into()), 2))
        .with_alternative(alt("second", Trigger::AnyFailure, 2));
    assert_eq!(plan.alternative_for(&["a".to_string()]).unwrap().id, "first");
}

#[test]
fn test_trigger_yaml() {
    let a: AlternativePlan = serde_yaml::from_str(
        "id: alt\ntrigger: { step_failed: fetch }\nsteps: []\n",
    )
    .unwrap();
    assert_eq!(a.trigger, Trigger::StepFailed("fetch".into()));
    assert_eq!(a.priority, 0);

    let b: AlternativePlan = serde_yaml::from_str("id: alt\ntrigger: any_failure\nsteps: []\n").unwrap();
    assert_eq!(b.trigger, Trigger::AnyFailure);
}

#[test]
fn test_is_truthy() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!(false)));
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(is_truthy(&json!(0.5)));
    assert!(is_truthy(&json!("no")));
    assert!(is_truthy(&json!([])));
    assert!(is_truthy(&json!({})));
}

// ===========================================================================
// Run state
// ===========================================================================

#[test]
fn test_status_transitions() {
    use RunStatus::*;
    assert!(NotStarted.can_transition_to(Running));
    assert!(Running.can_transition_to(Paused));
    assert!(Paused.can_transition_to(Running));
    assert!(Paused.can_transition_to(Failed));
    assert!(Running.can_transition_to(RolledBack));

    assert!(!Paused.can_transition_to(Completed));
    assert!(!Completed.can_transition_to(Running));
    assert!(!Failed.can_transition_to(Paused));
    assert!(!NotStarted.can_transition_to(Paused));
}

#[test]
fn test_status_terminal_and_display() {
    assert!(RunStatus::RolledBack.is_terminal());
    assert!(!RunStatus::Paused.is_terminal());
    assert_eq!(RunStatus::RolledBack.to_string(), "rolled_back");
    assert_eq!(serde_json::to_value(RunStatus::NotStarted).unwrap(), json!("not_started"));
    assert_eq!(RunStatus::default(), RunStatus::NotStarted);
}

#[test]
fn test_execution_state_queries() {
    let state = ExecutionState {
        completed: vec!["a".into()],
        failed: vec!["b".into()],
        skipped: vec!["c".into()],
        ..Default::default()
    };
    assert!(state.is_completed("a"));
    assert!(state.is_failed("b"));
    assert!(state.is_skipped("c"));
    assert!(state.is_settled("c"));
    assert!(!state.is_settled("d"));
}

#[test]
fn test_checkpoint_is_a_snapshot() {
    let mut state = ExecutionState {
        completed: vec!["a".into()],
        status: RunStatus::Running,
        ..Default::default()
    };
    let cp = Checkpoint::capture("a", &state);
    state.completed.push("b".into());

    assert_eq!(cp.step_id, "a");
    assert_eq!(cp.state.completed, vec!["a".to_string()]);
    assert_eq!(cp.state.status, RunStatus::Running);
}

// ===========================================================================
// Results and errors
// ===========================================================================

#[test]
fn test_step_result_constructors() {
    let ok = StepResult::success("a", json!(1), 5, 2);
    assert!(ok.success && !ok.skipped);
    assert_eq!(ok.retries, 2);

    let failed = StepResult::failure("b", &StepError::Timeout(100), 7, 0);
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("timed out after 100ms"));
    assert_eq!(failed.output, json!(null));

    let skipped = StepResult::skipped("c", "dependency a failed");
    assert!(skipped.skipped && !skipped.success);
    assert_eq!(skipped.error.as_deref(), Some("skipped: dependency a failed"));
}

#[test]
fn test_skipped_flag_omitted_when_false() {
    let ok = serde_json::to_value(StepResult::success("a", json!(1), 0, 0)).unwrap();
    assert!(ok.get("skipped").is_none());
    assert!(ok.get("error").is_none());

    let skipped = serde_json::to_value(StepResult::skipped("a", "x")).unwrap();
    assert_eq!(skipped["skipped"], json!(true));
}

#[test]
fn test_task_result_rejected() {
    let r = TaskResult::rejected("t1", "plan has no steps", 0);
    assert!(!r.success);
    assert_eq!(r.status, RunStatus::Failed);
    assert_eq!(r.error.as_deref(), Some("plan has no steps"));
    assert!(r.metadata.completed_steps.is_empty());
}

#[test]
fn test_retryable_errors() {
    assert!(StepError::execution("boom").is_retryable());
    assert!(StepError::Timeout(10).is_retryable());
    assert!(StepError::tool("shell", "exit 1").is_retryable());
    assert!(StepError::Postcondition("bad".into()).is_retryable());

    assert!(!StepError::Precondition("bad".into()).is_retryable());
    assert!(!StepError::ToolNotFound("x".into()).is_retryable());
    assert!(!StepError::UnknownFunction("x".into()).is_retryable());
    assert!(!StepError::Skipped("x".into()).is_retryable());
}

#[test]
fn test_error_display() {
    let cycle = ValidationError::Cycle(vec!["a".into(), "b".into()]);
    assert_eq!(cycle.to_string(), "dependency cycle among steps: a, b");

    let err: Error = ValidationError::EmptyPlan.into();
    assert_eq!(err.to_string(), "plan validation failed: plan has no steps");

    let err = Error::step("fetch", StepError::tool("shell", "exit 1"));
    assert_eq!(err.to_string(), "step fetch failed: tool error: shell - exit 1");

    let err = Error::invalid_transition("r1", RunStatus::Completed, RunStatus::Paused);
    assert_eq!(err.to_string(), "invalid transition for run r1: completed -> paused");
}

#[test]
fn test_run_id() {
    let task = Task::new("t1", "demo");
    let id = task.run_id();
    assert_eq!(id, RunId::from("t1"));
    assert_eq!(id.as_str(), "t1");
    assert_eq!(id.to_string(), "t1");
}
