//! Plan validation. Runs before any action, so a rejected plan has no side
//! effects.

use crate::scheduler;
use std::collections::{HashMap, HashSet};
use taskflow_core::{ExecutionPlan, Reference, ValidationError};

/// Check that `plan` is well formed.
///
/// With `strict_references`, every `$result` reference must name a step of
/// the plan. Otherwise unknown references are left to resolve to null.
pub fn validate(plan: &ExecutionPlan, strict_references: bool) -> Result<(), ValidationError> {
    if plan.steps.is_empty() {
        return Err(ValidationError::EmptyPlan);
    }

    let mut ids = HashSet::with_capacity(plan.steps.len());
    for step in &plan.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStep(step.id.clone()));
        }
    }

    for step in &plan.steps {
        for dep in &step.dependencies {
            if *dep == step.id {
                return Err(ValidationError::SelfDependency(step.id.clone()));
            }
            if !ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut publishers: HashMap<&str, &str> = HashMap::new();
    for step in &plan.steps {
        if let Some(name) = step.artifact.as_deref() {
            if let Some(first) = publishers.insert(name, step.id.as_str()) {
                return Err(ValidationError::DuplicateArtifact {
                    artifact: name.to_string(),
                    first: first.to_string(),
                    second: step.id.clone(),
                });
            }
        }
    }

    scheduler::group(&plan.steps)?;

    if strict_references {
        for step in &plan.steps {
            let mut unknown = None;
            step.action.visit_references(&mut |r| {
                if let Reference::Result(target) = r {
                    if unknown.is_none() && !ids.contains(target.as_str()) {
                        unknown = Some(target.clone());
                    }
                }
            });
            if let Some(target) = unknown {
                return Err(ValidationError::UnknownReference {
                    step: step.id.clone(),
                    target,
                });
            }
        }
    }

    Ok(())
}
