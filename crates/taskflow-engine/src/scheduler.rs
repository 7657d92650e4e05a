//! Dependency scheduler: levels a step graph into groups that can run
//! concurrently.
//!
//! Group `k` holds every step whose dependencies all sit in groups `< k`.
//! Within a group, steps keep their original plan order, so the same plan
//! always produces the same schedule.

use std::collections::HashMap;
use taskflow_core::{Step, StepId, ValidationError};

/// Level the plan's steps. Unknown dependencies and cycles are errors.
pub fn group(steps: &[Step]) -> Result<Vec<Vec<StepId>>, ValidationError> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut deps = Vec::with_capacity(steps.len());
    for step in steps {
        let mut edges = Vec::with_capacity(step.dependencies.len());
        for dep in &step.dependencies {
            match index.get(dep.as_str()) {
                Some(&i) => edges.push(i),
                None => {
                    return Err(ValidationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    })
                }
            }
        }
        deps.push(edges);
    }

    let levels = level_indices(&deps).map_err(|stuck| {
        ValidationError::Cycle(stuck.into_iter().map(|i| steps[i].id.clone()).collect())
    })?;

    Ok(levels
        .into_iter()
        .map(|level| level.into_iter().map(|i| steps[i].id.clone()).collect())
        .collect())
}

/// Breadth-first leveling over node indices. `deps[i]` lists the nodes `i`
/// waits for. On a cycle, returns the indices that could never be placed.
pub(crate) fn level_indices(deps: &[Vec<usize>]) -> Result<Vec<Vec<usize>>, Vec<usize>> {
    let n = deps.len();
    let mut placed = vec![false; n];
    let mut remaining = n;
    let mut levels = Vec::new();

    while remaining > 0 {
        // Readiness is judged against the previous levels only.
        let level: Vec<usize> = (0..n)
            .filter(|&i| !placed[i] && deps[i].iter().all(|&d| placed[d]))
            .collect();

        if level.is_empty() {
            return Err((0..n).filter(|&i| !placed[i]).collect());
        }
        for &i in &level {
            placed[i] = true;
        }
        remaining -= level.len();
        levels.push(level);
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskflow_core::{Action, Param};

    fn step(id: &str, deps: &[&str]) -> Step {
        Step::new(id, Action::transform("identity", Param::from(json!(id)))).depends_on(deps.iter().copied())
    }

    #[test]
    fn diamond() {
        let steps = vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ];
        assert_eq!(group(&steps).unwrap(), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
    }

    #[test]
    fn ties_keep_plan_order() {
        let steps = vec![step("z", &[]), step("m", &[]), step("a", &[])];
        assert_eq!(group(&steps).unwrap(), vec![vec!["z", "m", "a"]]);
    }

    #[test]
    fn cycle_names_stuck_steps() {
        let steps = vec![step("a", &[]), step("b", &["c"]), step("c", &["b"])];
        assert_eq!(
            group(&steps).unwrap_err(),
            ValidationError::Cycle(vec!["b".into(), "c".into()])
        );
    }

    #[test]
    fn unknown_dependency() {
        let steps = vec![step("a", &["ghost"])];
        assert!(matches!(
            group(&steps),
            Err(ValidationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn empty_graph() {
        assert!(level_indices(&[]).unwrap().is_empty());
    }
}
