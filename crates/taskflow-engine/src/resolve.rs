//! Parameter resolution: turns a [`Param`] tree into plain JSON by looking
//! references up in the run's results and artifacts.

use serde_json::{Map, Value};
use std::collections::HashMap;
use taskflow_core::{Param, Reference, StepId};
use tracing::warn;

/// Read access to what a run has produced so far.
pub trait Scope: Sync {
    /// Output of a step that completed successfully.
    fn result_output(&self, step: &str) -> Option<&Value>;

    fn artifact(&self, name: &str) -> Option<&Value>;
}

/// A scope layered over another, holding results that are not merged into
/// the run yet (earlier levels of a tool batch).
pub struct Overlay<'a> {
    base: &'a dyn Scope,
    results: &'a HashMap<StepId, Value>,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a dyn Scope, results: &'a HashMap<StepId, Value>) -> Self {
        Self { base, results }
    }
}

impl Scope for Overlay<'_> {
    fn result_output(&self, step: &str) -> Option<&Value> {
        self.results
            .get(step)
            .or_else(|| self.base.result_output(step))
    }

    fn artifact(&self, name: &str) -> Option<&Value> {
        self.base.artifact(name)
    }
}

pub fn resolve(param: &Param, scope: &dyn Scope) -> Value {
    match param {
        Param::Ref(reference) => resolve_reference(reference, scope),
        Param::List(items) => Value::Array(items.iter().map(|p| resolve(p, scope)).collect()),
        Param::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, p)| (k.clone(), resolve(p, scope)))
                .collect::<Map<String, Value>>(),
        ),
        Param::Value(value) => value.clone(),
    }
}

/// Missing results and artifacts resolve to null.
pub fn resolve_reference(reference: &Reference, scope: &dyn Scope) -> Value {
    match reference {
        Reference::Result(step) => scope.result_output(step).cloned().unwrap_or_else(|| {
            warn!(step = %step, "unresolved result reference, using null");
            Value::Null
        }),
        Reference::Artifact(name) => scope.artifact(name).cloned().unwrap_or_else(|| {
            warn!(artifact = %name, "unresolved artifact reference, using null");
            Value::Null
        }),
        Reference::Literal(value) => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Fixed {
        results: HashMap<StepId, Value>,
        artifacts: HashMap<String, Value>,
    }

    impl Scope for Fixed {
        fn result_output(&self, step: &str) -> Option<&Value> {
            self.results.get(step)
        }
        fn artifact(&self, name: &str) -> Option<&Value> {
            self.artifacts.get(name)
        }
    }

    #[test]
    fn nested_references() {
        let mut scope = Fixed::default();
        scope.results.insert("a".into(), json!({"rows": 3}));
        scope.artifacts.insert("report".into(), json!("r.txt"));

        let param = Param::object([
            ("count", Param::result("a")),
            ("files", Param::List(vec![Param::artifact("report"), Param::from(json!("x"))])),
        ]);
        assert_eq!(
            resolve(&param, &scope),
            json!({"count": {"rows": 3}, "files": ["r.txt", "x"]})
        );
    }

    #[test]
    fn missing_reference_is_null() {
        let scope = Fixed::default();
        assert_eq!(resolve(&Param::result("ghost"), &scope), Value::Null);
    }

    #[test]
    fn literal_is_not_resolved() {
        let scope = Fixed::default();
        let literal = Param::Ref(Reference::Literal(json!({"$result": "a"})));
        assert_eq!(resolve(&literal, &scope), json!({"$result": "a"}));
    }

    #[test]
    fn overlay_shadows_base() {
        let mut base = Fixed::default();
        base.results.insert("a".into(), json!(1));
        base.results.insert("b".into(), json!(2));
        let mut local = HashMap::new();
        local.insert("b".to_string(), json!(20));

        let overlay = Overlay::new(&base, &local);
        assert_eq!(resolve(&Param::result("a"), &overlay), json!(1));
        assert_eq!(resolve(&Param::result("b"), &overlay), json!(20));
    }
}
