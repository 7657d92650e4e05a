//! Pure functions available to `transform` actions.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use taskflow_core::{is_truthy, StepError};

pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, TransformFn>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", Ok);
        registry.register("to_string", |v| {
            Ok(match v {
                Value::String(s) => Value::String(s),
                other => Value::String(other.to_string()),
            })
        });
        registry.register("length", |v| match &v {
            Value::Null => Ok(Value::from(0)),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::Object(map) => Ok(Value::from(map.len())),
            other => Err(format!("length of {}", type_name(other))),
        });
        registry.register("keys", |v| match v {
            Value::Object(map) => Ok(Value::Array(map.keys().cloned().map(Value::String).collect())),
            other => Err(format!("keys of {}", type_name(&other))),
        });
        registry.register("values", |v| match v {
            Value::Object(map) => Ok(Value::Array(map.into_iter().map(|(_, v)| v).collect())),
            other => Err(format!("values of {}", type_name(&other))),
        });
        registry.register("flatten", |v| match v {
            Value::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .flat_map(|item| match item {
                        Value::Array(inner) => inner,
                        other => vec![other],
                    })
                    .collect(),
            )),
            other => Err(format!("flatten of {}", type_name(&other))),
        });
        registry.register("uppercase", |v| map_str(v, "uppercase", |s| s.to_uppercase()));
        registry.register("lowercase", |v| map_str(v, "lowercase", |s| s.to_lowercase()));
        registry.register("trim", |v| map_str(v, "trim", |s| s.trim().to_string()));
        registry.register("json_parse", |v| match v {
            Value::String(s) => serde_json::from_str(&s).map_err(|e| format!("json_parse: {}", e)),
            other => Err(format!("json_parse of {}", type_name(&other))),
        });
        registry.register("sum", sum);
        registry.register("not", |v| Ok(Value::Bool(!is_truthy(&v))));
        registry
    }

    /// Register a function. Replaces any existing function with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn call(&self, name: &str, input: Value) -> Result<Value, StepError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| StepError::UnknownFunction(name.to_string()))?;
        f(input).map_err(StepError::Execution)
    }

    /// Registered function names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn map_str(value: Value, name: &str, f: impl Fn(&str) -> String) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(f(&s))),
        other => Err(format!("{} of {}", name, type_name(&other))),
    }
}

/// Integer sum when every element is an integer and the total fits in an
/// `i64`, float sum otherwise.
fn sum(value: Value) -> Result<Value, String> {
    let items = match value {
        Value::Array(items) => items,
        other => return Err(format!("sum of {}", type_name(&other))),
    };
    if items.iter().all(Value::is_i64) {
        let total = items
            .iter()
            .filter_map(Value::as_i64)
            .try_fold(0i64, i64::checked_add);
        if let Some(total) = total {
            return Ok(Value::from(total));
        }
    }
    let mut total = 0.0;
    for item in &items {
        total += item
            .as_f64()
            .ok_or_else(|| format!("sum over non-number {}", type_name(item)))?;
    }
    Ok(Value::from(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins() {
        let f = FunctionRegistry::with_builtins();
        assert_eq!(f.call("length", json!([1, 2, 3])).unwrap(), json!(3));
        assert_eq!(f.call("flatten", json!([[1], 2, [3, 4]])).unwrap(), json!([1, 2, 3, 4]));
        assert_eq!(f.call("sum", json!([1, 2, 3])).unwrap(), json!(6));
        assert_eq!(f.call("sum", json!([1, 2.5])).unwrap(), json!(3.5));
        assert_eq!(f.call("to_string", json!({"a": 1})).unwrap(), json!("{\"a\":1}"));
        assert_eq!(f.call("not", json!("")).unwrap(), json!(true));
    }

    #[test]
    fn sum_overflow_falls_back_to_float() {
        let f = FunctionRegistry::with_builtins();
        let total = f.call("sum", json!([i64::MAX, 1])).unwrap();
        assert!(total.is_f64());
        assert_eq!(total.as_f64(), Some(i64::MAX as f64 + 1.0));
        assert_eq!(f.call("sum", json!([i64::MIN, -1])).unwrap().as_f64(), Some(i64::MIN as f64 - 1.0));
        assert_eq!(f.call("sum", json!([])).unwrap(), json!(0));
    }

    #[test]
    fn type_errors_and_unknown() {
        let f = FunctionRegistry::with_builtins();
        assert!(matches!(f.call("uppercase", json!(1)), Err(StepError::Execution(_))));
        assert!(matches!(f.call("nope", json!(1)), Err(StepError::UnknownFunction(_))));
    }
}
