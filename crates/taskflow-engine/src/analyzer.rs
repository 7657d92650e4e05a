//! Analyzer collaborator used by `analyze` actions.

use serde_json::{json, Value};

#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    /// Run the analysis named `analysis` over `input`.
    async fn analyze(&self, analysis: &str, input: &Value) -> Result<Value, String>;
}

/// Describes the shape of its input: JSON type, size and top-level keys.
pub struct StructuralAnalyzer;

#[async_trait::async_trait]
impl Analyzer for StructuralAnalyzer {
    async fn analyze(&self, analysis: &str, input: &Value) -> Result<Value, String> {
        let (kind, size) = match input {
            Value::Null => ("null", 0),
            Value::Bool(_) => ("bool", 1),
            Value::Number(_) => ("number", 1),
            Value::String(s) => ("string", s.chars().count()),
            Value::Array(items) => ("array", items.len()),
            Value::Object(map) => ("object", map.len()),
        };
        let keys: Vec<&String> = input.as_object().map(|m| m.keys().collect()).unwrap_or_default();
        Ok(json!({
            "analysis": analysis,
            "type": kind,
            "size": size,
            "keys": keys,
        }))
    }
}
