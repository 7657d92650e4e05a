//! Evaluation of [`Check`] predicates for validation rules and `decide`
//! criteria.

use crate::resolve::{resolve, Scope};
use regex::Regex;
use serde_json::Value;
use taskflow_core::{is_truthy, Check, ValidationRule};
use tracing::warn;

pub fn evaluate(check: &Check, value: &Value) -> bool {
    match check {
        Check::NotNull => !value.is_null(),
        Check::Truthy => is_truthy(value),
        Check::Equals(expected) => value == expected,
        Check::NotEquals(expected) => value != expected,
        Check::Contains(needle) => match value {
            Value::String(s) => s.contains(needle.as_str()),
            Value::Array(items) => items.iter().any(|v| v.as_str() == Some(needle.as_str())),
            Value::Object(map) => map.contains_key(needle),
            _ => false,
        },
        Check::Matches(pattern) => match Regex::new(pattern) {
            Ok(re) => value.as_str().map_or(false, |s| re.is_match(s)),
            Err(e) => {
                warn!(pattern = %pattern, "invalid pattern in check: {}", e);
                false
            }
        },
        Check::MinLength(min) => length(value).map_or(false, |len| len >= *min),
        Check::HasField(field) => value.get(field).is_some(),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn describe(check: &Check) -> String {
    match check {
        Check::NotNull => "value is null".to_string(),
        Check::Truthy => "value is not truthy".to_string(),
        Check::Equals(v) => format!("value does not equal {}", v),
        Check::NotEquals(v) => format!("value equals {}", v),
        Check::Contains(s) => format!("value does not contain {:?}", s),
        Check::Matches(p) => format!("value does not match /{}/", p),
        Check::MinLength(n) => format!("value is shorter than {}", n),
        Check::HasField(f) => format!("value has no field {:?}", f),
    }
}

/// Evaluate `rules` in order and report the first one that fails.
///
/// A rule without a subject inspects `default_subject`.
pub fn validate_rules(
    rules: &[ValidationRule],
    default_subject: &Value,
    scope: &dyn Scope,
) -> Result<(), String> {
    for rule in rules {
        let passed = match &rule.subject {
            Some(subject) => evaluate(&rule.check, &resolve(subject, scope)),
            None => evaluate(&rule.check, default_subject),
        };
        if !passed {
            return Err(rule.message.clone().unwrap_or_else(|| describe(&rule.check)));
        }
    }
    Ok(())
}
