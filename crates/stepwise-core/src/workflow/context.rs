//! Workflow execution context with shallow-merge semantics and template
//! resolution.
//!
//! `WorkflowContext` is the key/value state threaded through a workflow run.
//! Only the engine writes it between steps; runners read a snapshot and hand
//! back a delta. Missing keys mean "not yet set" and are never an error.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stepwise_types::workflow::ContextMap;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum serialized size of a single step output (1 MB).
pub const MAX_STEP_OUTPUT_SIZE: usize = 1_048_576;

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// Mutable key/value context for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowContext {
    values: ContextMap,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: ContextMap) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a dotted path (`user.address.city`), descending into objects
    /// and array indices.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Shallow merge: delta keys overwrite, other keys are untouched.
    pub fn merge(&mut self, delta: &ContextMap) {
        for (key, value) in delta {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy of the current values.
    pub fn snapshot(&self) -> ContextMap {
        self.values.clone()
    }

    pub fn as_map(&self) -> &ContextMap {
        &self.values
    }

    /// The context as a JSON object (for expression evaluation).
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_map(self) -> ContextMap {
        self.values
    }

    /// Replace `{{ key }}` references with context values.
    ///
    /// Keys may be dotted paths. Unknown references are left as written.
    pub fn resolve_template(&self, template: &str) -> String {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + len + 2;
            let key = rest[start + 2..end - 2].trim();

            result.push_str(&rest[..start]);
            match self.lookup(key) {
                Some(value) if !key.is_empty() => result.push_str(&value_to_string(value)),
                _ => result.push_str(&rest[start..end]),
            }
            rest = &rest[end..];
        }

        result.push_str(rest);
        result
    }

    /// Resolve templates inside a JSON value.
    ///
    /// A string that is exactly one reference resolves to the referenced
    /// value with its type intact; other strings are resolved textually.
    /// Arrays and objects are resolved recursively.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(key) = whole_reference(s) {
                    if let Some(found) = self.lookup(key) {
                        return found.clone();
                    }
                }
                Value::String(self.resolve_template(s))
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<ContextMap> for WorkflowContext {
    fn from(values: ContextMap) -> Self {
        Self::from_map(values)
    }
}

/// `"{{ key }}"` with nothing around it -> `Some("key")`.
fn whole_reference(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Render a value for string interpolation (strings unquoted).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Replace an oversized step output with a truncation marker.
pub fn cap_output(step_id: &str, output: Value) -> Value {
    let size = match serde_json::to_string(&output) {
        Ok(serialized) => serialized.len(),
        Err(_) => return output,
    };
    if size <= MAX_STEP_OUTPUT_SIZE {
        return output;
    }

    tracing::warn!(
        step_id,
        size,
        max = MAX_STEP_OUTPUT_SIZE,
        "step output exceeds size limit, truncating"
    );
    json!({
        "_truncated": true,
        "_original_size": size,
        "_message": format!("output exceeded {MAX_STEP_OUTPUT_SIZE} byte limit and was truncated"),
    })
}
