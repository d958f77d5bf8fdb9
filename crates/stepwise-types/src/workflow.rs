//! Workflow definition types for Stepwise.
//!
//! `WorkflowDefinition` is the read-only input to the engine. It is parsed
//! from YAML or JSON by the definition-loading layer and is deliberately
//! permissive: structural problems (missing IDs, unknown step types, action
//! steps without an action) are reported by workflow validation rather than
//! by deserialization, so callers get a readable validation error instead of
//! a serde parse failure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The mutable key/value context threaded through a workflow run.
///
/// Keys that are absent are "not yet set"; step runners never treat a missing
/// key as an error.
pub type ContextMap = Map<String, Value>;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A workflow definition: an ordered list of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable workflow identifier.
    #[serde(default)]
    pub id: String,
    /// Human-readable workflow name.
    #[serde(default)]
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Edges between steps as drawn by an editor.
    ///
    /// Retained for round-tripping only; execution always follows `steps`
    /// array order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    /// Extensible metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

/// An editor-level edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in a workflow.
///
/// Only `id` and `type` are common to every step; the remaining fields are
/// read by the runner matching `step_type`. Backend-specific fields (`url`,
/// `method`, `command`, ...) land in `params`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step ID, unique within a definition.
    #[serde(default)]
    pub id: String,
    /// The kind of step.
    #[serde(rename = "type", default)]
    pub step_type: StepType,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Action verb for action steps (e.g. "click", "type", "request").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Action target (selector, URL fragment, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Action payload (text to type, request body, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Selects the action backend. Defaults to the UI backend.
    #[serde(default, alias = "runnerType", skip_serializing_if = "Option::is_none")]
    pub runner_type: Option<String>,
    /// Keep going when this step fails.
    #[serde(default, alias = "continueOnError")]
    pub continue_on_error: bool,
    /// Boolean expression for decision steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Context key that receives a decision's outcome.
    #[serde(default, alias = "outputKey", skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Number of iterations for loop steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    /// Nested steps for loop steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepDefinition>,
    /// Wait duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Backend-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl StepDefinition {
    /// Create a bare step with the given ID and type.
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            step_type,
            ..Default::default()
        }
    }

    /// Display label: the name if present, otherwise the ID.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Read a string-valued backend parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// The kind of step.
///
/// Serialized as its lowercase name. Any unrecognized name is preserved in
/// `Other` so the engine can report it at run time; an absent `type` becomes
/// `Other("")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Action,
    Decision,
    Loop,
    Wait,
    Other(String),
}

impl StepType {
    /// The wire name of this step type.
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Action => "action",
            StepType::Decision => "decision",
            StepType::Loop => "loop",
            StepType::Wait => "wait",
            StepType::Other(name) => name,
        }
    }

    /// True when no type was given.
    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for StepType {
    fn default() -> Self {
        StepType::Other(String::new())
    }
}

impl From<String> for StepType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "action" => StepType::Action,
            "decision" => StepType::Decision,
            "loop" => StepType::Loop,
            "wait" => StepType::Wait,
            _ => StepType::Other(s),
        }
    }
}

impl From<StepType> for String {
    fn from(t: StepType) -> Self {
        match t {
            StepType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_type_parses_known_and_unknown_names() {
        assert_eq!(StepType::from("action".to_string()), StepType::Action);
        assert_eq!(StepType::from("wait".to_string()), StepType::Wait);
        assert_eq!(
            StepType::from("teleport".to_string()),
            StepType::Other("teleport".to_string())
        );
        assert!(StepType::default().is_empty());
    }

    #[test]
    fn test_step_definition_accepts_camel_case_aliases() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "fetch",
            "type": "action",
            "action": "request",
            "runnerType": "http",
            "continueOnError": true,
            "url": "https://example.com",
        }))
        .unwrap();

        assert_eq!(step.step_type, StepType::Action);
        assert_eq!(step.runner_type.as_deref(), Some("http"));
        assert!(step.continue_on_error);
        assert_eq!(step.param_str("url"), Some("https://example.com"));
    }

    #[test]
    fn test_missing_fields_are_left_for_validation() {
        let step: StepDefinition = serde_json::from_value(json!({ "action": "click" })).unwrap();
        assert!(step.id.is_empty());
        assert!(step.step_type.is_empty());
        assert!(!step.continue_on_error);
    }

    #[test]
    fn test_definition_from_yaml_with_nested_loop() {
        let yaml = r##"
id: onboarding
name: Onboarding
steps:
  - id: greet
    type: action
    action: type
    target: "#name"
    value: hi
  - id: repeat
    type: loop
    iterations: 2
    steps:
      - id: poll
        type: wait
        duration: 0.5
connections:
  - from: greet
    to: repeat
"##;
        let def: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.steps[1].iterations, Some(2));
        assert_eq!(def.steps[1].steps[0].duration, Some(0.5));
        assert_eq!(def.connections[0].to, "repeat");
    }

    #[test]
    fn test_step_type_serializes_as_plain_string() {
        let step = StepDefinition::new("s1", StepType::Decision);
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "decision");
        assert_eq!(value["id"], "s1");
    }
}
