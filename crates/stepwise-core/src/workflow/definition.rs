//! Workflow definition parsing and structural validation.
//!
//! Parsing is permissive: a definition with missing IDs or unknown step types
//! still deserializes. `validate_definition` is the gate the engine applies
//! before any run, and it stops at the first violation it finds.

use std::collections::HashSet;

use stepwise_types::execution::ValidationReport;
use stepwise_types::workflow::{StepDefinition, StepType, WorkflowDefinition};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// First structural problem found in a definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Workflow has no steps")]
    NoSteps,

    /// `location` is a path such as `steps[2]` or `repeat.steps[0]`.
    #[error("Step at {location} is missing an id")]
    MissingId { location: String },

    #[error("Step '{step_id}' is missing a type")]
    MissingType { step_id: String },

    #[error("Action step '{step_id}' is missing an action")]
    MissingAction { step_id: String },

    #[error("Duplicate step id '{step_id}'")]
    DuplicateId { step_id: String },
}

/// Definition text could not be deserialized.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("invalid workflow JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML document into a `WorkflowDefinition` (not validated).
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Parse a JSON document into a `WorkflowDefinition` (not validated).
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, DefinitionError> {
    Ok(serde_json::from_str(json)?)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a definition's structure, failing on the first violation.
///
/// Checks, in order, for each step (depth-first through loop bodies):
/// - the step list is non-empty (top level only)
/// - `id` is non-empty and not already used anywhere in the definition
/// - `type` is non-empty
/// - action steps carry a non-empty `action`
///
/// Unknown step types pass validation; they fail at run time as an ordinary
/// step failure.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), ValidationError> {
    if def.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }
    let mut seen = HashSet::new();
    validate_steps(&def.steps, "", &mut seen)
}

/// [`validate_definition`] folded into the report shape returned to callers.
pub fn validate_workflow(def: &WorkflowDefinition) -> ValidationReport {
    match validate_definition(def) {
        Ok(()) => ValidationReport::valid(def.steps.len()),
        Err(e) => ValidationReport::invalid(e.to_string()),
    }
}

fn validate_steps<'a>(
    steps: &'a [StepDefinition],
    prefix: &str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), ValidationError> {
    for (index, step) in steps.iter().enumerate() {
        let id = step.id.trim();
        if id.is_empty() {
            return Err(ValidationError::MissingId {
                location: format!("{prefix}steps[{index}]"),
            });
        }
        if !seen.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                step_id: step.id.clone(),
            });
        }
        if step.step_type.is_empty() {
            return Err(ValidationError::MissingType {
                step_id: step.id.clone(),
            });
        }
        if step.step_type == StepType::Action
            && step.action.as_deref().is_none_or(|a| a.trim().is_empty())
        {
            return Err(ValidationError::MissingAction {
                step_id: step.id.clone(),
            });
        }
        if step.step_type == StepType::Loop {
            validate_steps(&step.steps, &format!("{id}."), seen)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
