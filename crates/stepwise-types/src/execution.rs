//! Execution tracking types: engine lifecycle state, per-step records,
//! run results, status snapshots, and the persisted execution record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::ContextMap;

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow engine instance.
///
/// `Initialized -> Loaded -> Executing <-> Paused -> {Completed | Failed | Stopped}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Initialized,
    Loaded,
    Executing,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl EngineState {
    /// Terminal states end an execution and carry a completion timestamp.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Completed | EngineState::Failed | EngineState::Stopped
        )
    }

    /// An execution is in flight (possibly paused between steps).
    pub fn is_active(self) -> bool {
        matches!(self, EngineState::Executing | EngineState::Paused)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Initialized => "initialized",
            EngineState::Loaded => "loaded",
            EngineState::Executing => "executing",
            EngineState::Paused => "paused",
            EngineState::Completed => "completed",
            EngineState::Failed => "failed",
            EngineState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Status of a persisted execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl From<EngineState> for ExecutionStatus {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Initialized | EngineState::Loaded => ExecutionStatus::Pending,
            EngineState::Executing => ExecutionStatus::Running,
            EngineState::Paused => ExecutionStatus::Paused,
            EngineState::Completed => ExecutionStatus::Completed,
            EngineState::Failed => ExecutionStatus::Failed,
            EngineState::Stopped => ExecutionStatus::Stopped,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of validating a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// First violation found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of top-level steps, set when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_count: Option<usize>,
}

impl ValidationReport {
    pub fn valid(step_count: usize) -> Self {
        Self {
            valid: true,
            error: None,
            step_count: Some(step_count),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            step_count: None,
        }
    }
}

// ---------------------------------------------------------------------------
// History and step records
// ---------------------------------------------------------------------------

/// One entry per attempted step, recorded before the step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_id: String,
    /// Position in the definition's step array.
    pub step_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Context as the step saw it.
    pub context_snapshot: ContextMap,
}

/// Result of one attempted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub success: bool,
    /// Runner output (null for failures).
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Structured result of `execute`. Always returned, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub success: bool,
    /// Engine state when the run finished (or the unchanged state when the
    /// run was refused).
    pub state: EngineState,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_context: Option<ContextMap>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub step_results: Vec<StepRecord>,
    pub execution_time_secs: f64,
}

impl ExecutionResult {
    /// A result for a run that never started (validation or state guard).
    pub fn refused(
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        state: EngineState,
        total_steps: usize,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            success: false,
            state,
            final_context: None,
            error: Some(error.clone()),
            steps_completed: 0,
            total_steps,
            errors: vec![error],
            step_results: Vec::new(),
            execution_time_secs: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// Read-only projection of an engine's run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub state: EngineState,
    /// Index of the step being run or about to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub context: ContextMap,
}

// ---------------------------------------------------------------------------
// Execution record (persistence)
// ---------------------------------------------------------------------------

/// A finished (or in-flight) execution as handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub context: ContextMap,
    pub steps_completed: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(EngineState::Completed.is_terminal());
        assert!(EngineState::Failed.is_terminal());
        assert!(EngineState::Stopped.is_terminal());
        assert!(!EngineState::Paused.is_terminal());
        assert!(EngineState::Paused.is_active());
        assert!(!EngineState::Loaded.is_active());
    }

    #[test]
    fn test_execution_status_from_engine_state() {
        assert_eq!(
            ExecutionStatus::from(EngineState::Loaded),
            ExecutionStatus::Pending
        );
        assert_eq!(
            ExecutionStatus::from(EngineState::Executing),
            ExecutionStatus::Running
        );
        assert_eq!(
            ExecutionStatus::from(EngineState::Stopped),
            ExecutionStatus::Stopped
        );
    }

    #[test]
    fn test_refused_result_carries_error() {
        let result = ExecutionResult::refused(
            "exec-1",
            "wf",
            EngineState::Loaded,
            0,
            "Workflow has no steps",
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Workflow has no steps"));
        assert_eq!(result.errors.len(), 1);
        assert!(result.final_context.is_none());
    }

    #[test]
    fn test_validation_report_serialization_omits_absent_fields() {
        let json = serde_json::to_value(ValidationReport::valid(3)).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["step_count"], 3);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_engine_state_display_matches_serde() {
        let json = serde_json::to_value(EngineState::Paused).unwrap();
        assert_eq!(json, "paused");
        assert_eq!(EngineState::Paused.to_string(), "paused");
    }
}
