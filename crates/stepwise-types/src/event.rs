//! Event types for the Stepwise workflow event bus.
//!
//! `WorkflowEvent` is broadcast during workflow execution. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

/// Events emitted while a workflow engine runs.
///
/// Used by the event bus to surface run and step lifecycle to subscribers
/// (status endpoints, log shippers, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An execution has started.
    RunStarted {
        execution_id: String,
        workflow_id: String,
        total_steps: usize,
    },

    /// A step is about to run.
    StepStarted {
        execution_id: String,
        step_id: String,
        step_index: usize,
        step_type: String,
    },

    /// A step finished successfully.
    StepCompleted {
        execution_id: String,
        step_id: String,
        duration_ms: u64,
    },

    /// A step failed.
    StepFailed {
        execution_id: String,
        step_id: String,
        error: String,
        /// Whether the engine keeps going (`continue_on_error`).
        continued: bool,
    },

    /// Execution was paused between steps.
    RunPaused { execution_id: String },

    /// Execution was resumed.
    RunResumed { execution_id: String },

    /// Execution was stopped by a caller.
    RunStopped {
        execution_id: String,
        steps_completed: usize,
    },

    /// Execution completed.
    RunCompleted {
        execution_id: String,
        workflow_id: String,
        duration_ms: u64,
        steps_completed: usize,
    },

    /// Execution failed.
    RunFailed {
        execution_id: String,
        workflow_id: String,
        error: String,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to.
    pub fn execution_id(&self) -> &str {
        match self {
            WorkflowEvent::RunStarted { execution_id, .. }
            | WorkflowEvent::StepStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepFailed { execution_id, .. }
            | WorkflowEvent::RunPaused { execution_id }
            | WorkflowEvent::RunResumed { execution_id }
            | WorkflowEvent::RunStopped { execution_id, .. }
            | WorkflowEvent::RunCompleted { execution_id, .. }
            | WorkflowEvent::RunFailed { execution_id, .. } => execution_id,
        }
    }

    /// True for events that end an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::RunStopped { .. }
                | WorkflowEvent::RunCompleted { .. }
                | WorkflowEvent::RunFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_started_serde_tag() {
        let event = WorkflowEvent::RunStarted {
            execution_id: "exec-1".to_string(),
            workflow_id: "onboarding".to_string(),
            total_steps: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"run_started\""));
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, WorkflowEvent::RunStarted { total_steps: 3, .. }));
    }

    #[test]
    fn test_step_failed_serde_tag() {
        let event = WorkflowEvent::StepFailed {
            execution_id: "exec-1".to_string(),
            step_id: "fetch".to_string(),
            error: "connection refused".to_string(),
            continued: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_failed\""));
        assert!(json.contains("\"continued\":true"));
    }

    #[test]
    fn test_execution_id_and_terminal() {
        let paused = WorkflowEvent::RunPaused {
            execution_id: "exec-9".to_string(),
        };
        assert_eq!(paused.execution_id(), "exec-9");
        assert!(!paused.is_terminal());

        let stopped = WorkflowEvent::RunStopped {
            execution_id: "exec-9".to_string(),
            steps_completed: 1,
        };
        assert!(stopped.is_terminal());
    }
}
