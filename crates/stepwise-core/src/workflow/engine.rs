//! Workflow engine: the per-instance execution state machine.
//!
//! A `WorkflowEngine` owns one workflow definition and runs it one step at a
//! time, in array order, threading a `WorkflowContext` through the steps.
//!
//! # State machine
//!
//! ```text
//! Initialized -> Loaded -> Executing <-> Paused -> Completed | Failed | Stopped
//! ```
//!
//! # Concurrency
//!
//! The engine is shared behind an `Arc`: one task drives `execute` while
//! others call `pause_execution`, `resume_execution`, `stop_execution`, and
//! `get_execution_status`. Run state lives behind a `std::sync::Mutex` that is
//! never held across an `.await`. Pause is only observed between steps; the
//! executing task parks on a `Notify` until resumed or stopped. Stop is
//! cooperative: it cancels the run's token (which cuts `wait` steps short)
//! and the engine finalizes at the next step boundary.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use stepwise_types::error::RepositoryError;
use stepwise_types::event::WorkflowEvent;
use stepwise_types::execution::{
    EngineState, ExecutionRecord, ExecutionResult, HistoryEntry, StatusSnapshot, StepRecord,
    ValidationReport,
};
use stepwise_types::workflow::{ContextMap, StepDefinition, WorkflowDefinition};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::context::WorkflowContext;
use super::definition::{validate_definition, validate_workflow};
use super::step_runner::{StepResult, StepRunner};
use crate::event::EventBus;
use crate::repository::{DefinitionRepository, ExecutionRepository};

/// Error text of a run that ended because of `stop_execution`.
pub const STOPPED_MESSAGE: &str = "Execution stopped";

/// Error text when `execute` is called while a run is in flight.
pub const BUSY_MESSAGE: &str = "Execution already in progress";

/// Error text when `execute` is called before a definition is loaded.
pub const NOT_LOADED_MESSAGE: &str = "No workflow definition loaded";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Engine construction and configuration errors.
///
/// Run-time failures never surface here: `execute` always returns an
/// `ExecutionResult`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to load workflow definition: {0}")]
    Load(#[from] RepositoryError),

    #[error("cannot replace the definition while the engine is {state}")]
    Busy { state: EngineState },
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct RunState {
    state: EngineState,
    definition: Option<Arc<WorkflowDefinition>>,
    execution_id: Option<String>,
    context: WorkflowContext,
    current_step: Option<usize>,
    current_step_id: Option<String>,
    steps_completed: usize,
    total_steps: usize,
    errors: Vec<String>,
    history: Vec<HistoryEntry>,
    step_results: Vec<StepRecord>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl RunState {
    fn new(definition: Option<Arc<WorkflowDefinition>>) -> Self {
        let (state, total_steps) = match &definition {
            Some(def) => (EngineState::Loaded, def.steps.len()),
            None => (EngineState::Initialized, 0),
        };
        Self {
            state,
            definition,
            execution_id: None,
            context: WorkflowContext::new(),
            current_step: None,
            current_step_id: None,
            steps_completed: 0,
            total_steps,
            errors: Vec::new(),
            history: Vec::new(),
            step_results: Vec::new(),
            started_at: None,
            completed_at: None,
            cancel: CancellationToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Executes one workflow definition; one run at a time per instance.
pub struct WorkflowEngine {
    workflow_id: String,
    runner: Arc<StepRunner>,
    events: Option<EventBus>,
    run: Mutex<RunState>,
    wake: Notify,
}

impl WorkflowEngine {
    /// An engine with no definition yet (`Initialized`).
    pub fn new(workflow_id: impl Into<String>, runner: Arc<StepRunner>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            runner,
            events: None,
            run: Mutex::new(RunState::new(None)),
            wake: Notify::new(),
        }
    }

    /// An engine holding `definition` (`Loaded`).
    pub fn from_definition(definition: WorkflowDefinition, runner: Arc<StepRunner>) -> Self {
        Self {
            workflow_id: definition.id.clone(),
            runner,
            events: None,
            run: Mutex::new(RunState::new(Some(Arc::new(definition)))),
            wake: Notify::new(),
        }
    }

    /// Load `workflow_id` from a repository and build an engine for it.
    pub async fn load<R: DefinitionRepository>(
        repo: &R,
        workflow_id: &str,
        runner: Arc<StepRunner>,
    ) -> Result<Self, EngineError> {
        let mut definition = repo.load_definition(workflow_id).await?;
        if definition.id.is_empty() {
            definition.id = workflow_id.to_string();
        }
        tracing::debug!(
            workflow_id,
            steps = definition.steps.len(),
            "loaded workflow definition"
        );
        Ok(Self::from_definition(definition, runner))
    }

    /// Publish lifecycle events to `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Replace the definition. Refused while a run is in flight.
    pub fn load_definition(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        let mut run = self.lock();
        if run.state.is_active() {
            return Err(EngineError::Busy { state: run.state });
        }
        *run = RunState::new(Some(Arc::new(definition)));
        Ok(())
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    pub fn definition(&self) -> Option<Arc<WorkflowDefinition>> {
        self.lock().definition.clone()
    }

    /// Structural check of the loaded definition (first violation only).
    pub fn validate_workflow(&self) -> ValidationReport {
        match self.definition() {
            Some(definition) => validate_workflow(&definition),
            None => ValidationReport::invalid(NOT_LOADED_MESSAGE),
        }
    }

    // -----------------------------------------------------------------------
    // Execute
    // -----------------------------------------------------------------------

    /// Run the loaded definition to completion, failure, or stop.
    ///
    /// Always returns a result. A refused run (invalid definition, nothing
    /// loaded, or a run already in flight) changes no engine state.
    pub async fn execute(
        &self,
        execution_id: impl Into<String>,
        initial_context: ContextMap,
    ) -> ExecutionResult {
        let execution_id = execution_id.into();
        let (definition, cancel) = match self.begin(&execution_id, initial_context) {
            Ok(started) => started,
            Err(refused) => return refused,
        };

        let started = Instant::now();
        let total_steps = definition.steps.len();
        tracing::info!(
            workflow_id = %self.workflow_id,
            execution_id = %execution_id,
            total_steps,
            "workflow execution started"
        );
        self.publish(WorkflowEvent::RunStarted {
            execution_id: execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            total_steps,
        });

        for (index, step) in definition.steps.iter().enumerate() {
            // A pause or stop can land between the boundary check and
            // entering the step; enter_step rechecks under the lock.
            let context = loop {
                if self.wait_at_boundary().await == EngineState::Stopped {
                    return self.finish(&execution_id, started, None);
                }
                if let Some(context) = self.enter_step(index, step) {
                    break context;
                }
            };
            self.publish(WorkflowEvent::StepStarted {
                execution_id: execution_id.clone(),
                step_id: step.id.clone(),
                step_index: index,
                step_type: step.step_type.to_string(),
            });
            tracing::debug!(
                execution_id = %execution_id,
                step_id = %step.id,
                step_index = index,
                step_type = %step.step_type,
                "step started"
            );

            let step_started = Instant::now();
            let result = self.runner.execute(step, &context, &cancel).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            if result.success {
                self.complete_step(step, result, duration_ms);
                self.publish(WorkflowEvent::StepCompleted {
                    execution_id: execution_id.clone(),
                    step_id: step.id.clone(),
                    duration_ms,
                });
                continue;
            }

            // A step cut short by stop_execution is not a step failure.
            if self.state() == EngineState::Stopped {
                return self.finish(&execution_id, started, None);
            }

            let message = format!("Step '{}' failed: {}", step.id, result.error_message());
            self.fail_step(step, &result, &message, duration_ms);
            self.publish(WorkflowEvent::StepFailed {
                execution_id: execution_id.clone(),
                step_id: step.id.clone(),
                error: result.error_message().to_string(),
                continued: step.continue_on_error,
            });

            if !step.continue_on_error {
                tracing::warn!(
                    execution_id = %execution_id,
                    step_id = %step.id,
                    error = result.error_message(),
                    "step failed, aborting execution"
                );
                return self.finish(&execution_id, started, Some(message));
            }
            tracing::warn!(
                execution_id = %execution_id,
                step_id = %step.id,
                error = result.error_message(),
                "step failed, continuing (continue_on_error)"
            );
        }

        self.wait_at_boundary().await;
        self.finish(&execution_id, started, None)
    }

    /// Validate, guard, and reset run state for a new execution.
    fn begin(
        &self,
        execution_id: &str,
        initial_context: ContextMap,
    ) -> Result<(Arc<WorkflowDefinition>, CancellationToken), ExecutionResult> {
        let mut run = self.lock();

        let Some(definition) = run.definition.clone() else {
            return Err(ExecutionResult::refused(
                execution_id,
                &self.workflow_id,
                run.state,
                0,
                NOT_LOADED_MESSAGE,
            ));
        };
        let total_steps = definition.steps.len();

        if run.state.is_active() {
            tracing::warn!(
                workflow_id = %self.workflow_id,
                execution_id,
                state = %run.state,
                "execute refused, run already in flight"
            );
            return Err(ExecutionResult::refused(
                execution_id,
                &self.workflow_id,
                run.state,
                total_steps,
                BUSY_MESSAGE,
            ));
        }

        if let Err(invalid) = validate_definition(&definition) {
            tracing::warn!(
                workflow_id = %self.workflow_id,
                execution_id,
                error = %invalid,
                "execute refused, definition invalid"
            );
            return Err(ExecutionResult::refused(
                execution_id,
                &self.workflow_id,
                run.state,
                total_steps,
                invalid.to_string(),
            ));
        }

        *run = RunState::new(Some(Arc::clone(&definition)));
        run.state = EngineState::Executing;
        run.execution_id = Some(execution_id.to_string());
        run.context = WorkflowContext::from_map(initial_context);
        run.started_at = Some(Utc::now());
        let cancel = run.cancel.clone();
        Ok((definition, cancel))
    }

    /// Park while paused. Returns the state that ended the wait.
    async fn wait_at_boundary(&self) -> EngineState {
        loop {
            // Registered before the state check so a resume in between is not lost.
            let resumed = self.wake.notified();
            let state = self.state();
            if state != EngineState::Paused {
                return state;
            }
            tracing::debug!(workflow_id = %self.workflow_id, "paused at step boundary");
            resumed.await;
        }
    }

    /// Record the history entry and hand back the context the step sees.
    ///
    /// `None` when the run is no longer `Executing` (paused or stopped since
    /// the boundary check); nothing is recorded in that case.
    fn enter_step(&self, index: usize, step: &StepDefinition) -> Option<WorkflowContext> {
        let mut run = self.lock();
        if run.state != EngineState::Executing {
            return None;
        }
        run.current_step = Some(index);
        run.current_step_id = Some(step.id.clone());
        let context = run.context.clone();
        run.history.push(HistoryEntry {
            step_id: step.id.clone(),
            step_index: index,
            timestamp: Utc::now(),
            context_snapshot: context.snapshot(),
        });
        Some(context)
    }

    fn complete_step(&self, step: &StepDefinition, result: StepResult, duration_ms: u64) {
        let mut run = self.lock();
        run.context.merge(&result.context_delta);
        run.steps_completed += 1;
        run.step_results.push(StepRecord {
            step_id: step.id.clone(),
            success: true,
            output: result.output,
            error: None,
            duration_ms,
        });
    }

    fn fail_step(
        &self,
        step: &StepDefinition,
        result: &StepResult,
        message: &str,
        duration_ms: u64,
    ) {
        let mut run = self.lock();
        run.errors.push(message.to_string());
        run.step_results.push(StepRecord {
            step_id: step.id.clone(),
            success: false,
            output: Value::Null,
            error: result.error.clone(),
            duration_ms,
        });
    }

    /// Move to a terminal state and build the result.
    ///
    /// `failure` selects Failed over Completed. A run already marked Stopped
    /// stays Stopped; `stop_execution` has set its completion time.
    fn finish(&self, execution_id: &str, started: Instant, failure: Option<String>) -> ExecutionResult {
        let mut run = self.lock();

        let error = if run.state == EngineState::Stopped {
            Some(STOPPED_MESSAGE.to_string())
        } else {
            run.state = if failure.is_some() {
                EngineState::Failed
            } else {
                EngineState::Completed
            };
            run.completed_at = Some(Utc::now());
            failure
        };
        run.current_step = None;
        run.current_step_id = None;

        let state = run.state;
        let result = ExecutionResult {
            execution_id: execution_id.to_string(),
            workflow_id: self.workflow_id.clone(),
            success: state == EngineState::Completed,
            state,
            final_context: (state == EngineState::Completed).then(|| run.context.snapshot()),
            error: error.clone(),
            steps_completed: run.steps_completed,
            total_steps: run.total_steps,
            errors: run.errors.clone(),
            step_results: run.step_results.clone(),
            execution_time_secs: started.elapsed().as_secs_f64(),
        };
        drop(run);

        let duration_ms = (result.execution_time_secs * 1000.0) as u64;
        match state {
            EngineState::Completed => {
                tracing::info!(
                    workflow_id = %self.workflow_id,
                    execution_id,
                    steps_completed = result.steps_completed,
                    errors = result.errors.len(),
                    duration_ms,
                    "workflow execution completed"
                );
                self.publish(WorkflowEvent::RunCompleted {
                    execution_id: execution_id.to_string(),
                    workflow_id: self.workflow_id.clone(),
                    duration_ms,
                    steps_completed: result.steps_completed,
                });
            }
            EngineState::Failed => {
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    execution_id,
                    error = error.as_deref().unwrap_or_default(),
                    "workflow execution failed"
                );
                self.publish(WorkflowEvent::RunFailed {
                    execution_id: execution_id.to_string(),
                    workflow_id: self.workflow_id.clone(),
                    error: error.unwrap_or_default(),
                });
            }
            _ => {
                tracing::info!(
                    workflow_id = %self.workflow_id,
                    execution_id,
                    steps_completed = result.steps_completed,
                    "workflow execution stopped"
                );
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Lifecycle control
    // -----------------------------------------------------------------------

    /// Executing -> Paused. Takes effect at the next step boundary.
    pub fn pause_execution(&self) -> bool {
        let execution_id = {
            let mut run = self.lock();
            if run.state != EngineState::Executing {
                return false;
            }
            run.state = EngineState::Paused;
            run.execution_id.clone().unwrap_or_default()
        };
        tracing::info!(workflow_id = %self.workflow_id, execution_id = %execution_id, "execution paused");
        self.publish(WorkflowEvent::RunPaused { execution_id });
        true
    }

    /// Paused -> Executing.
    pub fn resume_execution(&self) -> bool {
        let execution_id = {
            let mut run = self.lock();
            if run.state != EngineState::Paused {
                return false;
            }
            run.state = EngineState::Executing;
            run.execution_id.clone().unwrap_or_default()
        };
        self.wake.notify_waiters();
        tracing::info!(workflow_id = %self.workflow_id, execution_id = %execution_id, "execution resumed");
        self.publish(WorkflowEvent::RunResumed { execution_id });
        true
    }

    /// Executing or Paused -> Stopped.
    ///
    /// The in-flight step is allowed to finish (a `wait` step is cut short);
    /// no further steps start.
    pub fn stop_execution(&self) -> bool {
        let (execution_id, steps_completed) = {
            let mut run = self.lock();
            if !run.state.is_active() {
                return false;
            }
            run.state = EngineState::Stopped;
            run.completed_at = Some(Utc::now());
            run.cancel.cancel();
            (
                run.execution_id.clone().unwrap_or_default(),
                run.steps_completed,
            )
        };
        self.wake.notify_waiters();
        tracing::info!(workflow_id = %self.workflow_id, execution_id = %execution_id, "execution stop requested");
        self.publish(WorkflowEvent::RunStopped {
            execution_id,
            steps_completed,
        });
        true
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Read-only projection of the run state. Safe to call mid-run.
    pub fn get_execution_status(&self) -> StatusSnapshot {
        let run = self.lock();
        StatusSnapshot {
            workflow_id: self.workflow_id.clone(),
            execution_id: run.execution_id.clone(),
            state: run.state,
            current_step: run.current_step,
            current_step_id: run.current_step_id.clone(),
            steps_completed: run.steps_completed,
            total_steps: run.total_steps,
            started_at: run.started_at,
            ended_at: run.completed_at,
            errors: run.errors.clone(),
            context: run.context.snapshot(),
        }
    }

    /// History entries of the current (or last) run, in step order.
    pub fn execution_history(&self) -> Vec<HistoryEntry> {
        self.lock().history.clone()
    }

    /// The current (or last) run as a persistence record.
    pub fn to_record(&self) -> ExecutionRecord {
        let run = self.lock();
        ExecutionRecord {
            execution_id: run.execution_id.clone().unwrap_or_default(),
            workflow_id: self.workflow_id.clone(),
            status: run.state.into(),
            context: run.context.snapshot(),
            steps_completed: run.steps_completed,
            total_steps: run.total_steps,
            errors: run.errors.clone(),
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }

    /// Hand the current record to an execution repository.
    pub async fn save_to<R: ExecutionRepository>(&self, repo: &R) -> Result<(), RepositoryError> {
        let record = self.to_record();
        repo.save_execution_result(&record).await
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().expect("workflow engine lock poisoned")
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflow_id", &self.workflow_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
