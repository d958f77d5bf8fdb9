//! Step runners for the four workflow step types.
//!
//! `StepRunner` dispatches on `StepType` to `ActionRunner`, `DecisionRunner`,
//! `LoopRunner`, or `WaitRunner`. Runners return `Result<StepOutcome,
//! StepError>`; `StepRunner::execute` is the dispatch boundary that folds
//! errors (and panics) into a uniform `StepResult` so the engine's
//! continue/abort logic sees one shape.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{Value, json};
use stepwise_types::workflow::{ContextMap, StepDefinition, StepType};
use tokio_util::sync::CancellationToken;

use super::backend::{BackendRegistry, DEFAULT_RUNNER_TYPE};
use super::context::{WorkflowContext, cap_output};
use super::expression::{
    BoxDecisionEvaluator, DecisionEvaluator, ExpressionError, JexlEvaluator,
};
use crate::breaker::{CircuitBreakerManager, CircuitOpenError};

// ---------------------------------------------------------------------------
// StepOutcome / StepResult
// ---------------------------------------------------------------------------

/// Output of a successful step plus the keys it contributes to the context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub output: Value,
    pub context_delta: ContextMap,
}

impl StepOutcome {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            context_delta: ContextMap::new(),
        }
    }

    pub fn with_delta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context_delta.insert(key.into(), value);
        self
    }
}

/// Normalized result of one step, success or not.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub success: bool,
    /// Runner output; `Value::Null` on failure.
    pub output: Value,
    pub error: Option<String>,
    /// Empty on failure.
    pub context_delta: ContextMap,
}

impl StepResult {
    pub fn succeeded(outcome: StepOutcome) -> Self {
        Self {
            success: true,
            output: outcome.output,
            error: None,
            context_delta: outcome.context_delta,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.to_string()),
            context_delta: ContextMap::new(),
        }
    }

    /// The error text, or an empty string for a success.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    #[error("no action backend registered for runner type '{0}'")]
    UnknownRunner(String),

    #[error("{runner_type} backend does not support action '{action}'")]
    UnsupportedAction { runner_type: String, action: String },

    #[error("step '{step_id}' is missing required field '{field}'")]
    MissingField {
        step_id: String,
        field: &'static str,
    },

    #[error("step '{step_id}' has invalid {field}: {reason}")]
    InvalidField {
        step_id: String,
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("condition evaluation failed: {0}")]
    Expression(#[from] ExpressionError),

    /// A backend reported failure (bad status, non-zero exit, I/O error).
    #[error("{0}")]
    Backend(String),

    #[error("loop iteration {iteration}: step '{step_id}' failed: {error}")]
    LoopAborted {
        iteration: u32,
        step_id: String,
        error: String,
    },

    #[error("step cancelled")]
    Cancelled,

    #[error("step panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Dispatches steps to the runner for their type.
pub struct StepRunner {
    action: ActionRunner,
    decision: DecisionRunner,
    looping: LoopRunner,
    wait: WaitRunner,
}

impl StepRunner {
    /// A runner using `backends` for action steps and the JEXL evaluator for
    /// decision steps.
    pub fn new(backends: BackendRegistry, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self {
            action: ActionRunner { backends, breakers },
            decision: DecisionRunner {
                evaluator: BoxDecisionEvaluator::new(JexlEvaluator::new()),
            },
            looping: LoopRunner,
            wait: WaitRunner,
        }
    }

    /// Replace the decision evaluator.
    pub fn with_evaluator<T: DecisionEvaluator + 'static>(mut self, evaluator: T) -> Self {
        self.decision.evaluator = BoxDecisionEvaluator::new(evaluator);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.action.breakers
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.action.backends
    }

    /// Run one step and normalize the outcome.
    ///
    /// Never fails: runner errors and panics both become a failed
    /// `StepResult`. Successful outputs larger than the per-step cap are
    /// replaced with a truncation marker.
    pub fn execute<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: &'a WorkflowContext,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = StepResult> + Send + 'a>> {
        Box::pin(async move {
            let run = AssertUnwindSafe(self.run(step, context, cancel)).catch_unwind();
            match run.await {
                Ok(Ok(outcome)) => StepResult::succeeded(StepOutcome {
                    output: cap_output(&step.id, outcome.output),
                    context_delta: outcome.context_delta,
                }),
                Ok(Err(err)) => {
                    tracing::debug!(step_id = %step.id, error = %err, "step failed");
                    StepResult::failed(err)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(step_id = %step.id, panic = %message, "step panicked");
                    StepResult::failed(StepError::Panicked(message))
                }
            }
        })
    }

    /// Run one step, returning the runner's own error on failure.
    pub async fn run(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        match &step.step_type {
            StepType::Action => self.action.run(step, context).await,
            StepType::Decision => self.decision.run(step, context).await,
            StepType::Loop => self.looping.run(self, step, context, cancel).await,
            StepType::Wait => self.wait.run(step, cancel).await,
            StepType::Other(name) => Err(StepError::UnknownStepType(name.clone())),
        }
    }
}

impl fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRunner")
            .field("backends", &self.action.backends.names())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// ActionRunner
// ---------------------------------------------------------------------------

/// Resolves the step's backend and invokes it, through the circuit breaker
/// for remote backends.
pub struct ActionRunner {
    backends: BackendRegistry,
    breakers: Arc<CircuitBreakerManager>,
}

impl ActionRunner {
    async fn run(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        let runner_type = step.runner_type.as_deref().unwrap_or(DEFAULT_RUNNER_TYPE);
        let backend = self
            .backends
            .get(runner_type)
            .ok_or_else(|| StepError::UnknownRunner(runner_type.to_string()))?;

        tracing::debug!(
            step_id = %step.id,
            runner_type,
            action = step.action.as_deref().unwrap_or_default(),
            "running action step"
        );

        if backend.is_remote() {
            self.breakers
                .call(runner_type, || backend.invoke(step, context))
                .await
        } else {
            backend.invoke(step, context).await
        }
    }
}

// ---------------------------------------------------------------------------
// DecisionRunner
// ---------------------------------------------------------------------------

/// Evaluates a boolean condition. Fails only when evaluation errors.
pub struct DecisionRunner {
    evaluator: BoxDecisionEvaluator,
}

impl DecisionRunner {
    async fn run(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        let condition = step
            .condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StepError::MissingField {
                step_id: step.id.clone(),
                field: "condition",
            })?;

        let result = self.evaluator.evaluate(condition, context).await?;
        tracing::debug!(step_id = %step.id, condition, result, "decision evaluated");

        let outcome = StepOutcome::new(json!({ "result": result }));
        Ok(match &step.output_key {
            Some(key) => outcome.with_delta(key.clone(), Value::Bool(result)),
            None => outcome,
        })
    }
}

// ---------------------------------------------------------------------------
// LoopRunner
// ---------------------------------------------------------------------------

/// Repeats nested steps sequentially, threading a loop-local context forward.
pub struct LoopRunner;

impl LoopRunner {
    async fn run(
        &self,
        dispatcher: &StepRunner,
        step: &StepDefinition,
        context: &WorkflowContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let iterations = step.iterations.unwrap_or(1);
        let mut local = context.clone();
        let mut delta = ContextMap::new();
        let mut steps_executed = 0usize;
        let mut errors: Vec<String> = Vec::new();

        for iteration in 1..=iterations {
            for nested in &step.steps {
                if cancel.is_cancelled() {
                    return Err(StepError::Cancelled);
                }

                let result = dispatcher.execute(nested, &local, cancel).await;
                if result.success {
                    local.merge(&result.context_delta);
                    delta.extend(result.context_delta);
                    steps_executed += 1;
                    continue;
                }

                if !nested.continue_on_error {
                    return Err(StepError::LoopAborted {
                        iteration,
                        step_id: nested.id.clone(),
                        error: result.error_message().to_string(),
                    });
                }
                errors.push(format!(
                    "iteration {iteration}: step '{}' failed: {}",
                    nested.id,
                    result.error_message()
                ));
            }
        }

        tracing::debug!(step_id = %step.id, iterations, steps_executed, "loop finished");
        Ok(StepOutcome {
            output: json!({
                "iterations": iterations,
                "steps_executed": steps_executed,
                "errors": errors,
            }),
            context_delta: delta,
        })
    }
}

// ---------------------------------------------------------------------------
// WaitRunner
// ---------------------------------------------------------------------------

/// Sleeps for `duration` seconds without blocking the runtime.
///
/// The sleep races the run's cancellation token, so stopping an execution
/// cuts a long wait short.
pub struct WaitRunner;

impl WaitRunner {
    async fn run(
        &self,
        step: &StepDefinition,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let secs = step.duration.unwrap_or(0.0);
        let duration =
            Duration::try_from_secs_f64(secs).map_err(|e| StepError::InvalidField {
                step_id: step.id.clone(),
                field: "duration",
                reason: e.to_string(),
            })?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(StepOutcome::new(json!({ "waited_secs": secs }))),
            _ = cancel.cancelled() => Err(StepError::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
