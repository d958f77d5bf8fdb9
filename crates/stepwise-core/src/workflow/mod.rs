//! Workflow execution: definitions, context, step runners, and the engine.
//!
//! - `definition`: parsing and fail-fast structural validation
//! - `context`: the key/value context and `{{ key }}` templates
//! - `expression`: decision-condition evaluation (JEXL by default)
//! - `backend`: action backends selected by `runner_type`
//! - `step_runner`: per-type step runners and the dispatch boundary
//! - `engine`: the execution state machine

pub mod backend;
pub mod context;
pub mod definition;
pub mod engine;
pub mod expression;
pub mod step_runner;

pub use backend::{ActionBackend, BackendRegistry, BoxActionBackend, SimulatedUiBackend};
pub use context::WorkflowContext;
pub use definition::{ValidationError, validate_definition, validate_workflow};
pub use engine::{EngineError, WorkflowEngine};
pub use expression::{DecisionEvaluator, JexlEvaluator};
pub use step_runner::{StepError, StepOutcome, StepResult, StepRunner};
