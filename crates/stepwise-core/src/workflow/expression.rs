//! Decision-step condition evaluation.
//!
//! `DecisionEvaluator` is the port decision steps call to turn a condition
//! string into a boolean. `JexlEvaluator` is the default implementation,
//! backed by `jexl_eval` with a small set of string and collection
//! transforms. Conditions see the run context as their root object, so
//! `user.age >= 18` reads `context["user"]["age"]`.
//!
//! Context values are always passed as evaluation data, never interpolated
//! into the expression text.

use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};

use super::context::WorkflowContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// DecisionEvaluator port
// ---------------------------------------------------------------------------

/// Evaluates a decision step's condition against the run context.
pub trait DecisionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        condition: &str,
        context: &WorkflowContext,
    ) -> impl Future<Output = Result<bool, ExpressionError>> + Send;
}

/// Object-safe mirror of [`DecisionEvaluator`] (blanket-implemented).
pub trait DecisionEvaluatorDyn: Send + Sync {
    fn evaluate_boxed<'a>(
        &'a self,
        condition: &'a str,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ExpressionError>> + Send + 'a>>;
}

impl<T: DecisionEvaluator> DecisionEvaluatorDyn for T {
    fn evaluate_boxed<'a>(
        &'a self,
        condition: &'a str,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ExpressionError>> + Send + 'a>> {
        Box::pin(self.evaluate(condition, context))
    }
}

/// Type-erased decision evaluator held by the step runner.
pub struct BoxDecisionEvaluator {
    inner: Box<dyn DecisionEvaluatorDyn>,
}

impl BoxDecisionEvaluator {
    pub fn new<T: DecisionEvaluator + 'static>(evaluator: T) -> Self {
        Self {
            inner: Box::new(evaluator),
        }
    }

    pub async fn evaluate(
        &self,
        condition: &str,
        context: &WorkflowContext,
    ) -> Result<bool, ExpressionError> {
        self.inner.evaluate_boxed(condition, context).await
    }
}

impl std::fmt::Debug for BoxDecisionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxDecisionEvaluator").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// JexlEvaluator
// ---------------------------------------------------------------------------

/// JEXL-backed evaluator with standard transforms registered.
///
/// Results are coerced with JavaScript-like truthiness, so `items|length`
/// is true for a non-empty list and a missing key is false.
#[derive(Debug, Clone, Copy, Default)]
pub struct JexlEvaluator;

impl JexlEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `expression` against a JSON object and coerce to bool.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        let result = self.evaluate_value(expression, context)?;
        Ok(value_to_bool(&result))
    }

    /// Evaluate `expression` against a JSON object, returning the raw value.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }
        build_evaluator()
            .eval_in_context(expression, context)
            .map_err(|e| ExpressionError::EvalFailed(e.to_string()))
    }
}

impl DecisionEvaluator for JexlEvaluator {
    fn evaluate(
        &self,
        condition: &str,
        context: &WorkflowContext,
    ) -> impl Future<Output = Result<bool, ExpressionError>> + Send {
        std::future::ready(self.evaluate_bool(condition, &context.to_value()))
    }
}

fn first_str(args: &[Value]) -> &str {
    args.first().and_then(Value::as_str).unwrap_or("")
}

fn second_str(args: &[Value]) -> &str {
    args.get(1).and_then(Value::as_str).unwrap_or("")
}

fn build_evaluator() -> jexl_eval::Evaluator<'static> {
    jexl_eval::Evaluator::new()
        .with_transform("lower", |args: &[Value]| Ok(json!(first_str(args).to_lowercase())))
        .with_transform("upper", |args: &[Value]| Ok(json!(first_str(args).to_uppercase())))
        .with_transform("trim", |args: &[Value]| Ok(json!(first_str(args).trim())))
        .with_transform("contains", |args: &[Value]| {
            let found = match args.first() {
                Some(Value::Array(items)) => args.get(1).is_some_and(|needle| items.contains(needle)),
                _ => first_str(args).contains(second_str(args)),
            };
            Ok(json!(found))
        })
        .with_transform("startsWith", |args: &[Value]| {
            Ok(json!(first_str(args).starts_with(second_str(args))))
        })
        .with_transform("endsWith", |args: &[Value]| {
            Ok(json!(first_str(args).ends_with(second_str(args))))
        })
        .with_transform("not", |args: &[Value]| {
            Ok(json!(!value_to_bool(args.first().unwrap_or(&Value::Null))))
        })
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                Some(Value::Object(o)) => o.len(),
                _ => 0,
            };
            Ok(json!(len as f64))
        })
}

/// JavaScript-like truthiness.
pub fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
