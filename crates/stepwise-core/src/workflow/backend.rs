//! Action backends: the concrete executors behind `action` steps.
//!
//! A step's `runner_type` selects a backend from the `BackendRegistry`
//! (`ui` when unset). Backends that reach a remote or otherwise fallible
//! resource report `is_remote() == true`, and the action runner routes their
//! calls through the circuit breaker keyed by the runner type.
//!
//! Follows the blanket-impl pattern used for other ports:
//! 1. `ActionBackend` uses return-position `impl Future` (not object safe)
//! 2. `ActionBackendDyn` boxes the future and is blanket-implemented
//! 3. `BoxActionBackend` wraps `Box<dyn ActionBackendDyn>` for the registry

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};
use stepwise_types::workflow::StepDefinition;

use super::context::{WorkflowContext, value_to_string};
use super::step_runner::{StepError, StepOutcome};

/// Runner type used when a step does not name one.
pub const DEFAULT_RUNNER_TYPE: &str = "ui";

// ---------------------------------------------------------------------------
// ActionBackend port
// ---------------------------------------------------------------------------

/// Executes the `action` of an action step.
pub trait ActionBackend: Send + Sync {
    /// Registry key, matched against a step's `runner_type`.
    fn name(&self) -> &str;

    /// Whether calls should be guarded by a circuit breaker.
    fn is_remote(&self) -> bool {
        false
    }

    /// Perform the step's action against a read-only view of the context.
    fn invoke(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> impl Future<Output = Result<StepOutcome, StepError>> + Send;
}

/// Object-safe version of [`ActionBackend`] with a boxed future.
pub trait ActionBackendDyn: Send + Sync {
    fn name(&self) -> &str;

    fn is_remote(&self) -> bool;

    fn invoke_boxed<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, StepError>> + Send + 'a>>;
}

impl<T: ActionBackend> ActionBackendDyn for T {
    fn name(&self) -> &str {
        ActionBackend::name(self)
    }

    fn is_remote(&self) -> bool {
        ActionBackend::is_remote(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: &'a WorkflowContext,
    ) -> Pin<Box<dyn Future<Output = Result<StepOutcome, StepError>> + Send + 'a>> {
        Box::pin(self.invoke(step, context))
    }
}

/// Type-erased action backend.
pub struct BoxActionBackend {
    inner: Box<dyn ActionBackendDyn>,
}

impl BoxActionBackend {
    pub fn new<T: ActionBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn is_remote(&self) -> bool {
        self.inner.is_remote()
    }

    pub async fn invoke(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        self.inner.invoke_boxed(step, context).await
    }
}

impl std::fmt::Debug for BoxActionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxActionBackend")
            .field("name", &self.name())
            .field("remote", &self.is_remote())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BackendRegistry
// ---------------------------------------------------------------------------

/// Action backends keyed by runner type.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, BoxActionBackend>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in simulated UI backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SimulatedUiBackend);
        registry
    }

    /// Register a backend under its own name, replacing any previous one.
    pub fn register<T: ActionBackend + 'static>(&mut self, backend: T) {
        let backend = BoxActionBackend::new(backend);
        tracing::debug!(
            runner_type = backend.name(),
            remote = backend.is_remote(),
            "registered action backend"
        );
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, runner_type: &str) -> Option<&BoxActionBackend> {
        self.backends.get(runner_type)
    }

    /// Registered runner types, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// SimulatedUiBackend
// ---------------------------------------------------------------------------

/// In-process stand-in for a UI automation driver.
///
/// | action     | context delta                  |
/// |------------|--------------------------------|
/// | `click`    | none                           |
/// | `type`     | `last_typed` = resolved value  |
/// | `navigate` | `current_url` = resolved target|
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedUiBackend;

impl ActionBackend for SimulatedUiBackend {
    fn name(&self) -> &str {
        DEFAULT_RUNNER_TYPE
    }

    async fn invoke(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        let action = step.action.as_deref().unwrap_or_default();
        let target = step.target.as_deref().map(|t| context.resolve_template(t));

        match action {
            "click" => {
                tracing::debug!(step_id = %step.id, target = ?target, "simulated click");
                Ok(StepOutcome::new(json!({
                    "action": "click",
                    "target": target,
                })))
            }
            "type" => {
                let typed = step
                    .value
                    .as_ref()
                    .map(|v| context.resolve_value(v))
                    .unwrap_or(Value::String(String::new()));
                let typed = Value::String(value_to_string(&typed));
                tracing::debug!(step_id = %step.id, target = ?target, "simulated typing");
                Ok(StepOutcome::new(json!({
                    "action": "type",
                    "target": target,
                    "typed": typed.clone(),
                }))
                .with_delta("last_typed", typed))
            }
            "navigate" => {
                let url = target.ok_or_else(|| StepError::MissingField {
                    step_id: step.id.clone(),
                    field: "target",
                })?;
                Ok(StepOutcome::new(json!({ "action": "navigate", "url": url.clone() }))
                    .with_delta("current_url", Value::String(url)))
            }
            other => Err(StepError::UnsupportedAction {
                runner_type: DEFAULT_RUNNER_TYPE.to_string(),
                action: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use stepwise_types::workflow::StepType;

    use super::*;

    fn ui_step(action: &str) -> StepDefinition {
        StepDefinition {
            action: Some(action.to_string()),
            target: Some("#field".to_string()),
            ..StepDefinition::new("s1", StepType::Action)
        }
    }

    #[tokio::test]
    async fn test_click_produces_no_delta() {
        let outcome = SimulatedUiBackend
            .invoke(&ui_step("click"), &WorkflowContext::new())
            .await
            .unwrap();
        assert!(outcome.context_delta.is_empty());
        assert_eq!(outcome.output["target"], "#field");
    }

    #[tokio::test]
    async fn test_type_records_last_typed_with_templates() {
        let mut context = WorkflowContext::new();
        context.set("name", json!("Ada"));
        let step = StepDefinition {
            value: Some(json!("hi {{ name }}")),
            ..ui_step("type")
        };

        let outcome = SimulatedUiBackend.invoke(&step, &context).await.unwrap();
        assert_eq!(outcome.context_delta.get("last_typed"), Some(&json!("hi Ada")));
    }

    #[tokio::test]
    async fn test_navigate_sets_current_url() {
        let step = StepDefinition {
            target: Some("https://example.com/login".to_string()),
            ..ui_step("navigate")
        };
        let outcome = SimulatedUiBackend
            .invoke(&step, &WorkflowContext::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.context_delta.get("current_url"),
            Some(&json!("https://example.com/login"))
        );
    }

    #[tokio::test]
    async fn test_unsupported_action_fails() {
        let err = SimulatedUiBackend
            .invoke(&ui_step("drag"), &WorkflowContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ui backend does not support action 'drag'");
    }

    #[test]
    fn test_registry_defaults_and_lookup() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["ui"]);
        let ui = registry.get("ui").unwrap();
        assert!(!ui.is_remote());
        assert!(registry.get("http").is_none());
    }
}
