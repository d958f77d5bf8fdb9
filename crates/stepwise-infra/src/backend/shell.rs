//! Shell action backend: runs the step's `command` with `sh -c`.
//!
//! Step fields:
//! - `command` (or `target`): command line, `{{ key }}` templates resolved
//! - `timeout_secs`: optional limit, default 60
//!
//! Sets `stdout` (trimmed) and `exit_code`. A non-zero exit fails the step
//! with the trimmed stderr.

use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use stepwise_core::workflow::context::WorkflowContext;
use stepwise_core::workflow::{ActionBackend, StepError, StepOutcome};
use stepwise_types::workflow::StepDefinition;

/// Runner type served by [`ShellBackend`].
pub const SHELL_RUNNER_TYPE: &str = "shell";

const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellBackend;

impl ShellBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ActionBackend for ShellBackend {
    fn name(&self) -> &str {
        SHELL_RUNNER_TYPE
    }

    async fn invoke(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        let command = step
            .param_str("command")
            .or(step.target.as_deref())
            .map(|c| context.resolve_template(c))
            .ok_or_else(|| StepError::MissingField {
                step_id: step.id.clone(),
                field: "command",
            })?;

        let secs = step
            .params
            .get("timeout_secs")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let limit = Duration::try_from_secs_f64(secs).map_err(|e| StepError::InvalidField {
            step_id: step.id.clone(),
            field: "timeout_secs",
            reason: e.to_string(),
        })?;

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepError::Backend(format!("failed to spawn shell: {e}")))?;

        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| StepError::Backend(format!("command timed out after {secs}s")))?
            .map_err(|e| StepError::Backend(format!("failed to wait for command: {e}")))?;

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StepError::Backend(format!(
                "command exited with status {exit_code}: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(step_id = %step.id, exit_code, "shell step completed");

        Ok(StepOutcome::new(json!({
            "command": command,
            "exit_code": exit_code,
            "stdout": stdout.clone(),
        }))
        .with_delta("stdout", json!(stdout))
        .with_delta("exit_code", json!(exit_code)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use stepwise_types::workflow::StepType;

    fn shell_step(command: &str) -> StepDefinition {
        let mut step = StepDefinition::new("sh", StepType::Action);
        step.action = Some("run".to_string());
        step.runner_type = Some(SHELL_RUNNER_TYPE.to_string());
        step.params.insert("command".to_string(), json!(command));
        step
    }

    #[tokio::test]
    async fn test_captures_stdout_with_templates() {
        let mut ctx = WorkflowContext::new();
        ctx.set("name", json!("stepwise"));

        let outcome = ShellBackend
            .invoke(&shell_step("echo hello {{ name }}"), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome.context_delta.get("stdout"), Some(&json!("hello stepwise")));
        assert_eq!(outcome.context_delta.get("exit_code"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_stderr() {
        let err = ShellBackend
            .invoke(&shell_step("echo boom >&2; exit 3"), &WorkflowContext::new())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("status 3"), "got: {message}");
        assert!(message.contains("boom"), "got: {message}");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let mut step = shell_step("sleep 5");
        step.params.insert("timeout_secs".to_string(), json!(0.1));

        let err = ShellBackend
            .invoke(&step, &WorkflowContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_command_is_reported() {
        let mut step = StepDefinition::new("sh", StepType::Action);
        step.action = Some("run".to_string());
        let err = ShellBackend
            .invoke(&step, &WorkflowContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::MissingField { field: "command", .. }));
    }
}
