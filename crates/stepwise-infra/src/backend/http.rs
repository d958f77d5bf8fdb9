//! HTTP action backend.
//!
//! Step fields:
//! - `url` (or `target`): request URL, `{{ key }}` templates resolved
//! - `method`: HTTP method, default `GET`
//! - `headers`: object of header name to value
//! - `body` (or `value`): JSON body; strings are sent as-is
//!
//! Sets `response_status` and `response_body` in the context. A JSON
//! response body is stored as JSON, anything else as a string. Non-2xx
//! statuses fail the step.

use std::time::Duration;

use serde_json::{Value, json};
use stepwise_core::workflow::context::{WorkflowContext, value_to_string};
use stepwise_core::workflow::{ActionBackend, StepError, StepOutcome};
use stepwise_types::workflow::StepDefinition;

/// Runner type served by [`HttpBackend`].
pub const HTTP_RUNNER_TYPE: &str = "http";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs one HTTP request per action step.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Use a preconfigured client (proxies, custom timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<reqwest::RequestBuilder, StepError> {
        let url = step
            .param_str("url")
            .or(step.target.as_deref())
            .map(|u| context.resolve_template(u))
            .ok_or_else(|| StepError::MissingField {
                step_id: step.id.clone(),
                field: "url",
            })?;

        let method_name = step.param_str("method").unwrap_or("GET").to_ascii_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|e| {
            StepError::InvalidField {
                step_id: step.id.clone(),
                field: "method",
                reason: e.to_string(),
            }
        })?;

        let mut request = self.client.request(method, &url);

        if let Some(headers) = step.params.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                let value = value_to_string(&context.resolve_value(value));
                request = request.header(name.as_str(), value);
            }
        }

        match step.params.get("body").or(step.value.as_ref()) {
            Some(Value::String(text)) => {
                request = request.body(context.resolve_template(text));
            }
            Some(Value::Null) | None => {}
            Some(body) => {
                request = request.json(&context.resolve_value(body));
            }
        }

        Ok(request)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionBackend for HttpBackend {
    fn name(&self) -> &str {
        HTTP_RUNNER_TYPE
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn invoke(
        &self,
        step: &StepDefinition,
        context: &WorkflowContext,
    ) -> Result<StepOutcome, StepError> {
        let request = self.build_request(step, context)?;

        let response = request
            .send()
            .await
            .map_err(|e| StepError::Backend(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StepError::Backend(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(StepError::Backend(format!("HTTP {status}: {text}")));
        }

        tracing::debug!(step_id = %step.id, status = status.as_u16(), "http step completed");

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(StepOutcome::new(json!({
            "status": status.as_u16(),
            "body": body.clone(),
        }))
        .with_delta("response_status", json!(status.as_u16()))
        .with_delta("response_body", body))
    }
}
