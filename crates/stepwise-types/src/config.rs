//! Configuration types for Stepwise.
//!
//! `StepwiseConfig` represents the top-level `config.toml`. Every field has a
//! default, so an empty file (or no file at all) is a valid configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepwiseConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a circuit.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Cool-down before an open circuit admits a trial call.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    /// Per-service overrides keyed by service ID.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub services: HashMap<String, BreakerSettings>,
}

fn default_max_failures() -> u32 {
    3
}

fn default_reset_timeout_secs() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout_secs(),
            services: HashMap::new(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Effective settings for a service (override or global default).
    pub fn settings_for(&self, service_id: &str) -> BreakerSettings {
        self.services
            .get(service_id)
            .cloned()
            .unwrap_or(BreakerSettings {
                max_failures: self.max_failures,
                reset_timeout_secs: self.reset_timeout_secs,
            })
    }
}

/// Thresholds for a single breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

/// Engine-facing settings used by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory searched for `<workflow_id>.yaml` definitions.
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
    /// Directory receiving one JSON file per finished execution.
    #[serde(default = "default_executions_dir")]
    pub executions_dir: PathBuf,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("workflows")
}

fn default_executions_dir() -> PathBuf {
    PathBuf::from("executions")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            executions_dir: default_executions_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = StepwiseConfig::default();
        assert_eq!(config.circuit_breaker.max_failures, 3);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 60);
        assert!(config.circuit_breaker.services.is_empty());
        assert_eq!(config.engine.definitions_dir, PathBuf::from("workflows"));
    }

    #[test]
    fn test_config_deserialize_empty_uses_defaults() {
        let config: StepwiseConfig = toml::from_str("").unwrap();
        assert_eq!(config.circuit_breaker.max_failures, 3);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 60);
    }

    #[test]
    fn test_config_deserialize_with_service_overrides() {
        let toml_str = r#"
[circuit_breaker]
max_failures = 4

[circuit_breaker.services.http]
max_failures = 10
reset_timeout_secs = 5

[engine]
definitions_dir = "/srv/workflows"
"#;
        let config: StepwiseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.circuit_breaker.max_failures, 4);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 60);

        let http = config.circuit_breaker.settings_for("http");
        assert_eq!(http.max_failures, 10);
        assert_eq!(http.reset_timeout_secs, 5);

        let other = config.circuit_breaker.settings_for("shell");
        assert_eq!(other.max_failures, 4);
        assert_eq!(other.reset_timeout_secs, 60);

        assert_eq!(
            config.engine.definitions_dir,
            PathBuf::from("/srv/workflows")
        );
        assert_eq!(config.engine.executions_dir, PathBuf::from("executions"));
    }
}
