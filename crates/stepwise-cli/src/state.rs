//! Application state wiring the engine's collaborators together.
//!
//! AppState pins the core ports to the concrete infra implementations: the
//! filesystem definition store, the JSON execution store, and the built-in
//! action backends behind one shared circuit breaker manager.

use std::path::Path;
use std::sync::Arc;

use stepwise_core::breaker::CircuitBreakerManager;
use stepwise_core::workflow::StepRunner;
use stepwise_infra::backend::builtin_registry;
use stepwise_infra::config::{default_config_path, load_config};
use stepwise_infra::filesystem::{FsDefinitionRepository, JsonExecutionRepository};
use stepwise_types::config::StepwiseConfig;

/// Shared state for command handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: StepwiseConfig,
    pub breakers: Arc<CircuitBreakerManager>,
    pub runner: Arc<StepRunner>,
    pub definitions: FsDefinitionRepository,
    pub executions: JsonExecutionRepository,
}

impl AppState {
    /// Load configuration (explicit path or `~/.stepwise/config.toml`) and
    /// wire the runner.
    pub async fn init(config_path: Option<&Path>) -> Self {
        let config = match config_path {
            Some(path) => load_config(path).await,
            None => load_config(&default_config_path()).await,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: StepwiseConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::with_config(
            config.circuit_breaker.clone(),
        ));
        let runner = Arc::new(StepRunner::new(builtin_registry(), Arc::clone(&breakers)));

        tracing::debug!(
            definitions_dir = %config.engine.definitions_dir.display(),
            executions_dir = %config.engine.executions_dir.display(),
            "application state initialized"
        );

        Self {
            definitions: FsDefinitionRepository::new(config.engine.definitions_dir.clone()),
            executions: JsonExecutionRepository::new(config.engine.executions_dir.clone()),
            config,
            breakers,
            runner,
        }
    }
}
