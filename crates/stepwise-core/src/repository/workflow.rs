//! Storage ports for workflow definitions and execution records.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use stepwise_types::error::RepositoryError;
use stepwise_types::execution::ExecutionRecord;
use stepwise_types::workflow::WorkflowDefinition;

/// Supplies workflow definitions by ID.
pub trait DefinitionRepository: Send + Sync {
    /// Load a definition. `RepositoryError::NotFound` when the ID is unknown.
    fn load_definition(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<WorkflowDefinition, RepositoryError>> + Send;

    /// IDs of every stored definition, sorted.
    fn list_definitions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;
}

/// Records finished (or in-flight) executions.
pub trait ExecutionRepository: Send + Sync {
    /// Insert or replace the record for `record.execution_id`.
    fn save_execution_result(
        &self,
        record: &ExecutionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a record by execution ID.
    fn get_execution(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionRecord>, RepositoryError>> + Send;
}
