//! Execution records stored as one JSON file each.

use std::path::{Path, PathBuf};

use stepwise_core::repository::ExecutionRepository;
use stepwise_types::error::RepositoryError;
use stepwise_types::execution::ExecutionRecord;

use super::check_file_id;

/// Execution repository writing `{dir}/{execution_id}.json`.
///
/// Records are written to a temporary file and renamed into place, so a
/// reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct JsonExecutionRepository {
    dir: PathBuf,
}

impl JsonExecutionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{execution_id}.json"))
    }
}

impl ExecutionRepository for JsonExecutionRepository {
    async fn save_execution_result(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        check_file_id(&record.execution_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RepositoryError::Storage(format!("failed to create {}: {e}", self.dir.display())))?;

        let json = serde_json::to_vec_pretty(record).map_err(|e| RepositoryError::Parse(e.to_string()))?;
        let path = self.record_path(&record.execution_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RepositoryError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RepositoryError::Storage(format!("failed to write {}: {e}", path.display())))?;

        tracing::debug!(
            execution_id = %record.execution_id,
            status = %record.status,
            path = %path.display(),
            "saved execution record"
        );
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>, RepositoryError> {
        check_file_id(execution_id)?;
        let path = self.record_path(execution_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RepositoryError::Storage(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| RepositoryError::Parse(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stepwise_types::execution::ExecutionStatus;
    use stepwise_types::workflow::ContextMap;
    use tempfile::TempDir;

    fn record(execution_id: &str, status: ExecutionStatus) -> ExecutionRecord {
        let mut context = ContextMap::new();
        context.insert("last_typed".to_string(), serde_json::json!("hi"));
        ExecutionRecord {
            execution_id: execution_id.to_string(),
            workflow_id: "onboarding".to_string(),
            status,
            context,
            steps_completed: 2,
            total_steps: 2,
            errors: Vec::new(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_save_then_get_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonExecutionRepository::new(tmp.path().join("executions"));

        repo.save_execution_result(&record("exec-1", ExecutionStatus::Completed))
            .await
            .unwrap();
        let loaded = repo.get_execution("exec-1").await.unwrap().unwrap();

        assert_eq!(loaded.status, ExecutionStatus::Completed);
        assert_eq!(loaded.context.get("last_typed"), Some(&serde_json::json!("hi")));
        assert!(!tmp.path().join("executions/exec-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_record() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonExecutionRepository::new(tmp.path());
        repo.save_execution_result(&record("exec-1", ExecutionStatus::Running))
            .await
            .unwrap();
        repo.save_execution_result(&record("exec-1", ExecutionStatus::Failed))
            .await
            .unwrap();

        let loaded = repo.get_execution("exec-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_execution_is_none() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonExecutionRepository::new(tmp.path());
        assert!(repo.get_execution("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_execution_ids() {
        let tmp = TempDir::new().unwrap();
        let repo = JsonExecutionRepository::new(tmp.path());
        let err = repo
            .save_execution_result(&record("../escape", ExecutionStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(_)));
    }
}
