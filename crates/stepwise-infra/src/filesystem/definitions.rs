//! Workflow definitions stored as YAML or JSON files.
//!
//! Directory layout:
//! ```text
//! {dir}/
//!   onboarding.yaml
//!   nightly-sync.json
//! ```
//!
//! The file stem is the workflow ID. A definition whose `id` field is empty
//! takes the ID from its file name.

use std::path::{Path, PathBuf};

use stepwise_core::repository::DefinitionRepository;
use stepwise_core::workflow::definition::{parse_workflow_json, parse_workflow_yaml};
use stepwise_types::error::RepositoryError;
use stepwise_types::workflow::WorkflowDefinition;

use super::check_file_id;

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Read and parse one definition file, choosing the format by extension
/// (`.json` is JSON, anything else is YAML).
pub async fn load_definition_file(path: &Path) -> Result<WorkflowDefinition, RepositoryError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(RepositoryError::NotFound(path.display().to_string()));
        }
        Err(err) => {
            return Err(RepositoryError::Storage(format!(
                "failed to read {}: {err}",
                path.display()
            )));
        }
    };

    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let parsed = if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    };
    let mut definition =
        parsed.map_err(|e| RepositoryError::Parse(format!("{}: {e}", path.display())))?;

    if definition.id.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            definition.id = stem.to_string();
        }
    }
    Ok(definition)
}

/// Definition repository over a directory of workflow files.
#[derive(Debug, Clone)]
pub struct FsDefinitionRepository {
    dir: PathBuf,
}

impl FsDefinitionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing `<id>.<ext>` in extension order.
    async fn find(&self, workflow_id: &str) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let candidate = self.dir.join(format!("{workflow_id}.{ext}"));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

impl DefinitionRepository for FsDefinitionRepository {
    async fn load_definition(&self, workflow_id: &str) -> Result<WorkflowDefinition, RepositoryError> {
        check_file_id(workflow_id)?;
        let path = self
            .find(workflow_id)
            .await
            .ok_or_else(|| RepositoryError::NotFound(workflow_id.to_string()))?;
        tracing::debug!(workflow_id, path = %path.display(), "loading workflow definition");
        load_definition_file(&path).await
    }

    async fn list_definitions(&self) -> Result<Vec<String>, RepositoryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(RepositoryError::Storage(format!(
                    "failed to list {}: {err}",
                    self.dir.display()
                )));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?
        {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if let (true, Some(stem)) = (known, path.file_stem().and_then(|s| s.to_str())) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_types::workflow::StepType;
    use tempfile::TempDir;

    const YAML: &str = r#"
name: Onboarding
steps:
  - id: s1
    type: action
    action: click
    target: btn
"#;

    #[tokio::test]
    async fn test_loads_yaml_and_takes_id_from_file_name() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("onboarding.yaml"), YAML).await.unwrap();

        let repo = FsDefinitionRepository::new(tmp.path());
        let def = repo.load_definition("onboarding").await.unwrap();
        assert_eq!(def.id, "onboarding");
        assert_eq!(def.steps[0].step_type, StepType::Action);
    }

    #[tokio::test]
    async fn test_loads_json_definitions() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("sync.json"),
            r#"{"id":"nightly","steps":[{"id":"w","type":"wait","duration":0}]}"#,
        )
        .await
        .unwrap();

        let repo = FsDefinitionRepository::new(tmp.path());
        let def = repo.load_definition("sync").await.unwrap();
        assert_eq!(def.id, "nightly");
    }

    #[tokio::test]
    async fn test_missing_definition_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let repo = FsDefinitionRepository::new(tmp.path());
        let err = repo.load_definition("ghost").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_malformed_definition_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("bad.yaml"), "steps: [unclosed").await.unwrap();
        let repo = FsDefinitionRepository::new(tmp.path());
        assert!(matches!(
            repo.load_definition("bad").await,
            Err(RepositoryError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let repo = FsDefinitionRepository::new(tmp.path());
        assert!(matches!(
            repo.load_definition("../etc/passwd").await,
            Err(RepositoryError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_lists_known_extensions_only() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.yml", "a.yaml", "c.json", "notes.txt"] {
            tokio::fs::write(tmp.path().join(name), YAML).await.unwrap();
        }
        let repo = FsDefinitionRepository::new(tmp.path());
        assert_eq!(repo.list_definitions().await.unwrap(), vec!["a", "b", "c"]);

        let empty = FsDefinitionRepository::new(tmp.path().join("missing"));
        assert!(empty.list_definitions().await.unwrap().is_empty());
    }
}
