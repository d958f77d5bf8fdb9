//! Filesystem-backed repositories.
//!
//! - `definitions`: workflow definitions as `<id>.yaml`, `<id>.yml`, or
//!   `<id>.json` files in one directory
//! - `executions`: one `<execution_id>.json` record per execution

pub mod definitions;
pub mod executions;

pub use definitions::{FsDefinitionRepository, load_definition_file};
pub use executions::JsonExecutionRepository;

use stepwise_types::error::RepositoryError;

/// Reject IDs that would escape the store directory.
fn check_file_id(id: &str) -> Result<(), RepositoryError> {
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.contains(['/', '\\'])
        || id.contains("..");
    if bad {
        return Err(RepositoryError::Storage(format!(
            "invalid identifier for a file name: '{id}'"
        )));
    }
    Ok(())
}
