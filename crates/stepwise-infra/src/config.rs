//! Configuration loader for Stepwise.
//!
//! Reads `config.toml` (`~/.stepwise/config.toml` unless a path is given)
//! into [`StepwiseConfig`]. Falls back to defaults when the file is missing
//! or malformed.

use std::path::{Path, PathBuf};

use stepwise_types::config::StepwiseConfig;

/// Directory name under the home directory.
const DATA_DIR_NAME: &str = ".stepwise";

/// `~/.stepwise`, or `./.stepwise` when no home directory is known.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// `~/.stepwise/config.toml`.
pub fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Load configuration from `path`.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: a warning, then defaults.
pub async fn load_config(path: &Path) -> StepwiseConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return StepwiseConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return StepwiseConfig::default();
        }
    };

    match toml::from_str::<StepwiseConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            StepwiseConfig::default()
        }
    }
}
