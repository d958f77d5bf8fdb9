//! CLI command definitions for the `stepwise` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run and inspect step-by-step workflows.
#[derive(Parser)]
#[command(name = "stepwise", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for verbose, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config.toml (default: ~/.stepwise/config.toml).
    #[arg(long, global = true, env = "STEPWISE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow definition file.
    Validate {
        /// Path to a YAML or JSON definition.
        file: PathBuf,
    },

    /// Execute a workflow.
    Run {
        /// Definition file path, or a workflow ID in the definitions directory.
        workflow: String,

        /// Initial context as a JSON object.
        #[arg(long)]
        context: Option<String>,

        /// Execution ID (default: a fresh UUID v7).
        #[arg(long)]
        execution_id: Option<String>,

        /// Skip writing the execution record.
        #[arg(long)]
        no_save: bool,
    },

    /// List workflow IDs in the definitions directory.
    #[command(alias = "ls")]
    List,

    /// Show a saved execution record.
    Show {
        /// Execution ID.
        execution_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_parses_flags() {
        let cli = Cli::try_parse_from([
            "stepwise",
            "--json",
            "-vv",
            "run",
            "flows/onboarding.yaml",
            "--context",
            r#"{"user":"ada"}"#,
            "--execution-id",
            "exec-1",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                workflow,
                context,
                execution_id,
                no_save,
            } => {
                assert_eq!(workflow, "flows/onboarding.yaml");
                assert_eq!(context.as_deref(), Some(r#"{"user":"ada"}"#));
                assert_eq!(execution_id.as_deref(), Some("exec-1"));
                assert!(!no_save);
            }
            _ => panic!("expected run"),
        }
    }
}
