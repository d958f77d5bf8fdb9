//! Stepwise CLI entry point.
//!
//! Binary name: `stepwise`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, wires the
//! circuit breaker manager and action backends, then dispatches to the
//! command handler.

mod cli;
mod state;

use clap::Parser;
use stepwise_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        filter: TracingOptions::filter_for_verbosity(cli.verbose).to_string(),
        format: if cli.json { LogFormat::Json } else { LogFormat::Pretty },
        enable_otel: cli.otel,
    };
    init_tracing(&options).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Validation needs no wiring
    if let Commands::Validate { file } = &cli.command {
        let result = cli::workflow::handle_validate(file, cli.json).await;
        shutdown_tracing();
        return result;
    }

    let state = AppState::init(cli.config.as_deref()).await;

    let result = match cli.command {
        Commands::Run {
            workflow,
            context,
            execution_id,
            no_save,
        } => {
            cli::workflow::handle_run(
                &state,
                &workflow,
                context.as_deref(),
                execution_id,
                !no_save,
                cli.json,
            )
            .await
        }
        Commands::List => cli::workflow::handle_list(&state, cli.json).await,
        Commands::Show { execution_id } => {
            cli::workflow::handle_show(&state, &execution_id, cli.json).await
        }
        Commands::Validate { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
