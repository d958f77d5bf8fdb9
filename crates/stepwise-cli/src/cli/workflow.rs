//! Workflow subcommands: validate, run, list, show.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepwise_core::repository::{DefinitionRepository, ExecutionRepository};
use stepwise_core::workflow::{WorkflowEngine, validate_workflow};
use stepwise_infra::filesystem::load_definition_file;
use stepwise_types::execution::{EngineState, ExecutionRecord, ExecutionResult};
use stepwise_types::workflow::ContextMap;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = load_definition_file(file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let report = validate_workflow(&def);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.valid {
        println!();
        println!(
            "  {} Workflow '{}' is valid ({} steps)",
            style("*").green().bold(),
            style(&def.id).cyan(),
            report.step_count.unwrap_or_default()
        );
        println!();
    } else {
        println!();
        println!(
            "  {} Workflow '{}' is invalid: {}",
            style("x").red().bold(),
            style(&def.id).cyan(),
            report.error.as_deref().unwrap_or_default()
        );
        println!();
    }

    if !report.valid {
        bail!("validation failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

pub async fn handle_run(
    state: &AppState,
    workflow: &str,
    context: Option<&str>,
    execution_id: Option<String>,
    save: bool,
    json: bool,
) -> Result<()> {
    let initial_context = parse_context(context)?;

    let engine = if Path::new(workflow).is_file() {
        let def = load_definition_file(Path::new(workflow))
            .await
            .with_context(|| format!("Failed to load {workflow}"))?;
        WorkflowEngine::from_definition(def, Arc::clone(&state.runner))
    } else {
        WorkflowEngine::load(&state.definitions, workflow, Arc::clone(&state.runner))
            .await
            .with_context(|| {
                format!(
                    "Workflow '{workflow}' is neither a file nor a definition in {}",
                    state.definitions.dir().display()
                )
            })?
    };
    let engine = Arc::new(engine);

    // Ctrl-C stops the run at the next step boundary.
    let stopper = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping execution");
                engine.stop_execution();
            }
        })
    };

    let execution_id = execution_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let result = engine.execute(execution_id, initial_context).await;
    stopper.abort();

    let refused = result.state == EngineState::Loaded;
    if save && !refused {
        engine
            .save_to(&state.executions)
            .await
            .with_context(|| "Failed to save execution record")?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
        print_breakers(state);
        if save && !refused {
            println!(
                "  Record: {}",
                style(
                    state
                        .executions
                        .dir()
                        .join(format!("{}.json", result.execution_id))
                        .display()
                )
                .dim()
            );
            println!();
        }
    }

    if !result.success {
        bail!(
            "Workflow run {}: {}",
            result.state,
            result.error.as_deref().unwrap_or("no error reported")
        );
    }
    Ok(())
}

/// Parse `--context` into a context map. Absent means empty.
fn parse_context(raw: Option<&str>) -> Result<ContextMap> {
    let Some(raw) = raw else {
        return Ok(ContextMap::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw).with_context(|| "Invalid JSON context")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("Context must be a JSON object, got {other}"),
    }
}

fn state_cell(state: EngineState) -> Cell {
    let color = match state {
        EngineState::Completed => Color::Green,
        EngineState::Failed => Color::Red,
        EngineState::Stopped | EngineState::Paused => Color::Yellow,
        _ => Color::Reset,
    };
    Cell::new(state).fg(color)
}

fn print_result(result: &ExecutionResult) {
    println!();
    let marker = if result.success {
        style("*").green().bold()
    } else {
        style("x").red().bold()
    };
    println!(
        "  {} Workflow '{}' {} ({}/{} steps, {:.2}s)",
        marker,
        style(&result.workflow_id).cyan(),
        result.state,
        result.steps_completed,
        result.total_steps,
        result.execution_time_secs
    );
    println!("  Execution ID: {}", result.execution_id);
    println!();

    if !result.step_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Result"),
                Cell::new("Duration"),
                Cell::new("Error"),
            ]);

        for step in &result.step_results {
            let outcome = if step.success {
                Cell::new("ok").fg(Color::Green)
            } else {
                Cell::new("failed").fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(&step.step_id),
                outcome,
                Cell::new(format!("{}ms", step.duration_ms)),
                Cell::new(step.error.as_deref().unwrap_or("-")),
            ]);
        }
        println!("{table}");
        println!();
    }

    if !result.errors.is_empty() && result.step_results.is_empty() {
        for error in &result.errors {
            println!("  {} {error}", style("!").red());
        }
        println!();
    }

    if let Some(context) = &result.final_context {
        if !context.is_empty() {
            println!("  {}", style("Final context").bold());
            for (key, value) in context {
                println!("    {key} = {value}");
            }
            println!();
        }
    }
}

fn print_breakers(state: &AppState) {
    let statuses = state.breakers.statuses();
    if statuses.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Service").fg(Color::Cyan),
            Cell::new("State"),
            Cell::new("Failures"),
            Cell::new("Calls"),
        ]);
    for status in statuses {
        table.add_row(vec![
            Cell::new(&status.service_id),
            Cell::new(status.state),
            Cell::new(format!("{}/{}", status.failure_count, status.max_failures)),
            Cell::new(status.total_calls),
        ]);
    }
    println!("{table}");
    println!();
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let ids = state
        .definitions
        .list_definitions()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list workflows: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
        return Ok(());
    }

    if ids.is_empty() {
        println!();
        println!(
            "  No workflows in {}.",
            state.config.engine.definitions_dir.display()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Workflow").fg(Color::Cyan),
            Cell::new("Steps"),
            Cell::new("Valid"),
        ]);

    for id in &ids {
        match state.definitions.load_definition(id).await {
            Ok(def) => {
                let report = validate_workflow(&def);
                let valid = if report.valid {
                    Cell::new("yes").fg(Color::Green)
                } else {
                    Cell::new(report.error.unwrap_or_default()).fg(Color::Red)
                };
                table.add_row(vec![Cell::new(id), Cell::new(def.steps.len()), valid]);
            }
            Err(e) => {
                table.add_row(vec![
                    Cell::new(id),
                    Cell::new("-"),
                    Cell::new(e.to_string()).fg(Color::Red),
                ]);
            }
        }
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

pub async fn handle_show(state: &AppState, execution_id: &str, json: bool) -> Result<()> {
    let record = state
        .executions
        .get_execution(execution_id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read execution: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("Execution '{execution_id}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &ExecutionRecord) {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let started = record.started_at.map(|t| t.to_rfc3339());
    let completed = record.completed_at.map(|t| t.to_rfc3339());

    table.add_row(vec![Cell::new("Execution").fg(Color::Cyan), Cell::new(&record.execution_id)]);
    table.add_row(vec![Cell::new("Workflow").fg(Color::Cyan), Cell::new(&record.workflow_id)]);
    table.add_row(vec![Cell::new("Status").fg(Color::Cyan), Cell::new(record.status)]);
    table.add_row(vec![
        Cell::new("Steps").fg(Color::Cyan),
        Cell::new(format!("{}/{}", record.steps_completed, record.total_steps)),
    ]);
    table.add_row(vec![
        Cell::new("Started").fg(Color::Cyan),
        Cell::new(started.as_deref().unwrap_or("-")),
    ]);
    table.add_row(vec![
        Cell::new("Completed").fg(Color::Cyan),
        Cell::new(completed.as_deref().unwrap_or("-")),
    ]);

    println!();
    println!("{table}");
    println!();

    for error in &record.errors {
        println!("  {} {error}", style("!").red());
    }
    if !record.errors.is_empty() {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_types::config::StepwiseConfig;
    use tempfile::TempDir;

    fn state_in(tmp: &TempDir) -> AppState {
        let mut config = StepwiseConfig::default();
        config.engine.definitions_dir = tmp.path().join("workflows");
        config.engine.executions_dir = tmp.path().join("executions");
        AppState::from_config(config)
    }

    #[test]
    fn test_parse_context() {
        assert!(parse_context(None).unwrap().is_empty());
        let map = parse_context(Some(r#"{"user":"ada"}"#)).unwrap();
        assert_eq!(map.get("user"), Some(&serde_json::json!("ada")));
        assert!(parse_context(Some("[1,2]")).is_err());
        assert!(parse_context(Some("{oops")).is_err());
    }

    #[tokio::test]
    async fn test_run_file_saves_record() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp);
        let file = tmp.path().join("greet.yaml");
        tokio::fs::write(
            &file,
            r##"
steps:
  - id: type-name
    type: action
    action: type
    target: "#name"
    value: "{{ user }}"
"##,
        )
        .await
        .unwrap();

        handle_run(
            &state,
            file.to_str().unwrap(),
            Some(r#"{"user":"ada"}"#),
            Some("exec-1".to_string()),
            true,
            true,
        )
        .await
        .unwrap();

        let record = state.executions.get_execution("exec-1").await.unwrap().unwrap();
        assert_eq!(record.workflow_id, "greet");
        assert_eq!(record.context.get("last_typed"), Some(&serde_json::json!("ada")));
    }

    #[tokio::test]
    async fn test_run_by_id_from_definitions_dir() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp);
        tokio::fs::create_dir_all(state.definitions.dir()).await.unwrap();
        tokio::fs::write(
            state.definitions.dir().join("pause.json"),
            r#"{"steps":[{"id":"w","type":"wait","duration":0}]}"#,
        )
        .await
        .unwrap();

        handle_run(&state, "pause", None, Some("exec-2".to_string()), false, true)
            .await
            .unwrap();
        assert!(state.executions.get_execution("exec-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_workflow_is_an_error_and_not_saved() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp);
        let file = tmp.path().join("empty.yaml");
        tokio::fs::write(&file, "steps: []\n").await.unwrap();

        assert!(handle_validate(&file, true).await.is_err());
        let err = handle_run(&state, file.to_str().unwrap(), None, Some("exec-3".to_string()), true, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Workflow has no steps"));
        assert!(state.executions.get_execution("exec-3").await.unwrap().is_none());
    }
}
