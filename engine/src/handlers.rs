//! Command handlers for CLI operations
//!
//! - plan: classify a query and show its plan
//! - search: run the full pipeline and print ranked evidence
//! - config show / validate

use anyhow::{Context, Result};
use sdk::errors::{EngineError, WayfindErrorExt};
use serde_json::json;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::planner::{Plan, QueryContext, QueryPlan};
use crate::retriever::RankedItems;
use crate::session::spawn_sweeper;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Plan a query without calling any search capability
pub async fn handle_plan(query: String, config: &Config, format: OutputFormat) -> Result<()> {
    let (pipeline, _sessions) = Pipeline::from_config(config);
    let plan = pipeline.plan(&QueryContext::new(query)).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print_plan(&plan),
    }
    Ok(())
}

/// Run the full pipeline; Ctrl-C cancels the run
pub async fn handle_search(
    query: String,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let (pipeline, sessions) = Pipeline::from_config(config);

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(sessions, config.session.sweep_interval(), shutdown.clone());

    let cancel = shutdown.child_token();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut context = QueryContext::new(query);
    if let Some(session_id) = session {
        context = context.with_session(session_id);
    }

    let result = pipeline.run(&context, cancel).await;

    signal_task.abort();
    shutdown.cancel();
    sweeper.await.ok();

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{}", failure_hint(&e));
            return Err(anyhow::Error::new(e).context("Search failed"));
        }
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => print_output(&output),
    }
    Ok(())
}

/// Print the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!(
            "{}",
            toml::to_string_pretty(config).context("Failed to serialize config")?
        ),
    }
    Ok(())
}

/// Load and validate a config file without creating one
pub fn handle_config_validate(path: &Path, format: OutputFormat) -> Result<()> {
    let result = Config::load_from_path(path);

    match format {
        OutputFormat::Json => {
            let output = match &result {
                Ok(_) => json!({ "path": path.display().to_string(), "valid": true }),
                Err(e) => json!({
                    "path": path.display().to_string(),
                    "valid": false,
                    "error": format!("{:#}", e),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => match &result {
            Ok(_) => println!("Configuration at {} is valid.", path.display()),
            Err(e) => println!("Configuration at {} is invalid: {:#}", path.display(), e),
        },
    }

    result.map(|_| ()).map_err(Into::into)
}

fn failure_hint(error: &EngineError) -> String {
    if error.is_recoverable() {
        format!("Hint: {} (retrying may help)", error.user_hint())
    } else {
        format!("Hint: {}", error.user_hint())
    }
}

fn print_plan(plan: &QueryPlan) {
    println!("Goal:       {}", plan.goal);
    println!("Ambiguity:  {:?}", plan.ambiguity);
    println!("Cards:      {:?} (max {})", plan.card_role, plan.max_cards);

    match &plan.plan {
        Plan::Single(single) => {
            println!("Vertical:   {}", single.vertical);
            println!("Query:      {}", single.rewritten_query);
            println!("Confidence: {:.2}", single.confidence);
            if single.filters.count() > 0 {
                let filters = serde_json::to_string(&single.filters).unwrap_or_default();
                println!("Filters:    {}", filters);
            }
        }
        Plan::Steps(steps) => {
            println!("Steps:");
            for step in &steps.steps {
                let condition = match (&step.condition_on_step_id, &step.run_if) {
                    (Some(id), Some(run_if)) => format!(" (if {} on {})", run_if, id),
                    (Some(id), None) => format!(" (after {})", id),
                    _ => String::new(),
                };
                println!("  {} {} {}{}", step.id, step.capability, step.input, condition);
            }
        }
    }

    if let Some(question) = &plan.clarification_question {
        println!();
        println!("{}", question);
    }
}

fn print_output(output: &PipelineOutput) {
    print_plan(&output.plan);

    if output.sub_queries.len() > 1 {
        println!();
        println!("Sub-queries:");
        for query in &output.sub_queries {
            println!("  - {}", query);
        }
    }

    for (capability, items) in &output.ranked_items_by_vertical {
        println!();
        println!("{} ({} results):", capability, items.len());
        for line in ranked_lines(items) {
            println!("  {}", line);
        }
    }

    for (capability, error) in &output.failures {
        println!();
        println!("{} unavailable: {}", capability, error.message);
    }

    if !output.skipped_steps.is_empty() {
        println!();
        println!("Skipped steps: {}", output.skipped_steps.join(", "));
    }
}

fn ranked_lines(items: &RankedItems) -> Vec<String> {
    match items {
        RankedItems::Products(list) => list
            .iter()
            .map(|s| {
                let price = s.item.price.as_deref().unwrap_or("-");
                format!("[{:.2}] {} ({})", s.score, s.item.title, price)
            })
            .collect(),
        RankedItems::Hotels(list) => list
            .iter()
            .map(|s| {
                let price = s.item.price.as_deref().unwrap_or("-");
                format!("[{:.2}] {} ({})", s.score, s.item.name, price)
            })
            .collect(),
        RankedItems::Flights(list) => list
            .iter()
            .map(|s| {
                format!(
                    "[{:.2}] {} {} -> {}",
                    s.score, s.item.airline, s.item.origin, s.item.destination
                )
            })
            .collect(),
        RankedItems::Showtimes(list) => list
            .iter()
            .map(|s| {
                let starts = s.item.starts_at.as_deref().unwrap_or("-");
                format!("[{:.2}] {} at {} ({})", s.score, s.item.movie, s.item.theater, starts)
            })
            .collect(),
        RankedItems::Weather(report) => vec![format!("{}: {}", report.location, report.condition)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_hint_marks_recoverable_errors() {
        let busy = EngineError::Backpressure { queued: 20, limit: 20 };
        assert_eq!(
            failure_hint(&busy),
            "Hint: The service is busy. Please try again shortly (retrying may help)"
        );

        let config = EngineError::Config("bad weight".to_string());
        assert_eq!(failure_hint(&config), "Hint: Check your config.toml file for errors");
    }

    #[test]
    fn test_validate_reports_invalid_file_as_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[governor]\nmax_concurrent = 0\n").unwrap();

        assert!(handle_config_validate(&path, OutputFormat::Json).is_err());

        std::fs::write(&path, "[governor]\nmax_concurrent = 2\n").unwrap();
        assert!(handle_config_validate(&path, OutputFormat::Text).is_ok());
    }
}
