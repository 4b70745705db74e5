// Wayfind query engine
// Main entry point for the wayfind binary

use clap::Parser;
use std::path::Path;
use wayfind_engine::cli::{Cli, Command, ConfigAction};
use wayfind_engine::config::Config;
use wayfind_engine::handlers::{
    handle_config_show, handle_config_validate, handle_plan, handle_search, OutputFormat,
};
use wayfind_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Plan { query } => {
            let config = load_config(cli.config.as_deref(), cli.log.as_deref())?;
            tracing::info!("Planning query: {}", query);
            handle_plan(query, &config, format).await
        }

        Command::Search { query, session } => {
            let config = load_config(cli.config.as_deref(), cli.log.as_deref())?;
            tracing::info!("Searching: {}", query);
            handle_search(query, session, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref(), cli.log.as_deref())?;
                handle_config_show(&config, format)
            }
            // Reports a broken file instead of failing to load it
            ConfigAction::Validate => {
                init_telemetry_with_level(cli.log.as_deref().unwrap_or("warn"));
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::default_config_path()?,
                };
                handle_config_validate(&path, format)
            }
        },
    }
}

/// Load the config file, then start logging at its level
fn load_config(path: Option<&Path>, log: Option<&str>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_create()?,
    };

    // RUST_LOG still wins over both
    init_telemetry_with_level(log.unwrap_or(&config.core.log_level));
    tracing::debug!("Wayfind v{}", env!("CARGO_PKG_VERSION"));

    Ok(config)
}
