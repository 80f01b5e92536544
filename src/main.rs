//! Lyra - watershed catchment tracing and data
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use lyra::cli::{commands, Cli, Commands};
use lyra::config::ConfigManager;
use lyra::error::LyraResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LyraResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("lyra=warn"),
        1 => EnvFilter::new("lyra=info"),
        _ => EnvFilter::new("lyra=debug"),
    };

    // Logs go to stderr; stdout carries command output
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config at {}", config_manager.path().display());

    match cli.command {
        Commands::Trace(args) => commands::trace(args, &config).await,
        Commands::Spatial(args) => commands::spatial(args, &config).await,
        Commands::Metrics(args) => commands::metrics(args, &config).await,
        Commands::Hydstra(args) => commands::hydstra(args, &config).await,
        Commands::Cache(args) => commands::cache(args, &config, &config_manager).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}
