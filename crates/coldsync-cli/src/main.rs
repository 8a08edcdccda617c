//! coldsync CLI - inspect and drive the offline sync queue
//!
//! Queue operations while the API is down, replay them once it is back, and
//! review the conflicts the replay turned up.

mod cli;
mod commands;
mod config;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::cache::run_cache;
use crate::commands::common::CommandContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::conflicts::run_conflicts;
use crate::commands::operation::{run_enqueue, run_exec};
use crate::commands::queue::run_queue;
use crate::commands::sync::{run_daemon, run_sync};
use crate::config::CliConfig;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "coldsync=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Completions must work without a readable config
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = CliConfig::load().map_err(CliError::Config)?;
    let ctx = CommandContext::resolve(config, cli.db_path.clone())?;

    match cli.command {
        Commands::Enqueue(args) => run_enqueue(&args, &ctx).await?,
        Commands::Exec(args) => run_exec(&args, &ctx).await?,
        Commands::Queue { command } => run_queue(command, &ctx).await?,
        Commands::Sync => run_sync(&ctx).await?,
        Commands::Run {
            interval_secs,
            probe_secs,
        } => run_daemon(interval_secs, probe_secs, &ctx).await?,
        Commands::Cache { command } => run_cache(command, &ctx).await?,
        Commands::Conflicts { command } => run_conflicts(command, &ctx).await?,
        Commands::Config { command } => run_config(command, cli.db_path, &ctx)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
