//! Stride CLI - Command-line interface for the local-first shoe and run log
//!
//! Every command works offline against the local replica; `stride sync`
//! reconciles it with the remote API configured through `STRIDE_API_URL`.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ErrorCommands};
use crate::commands::collections::run_collections;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::conflicts::run_conflicts;
use crate::commands::runs::run_runs;
use crate::commands::shoes::run_shoes;
use crate::commands::status::{run_errors_clear, run_status};
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stride=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Collections { command } => run_collections(command, &db_path).await?,
        Commands::Shoes { command } => run_shoes(command, &db_path).await?,
        Commands::Runs { command } => run_runs(command, &db_path).await?,
        Commands::Sync { strategy } => {
            run_sync(strategy, &db_path).await?;
        }
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Conflicts { command } => run_conflicts(command, &db_path).await?,
        Commands::Errors {
            command: ErrorCommands::Clear,
        } => run_errors_clear(&db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
