//! Cadence - Persistent Task Scheduler
//!
//! CLI entry point for the Cadence daemon and task management commands.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;

mod cli;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    let mut config = server::load_config()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }

    let is_daemon = matches!(cli.command, Some(cli::Commands::Daemon));
    let log_dir = config.data_dir();
    let _log_guard = server::logging::init_tracing(
        &config.logging,
        is_daemon.then_some(log_dir.as_path()),
    )?;

    cli::run(cli, config).await
}
