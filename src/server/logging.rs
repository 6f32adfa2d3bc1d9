//! Tracing setup
//!
//! Console output always; in daemon mode a daily-rotated `cadence.log`
//! in the data directory as well.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::LoggingConfig;

/// Log file name inside the data directory
pub const LOG_FILE_NAME: &str = "cadence.log";

fn default_filter(level: &str) -> String {
    format!(
        "cadence={level},cadence_core={level},cadence_llm={level}",
        level = level
    )
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
pub fn init_tracing(config: &LoggingConfig, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(default_filter(&config.level))
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let mut guard = None;
    let file_layer = match log_dir.filter(|_| config.file) {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
