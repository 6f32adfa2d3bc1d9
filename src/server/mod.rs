//! Server module for Cadence
//!
//! Engine wiring and the daemon runtime.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `adapters`: DeepSeek command generator adapter
//! - `logging`: Tracing subscriber setup
//! - `daemon`: Poll loop, periodic reload and shutdown handling

pub mod adapters;
pub mod config;
mod daemon;
mod loader;
pub mod logging;

use anyhow::{Context, Result};
use cadence_core::{LogNotifier, SchedulerEngine, TaskExecutor};
use std::sync::Arc;

use self::adapters::resolve_command_generator;
use self::config::AppConfig;

// Re-export public API
pub use daemon::run;
pub use loader::load_config;

/// Open the engine in the configured data directory.
///
/// The command generator is only resolved when tasks will execute in this
/// process.
pub async fn build_engine(config: &AppConfig, executes_tasks: bool) -> Result<SchedulerEngine> {
    let data_dir = config.data_dir();

    let mut executor = TaskExecutor::new();
    if executes_tasks {
        if let Some(generator) = resolve_command_generator(&config.ai) {
            executor = executor.with_generator(generator);
        }
    }

    let engine = SchedulerEngine::open(&data_dir, config.scheduler.to_engine_config())
        .await
        .with_context(|| format!("Failed to open task database in {}", data_dir.display()))?
        .with_executor(executor)
        .with_notifier(Arc::new(LogNotifier));

    Ok(engine)
}
