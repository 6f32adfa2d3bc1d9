//! CLI module for Cadence
//!
//! Provides commands:
//! - `daemon`: Run the scheduler in the foreground
//! - `list` / `show`: Inspect stored tasks
//! - `add` / `remove` / `schedule` / `set-mode`: Edit task definitions
//! - `run`: Execute a task immediately
//! - `enable` / `disable` / `depend` / `undepend`: Adjust scheduling

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::server::config::AppConfig;

pub mod task;

/// Cadence task scheduler CLI
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(about = "Persistent task scheduler with cron, interval and AI-generated commands")]
#[command(version)]
pub struct Cli {
    /// Data directory holding tasks.db and logs
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Daemon,
    /// List all tasks
    List,
    /// Show one task as JSON
    Show {
        /// Task ID
        id: i64,
    },
    /// Add a task
    Add {
        /// Task name
        name: String,
        #[command(flatten)]
        action: ActionArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
        /// Working directory for the process
        #[arg(long)]
        working_dir: Option<String>,
        /// Timeout in seconds (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        max_runtime: u64,
        /// Task that must run first (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<i64>,
        /// any_success, all_success, any_completion or all_completion
        #[arg(long, default_value = "all_success")]
        dep_behavior: String,
        /// Create the task disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Change how a task is scheduled
    Schedule {
        /// Task ID
        id: i64,
        #[command(flatten)]
        schedule: ScheduleArgs,
        /// Only run when executed explicitly
        #[arg(long, conflicts_with_all = ["interval", "cron"])]
        manual: bool,
    },
    /// Change what a task runs
    SetMode {
        /// Task ID
        id: i64,
        #[command(flatten)]
        action: ActionArgs,
    },
    /// Remove a task
    Remove {
        /// Task ID
        id: i64,
    },
    /// Execute a task now and print its exit code
    Run {
        /// Task ID
        id: i64,
    },
    /// Enable a task
    Enable {
        /// Task ID
        id: i64,
    },
    /// Disable a task
    Disable {
        /// Task ID
        id: i64,
    },
    /// Make a task depend on another
    Depend {
        /// Task ID
        id: i64,
        /// Dependency task ID
        dep: i64,
    },
    /// Remove a dependency
    Undepend {
        /// Task ID
        id: i64,
        /// Dependency task ID
        dep: i64,
    },
}

/// What a task runs; exactly one of the three sources
#[derive(Args, Debug, Clone, Default)]
pub struct ActionArgs {
    /// Shell command line
    #[arg(long, conflicts_with_all = ["script_file", "ai_prompt"])]
    pub command: Option<String>,
    /// File whose content is run as a script
    #[arg(long, conflicts_with = "ai_prompt")]
    pub script_file: Option<PathBuf>,
    /// Goal for AI command generation
    #[arg(long)]
    pub ai_prompt: Option<String>,
    /// Metrics sent with the AI prompt
    #[arg(long, default_value = "cpu_load,mem", requires = "ai_prompt")]
    pub metrics: String,
}

/// When a task runs; manual when neither flag is given
#[derive(Args, Debug, Clone, Default)]
pub struct ScheduleArgs {
    /// Interval in minutes
    #[arg(long, conflicts_with = "cron")]
    pub interval: Option<u32>,
    /// Five-field cron expression
    #[arg(long)]
    pub cron: Option<String>,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Daemon => crate::server::run(config).await,
        other => task::run(other, &config).await,
    }
}
