//! Cadence Core - Scheduling Engine
//!
//! This crate provides the scheduling and execution core of the Cadence
//! task daemon, including:
//! - Scheduler: task model, cron evaluation, next-run calculation and the poll loop
//! - Execution: command, script and AI-generated command strategies over a
//!   bounded subprocess runner
//! - Store: SQLite persistence of tasks and their dependency edges
//! - Metrics: system snapshots fed to AI command generation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod scheduler;

pub use metrics::{MetricsCollector, SysinfoCollector, SystemMetrics};
pub use scheduler::{
    CommandGenerator, DependencyBehavior, LegacyFrequency, LogNotifier, NotificationSink,
    Schedule, SchedulerConfig, SchedulerEngine, SchedulerError,
    SchedulerResult, SqliteTaskStore, Task, TaskAction, TaskExecutor, TaskId, TaskStore,
};
