//! Task scheduler
//!
//! Runs user-defined tasks on a schedule:
//!
//! - **Manual**: only when explicitly executed
//! - **Interval**: every N minutes, anchored on the previous run
//! - **Cron**: five-field cron expressions evaluated in local time
//! - **Legacy**: daily/weekly/monthly/custom frequencies from older records
//!
//! Tasks may depend on other tasks; a dependency policy decides whether
//! the outcomes of those tasks allow a run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ SchedulerEngine │  Task table + poll loop
//! └────────┬────────┘
//!          │
//!          ├──────────────────────┐
//!          ▼                      ▼
//! ┌─────────────────┐    ┌─────────────────┐
//! │  TaskExecutor   │    │    TaskStore    │  SQLite persistence
//! └────────┬────────┘    └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  run_bounded    │  `sh -c` with timeout
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cadence_core::scheduler::{
//!     Schedule, SchedulerConfig, SchedulerEngine, Task, TaskAction,
//! };
//!
//! let engine = Arc::new(SchedulerEngine::open(&data_dir, SchedulerConfig::new()).await?);
//!
//! let task = Task::new("nightly_backup")
//!     .with_action(TaskAction::command("tar czf /backup/home.tgz /home"))
//!     .with_schedule(Schedule::cron("0 3 * * *"));
//! engine.add_task(task).await?;
//!
//! engine.start().await;
//! // ...
//! engine.stop().await;
//! engine.sync().await?;
//! ```

pub mod cron;
mod dependencies;
mod engine;
mod executor;
mod next_run;
mod notify;
pub mod runner;
mod store;
mod types;

pub use dependencies::dependencies_satisfied;
pub use engine::{SchedulerConfig, SchedulerEngine, DB_FILE_NAME};
pub use executor::{CommandGenerator, TaskExecutor};
pub use next_run::compute_next_run;
pub use notify::{LogNotifier, NotificationSink};
pub use store::{SqliteTaskStore, TaskStore};
pub use types::{
    DependencyBehavior, LegacyFrequency, Result as SchedulerResult, Schedule, SchedulerError,
    Task, TaskAction, TaskId, MAX_CUSTOM_INTERVAL_SECS, MAX_DEPENDENCIES,
};
