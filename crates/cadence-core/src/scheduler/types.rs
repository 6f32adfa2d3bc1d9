//! Scheduler task types and error definitions
//!
//! Contains the task record, its schedule and action variants, and the
//! error type shared by the scheduler modules.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::cron::CronSchedule;
use super::next_run::compute_next_run;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Task identifier. `0` means "not yet assigned".
pub type TaskId = i64;

/// Maximum number of dependencies a single task may declare
pub const MAX_DEPENDENCIES: usize = 10;

/// Longest interval accepted for a legacy custom schedule
pub const MAX_CUSTOM_INTERVAL_SECS: i64 = i32::MAX as i64;

/// Scheduler error types
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Storage could not be prepared or read
    #[error("storage error: {0}")]
    Storage(String),
    /// Transaction error
    #[error("transaction error: {0}")]
    Transaction(String),
    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// Task is disabled
    #[error("task {0} is disabled")]
    TaskDisabled(TaskId),
    /// Dependency policy does not allow the task to run yet
    #[error("dependencies of task {0} are not satisfied")]
    DependenciesUnsatisfied(TaskId),
    /// Task is already executing
    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),
    /// Malformed cron expression
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Task execution error
    #[error("execution error: {0}")]
    Execution(String),
}

/// Frequency of records created before cron and interval schedules existed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyFrequency {
    /// Run a single time
    Once,
    /// Every day at `HHMM`
    Daily,
    /// Every week on weekday `0..=6`
    Weekly,
    /// Every month on the given day
    Monthly,
    /// Every `interval` seconds
    Custom,
}

/// How the next run time of a task is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Only runs when explicitly executed
    Manual,
    /// Fixed interval anchored on the last run
    Interval {
        /// Interval in minutes
        minutes: u32,
    },
    /// Five-field cron expression
    Cron {
        /// Cron expression (minute hour day-of-month month day-of-week)
        expression: String,
    },
    /// Legacy frequency/interval pair
    Legacy {
        /// Frequency kind
        frequency: LegacyFrequency,
        /// Meaning depends on `frequency`
        interval: i64,
    },
}

impl Schedule {
    /// Create an interval schedule
    pub fn interval(minutes: u32) -> Self {
        Schedule::Interval { minutes }
    }

    /// Create a cron schedule
    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
        }
    }

    /// Short human-readable form, used by listings
    pub fn describe(&self) -> String {
        match self {
            Schedule::Manual => "manual".to_string(),
            Schedule::Interval { minutes } => format!("every {}m", minutes),
            Schedule::Cron { expression } => format!("cron '{}'", expression),
            Schedule::Legacy {
                frequency,
                interval,
            } => format!("legacy {:?} ({})", frequency, interval),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Schedule::Manual => Ok(()),
            Schedule::Interval { minutes } => {
                if *minutes == 0 {
                    return Err(SchedulerError::InvalidConfig(
                        "interval must be at least one minute".to_string(),
                    ));
                }
                Ok(())
            }
            Schedule::Cron { expression } => CronSchedule::parse(expression).map(|_| ()),
            Schedule::Legacy {
                frequency,
                interval,
            } => {
                let valid = match frequency {
                    LegacyFrequency::Once => true,
                    LegacyFrequency::Daily => {
                        (0..2400).contains(interval) && interval % 100 < 60
                    }
                    LegacyFrequency::Weekly => (0..=6).contains(interval),
                    LegacyFrequency::Monthly => (1..=31).contains(interval),
                    LegacyFrequency::Custom => (1..=MAX_CUSTOM_INTERVAL_SECS).contains(interval),
                };
                if valid {
                    Ok(())
                } else {
                    Err(SchedulerError::InvalidConfig(format!(
                        "interval {} is not valid for {:?}",
                        interval, frequency
                    )))
                }
            }
        }
    }
}

/// What a task runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskAction {
    /// Run a shell command line
    Command {
        /// Command line passed to `sh -c`
        command: String,
    },
    /// Write the content to a temporary executable and run it
    Script {
        /// Script body, usually starting with a shebang
        content: String,
    },
    /// Ask the command generator for a command based on a goal and a
    /// system snapshot
    AiDynamic {
        /// Natural-language goal
        prompt: String,
        /// Comma-separated metric names (`cpu_load,mem,disk:/`)
        metrics: String,
    },
}

impl TaskAction {
    /// Create a command action
    pub fn command(command: impl Into<String>) -> Self {
        TaskAction::Command {
            command: command.into(),
        }
    }

    /// Create a script action
    pub fn script(content: impl Into<String>) -> Self {
        TaskAction::Script {
            content: content.into(),
        }
    }

    /// Create an AI-dynamic action
    pub fn ai(prompt: impl Into<String>, metrics: impl Into<String>) -> Self {
        TaskAction::AiDynamic {
            prompt: prompt.into(),
            metrics: metrics.into(),
        }
    }

    /// Mode name
    pub fn mode(&self) -> &'static str {
        match self {
            TaskAction::Command { .. } => "command",
            TaskAction::Script { .. } => "script",
            TaskAction::AiDynamic { .. } => "ai",
        }
    }
}

/// Policy deciding whether dependencies allow a task to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyBehavior {
    /// At least one dependency ran and exited with 0
    AnySuccess,
    /// Every dependency ran and exited with 0
    #[default]
    AllSuccess,
    /// At least one dependency ran
    AnyCompletion,
    /// Every dependency ran
    AllCompletion,
}

impl DependencyBehavior {
    /// Storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnySuccess => "any_success",
            Self::AllSuccess => "all_success",
            Self::AnyCompletion => "any_completion",
            Self::AllCompletion => "all_completion",
        }
    }
}

impl fmt::Display for DependencyBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyBehavior {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any_success" => Ok(Self::AnySuccess),
            "all_success" => Ok(Self::AllSuccess),
            "any_completion" => Ok(Self::AnyCompletion),
            "all_completion" => Ok(Self::AllCompletion),
            other => Err(SchedulerError::InvalidConfig(format!(
                "unknown dependency behavior: {}",
                other
            ))),
        }
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task ID, assigned by the scheduler
    pub id: TaskId,
    /// Human-readable task name
    pub name: String,
    /// What the task runs
    pub action: TaskAction,
    /// How the next run is computed
    pub schedule: Schedule,
    /// Working directory for the process, caller's directory when unset
    pub working_dir: Option<String>,
    /// Timeout in seconds, `0` means unbounded
    pub max_runtime_secs: u64,
    /// Whether the task is scheduled
    pub enabled: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last execution timestamp
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next scheduled execution
    pub next_run_at: Option<DateTime<Utc>>,
    /// Exit code of the last execution
    pub exit_code: i32,
    /// Tasks that must have run before this one
    pub dependencies: Vec<TaskId>,
    /// How dependency outcomes are combined
    pub dep_behavior: DependencyBehavior,
}

impl Task {
    /// Create a new enabled, manual task with an empty command
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            action: TaskAction::command(""),
            schedule: Schedule::Manual,
            working_dir: None,
            max_runtime_secs: 0,
            enabled: true,
            created_at: Utc::now(),
            last_run_at: None,
            next_run_at: None,
            exit_code: 0,
            dependencies: Vec::new(),
            dep_behavior: DependencyBehavior::default(),
        }
    }

    /// Set the action
    pub fn with_action(mut self, action: TaskAction) -> Self {
        self.action = action;
        self
    }

    /// Set the schedule
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the timeout
    pub fn with_max_runtime(mut self, secs: u64) -> Self {
        self.max_runtime_secs = secs;
        self
    }

    /// Set the dependency policy
    pub fn with_dependency_behavior(mut self, behavior: DependencyBehavior) -> Self {
        self.dep_behavior = behavior;
        self
    }

    /// Set the enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the task has ever run
    pub fn has_run(&self) -> bool {
        self.last_run_at.is_some()
    }

    /// Whether the last run exited successfully
    pub fn succeeded(&self) -> bool {
        self.has_run() && self.exit_code == 0
    }

    /// Whether the task should run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|next| next <= now)
    }

    /// Add a dependency. Duplicates are accepted without change.
    pub fn add_dependency(&mut self, dep: TaskId) -> Result<()> {
        if dep == self.id {
            return Err(SchedulerError::InvalidConfig(format!(
                "task {} cannot depend on itself",
                dep
            )));
        }
        if self.dependencies.contains(&dep) {
            return Ok(());
        }
        if self.dependencies.len() >= MAX_DEPENDENCIES {
            return Err(SchedulerError::InvalidConfig(format!(
                "task {} already has {} dependencies",
                self.id, MAX_DEPENDENCIES
            )));
        }
        self.dependencies.push(dep);
        Ok(())
    }

    /// Remove a dependency, returning whether it was present
    pub fn remove_dependency(&mut self, dep: TaskId) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| *d != dep);
        self.dependencies.len() != before
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "task name must not be empty".to_string(),
            ));
        }
        self.schedule.validate()?;
        if self.dependencies.len() > MAX_DEPENDENCIES {
            return Err(SchedulerError::InvalidConfig(format!(
                "at most {} dependencies are allowed",
                MAX_DEPENDENCIES
            )));
        }
        if self.id != 0 && self.dependencies.contains(&self.id) {
            return Err(SchedulerError::InvalidConfig(format!(
                "task {} cannot depend on itself",
                self.id
            )));
        }
        Ok(())
    }

    /// Drop repeated dependency ids, keeping the first occurrence
    pub(crate) fn dedup_dependencies(&mut self) {
        let mut seen = Vec::with_capacity(self.dependencies.len());
        self.dependencies.retain(|d| {
            if seen.contains(d) {
                false
            } else {
                seen.push(*d);
                true
            }
        });
    }

    /// Recompute `next_run_at` in local time. History is left untouched.
    pub fn refresh_next_run(&mut self, now: DateTime<Utc>) {
        self.next_run_at = compute_next_run(self, &now.with_timezone(&Local));
    }

    /// Record an execution outcome and schedule the next run
    pub fn mark_executed(&mut self, exit_code: i32, now: DateTime<Utc>) {
        self.last_run_at = Some(now);
        self.exit_code = exit_code;
        self.refresh_next_run(now);
    }

    /// Enable or disable, keeping history
    pub fn set_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        self.enabled = enabled;
        self.refresh_next_run(now);
    }
}
