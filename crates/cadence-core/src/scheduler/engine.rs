//! Scheduler execution engine
//!
//! Owns the in-memory task table and the poll loop:
//! - Due tasks are copied out under the table lock and executed outside it
//! - Results are reconciled by task id once execution finishes
//! - A task id is never executed twice at the same time
//! - Every mutation is persisted through the [`TaskStore`]

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dependencies::dependencies_satisfied;
use super::executor::TaskExecutor;
use super::notify::NotificationSink;
use super::store::{SqliteTaskStore, TaskStore};
use super::types::{Result, Schedule, SchedulerError, Task, TaskAction, TaskId};

/// Database file created inside the data directory
pub const DB_FILE_NAME: &str = "tasks.db";

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll interval in seconds
    pub check_interval_secs: u64,
    /// Upper bound on tasks executed in one poll tick
    pub max_tasks_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 1,
            max_tasks_per_tick: 100,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set check interval
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs.max(1);
        self
    }

    /// Set the per-tick execution cap
    pub fn with_max_tasks_per_tick(mut self, max: usize) -> Self {
        self.max_tasks_per_tick = max.max(1);
        self
    }
}

/// Tasks plus the ids currently executing, guarded together
#[derive(Default)]
struct TaskTable {
    tasks: BTreeMap<TaskId, Task>,
    running: HashSet<TaskId>,
}

struct Poller {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Scheduler engine for executing tasks
pub struct SchedulerEngine {
    store: Arc<dyn TaskStore>,
    config: SchedulerConfig,
    table: Mutex<TaskTable>,
    executor: TaskExecutor,
    notifier: Option<Arc<dyn NotificationSink>>,
    poller: Mutex<Option<Poller>>,
}

impl SchedulerEngine {
    /// Create an engine over `store` with an empty table
    pub fn new(store: Arc<dyn TaskStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            table: Mutex::new(TaskTable::default()),
            executor: TaskExecutor::new(),
            notifier: None,
            poller: Mutex::new(None),
        }
    }

    /// Open the SQLite store in `data_dir` and load every task
    pub async fn open(data_dir: &Path, config: SchedulerConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            SchedulerError::Storage(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let store = SqliteTaskStore::from_path(&data_dir.join(DB_FILE_NAME)).await?;
        let engine = Self::new(Arc::new(store), config);
        let count = engine.load().await?;
        info!("Loaded {} tasks from {}", count, data_dir.display());
        Ok(engine)
    }

    /// Set the task executor
    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Set the notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the table with the stored tasks.
    ///
    /// Stored definitions win; when the table holds a more recent run of the
    /// same task, that run's history is kept.
    pub async fn load(&self) -> Result<usize> {
        let stored = self.store.load_all_tasks().await?;
        let now = Utc::now();

        let mut table = self.table.lock().await;
        let mut tasks = BTreeMap::new();
        for mut task in stored {
            let newer_run = table
                .tasks
                .get(&task.id)
                .filter(|current| current.last_run_at > task.last_run_at);
            if let Some(current) = newer_run {
                task.last_run_at = current.last_run_at;
                task.exit_code = current.exit_code;
                task.next_run_at = None;
            }

            if !task.enabled || task.schedule == Schedule::Manual {
                task.next_run_at = None;
            } else if task.next_run_at.is_none() {
                task.refresh_next_run(now);
            }
            tasks.insert(task.id, task);
        }
        table.tasks = tasks;

        debug!("Loaded {} tasks", table.tasks.len());
        Ok(table.tasks.len())
    }

    /// Start the poll loop. Does nothing if it is already running.
    pub async fn start(self: &Arc<Self>) {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            debug!("Scheduler already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { engine.run(token).await });

        *poller = Some(Poller { shutdown, handle });
    }

    /// Stop the poll loop and wait for the current tick to finish.
    /// Does nothing if it is not running.
    pub async fn stop(&self) {
        let Some(poller) = self.poller.lock().await.take() else {
            return;
        };

        poller.shutdown.cancel();
        if let Err(e) = poller.handle.await {
            error!("Scheduler loop terminated abnormally: {}", e);
        }
    }

    async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Scheduler engine starting (check interval {}s)",
            self.config.check_interval_secs
        );

        let check_interval = tokio::time::Duration::from_secs(self.config.check_interval_secs);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    self.run_due_tasks().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler engine shutting down");
                    break;
                }
            }
        }

        info!("Scheduler engine stopped");
    }

    /// Execute every task that is due now and whose dependencies allow it.
    /// Returns the number of tasks executed.
    pub async fn run_due_tasks(&self) -> usize {
        let now = Utc::now();

        let due: Vec<Task> = {
            let mut table = self.table.lock().await;
            let picked: Vec<Task> = table
                .tasks
                .values()
                .filter(|task| {
                    task.is_due(now)
                        && !table.running.contains(&task.id)
                        && dependencies_satisfied(task, &table.tasks)
                })
                .take(self.config.max_tasks_per_tick)
                .cloned()
                .collect();
            for task in &picked {
                table.running.insert(task.id);
            }
            picked
        };

        if due.is_empty() {
            debug!("No tasks due for execution");
            return 0;
        }

        debug!("Executing {} due tasks", due.len());
        let count = due.len();
        for task in due {
            self.run_and_record(task).await;
        }
        count
    }

    /// Run a task that was already marked running, then apply its result
    async fn run_and_record(&self, task: Task) -> i32 {
        let exit_code = self.executor.execute(&task).await;
        let now = Utc::now();

        let updated = {
            let mut table = self.table.lock().await;
            table.running.remove(&task.id);
            table.tasks.get_mut(&task.id).map(|current| {
                current.mark_executed(exit_code, now);
                current.clone()
            })
        };

        let Some(updated) = updated else {
            info!("Task {} was removed while running", task.id);
            return exit_code;
        };

        info!(
            "Task {} ({}) finished with exit code {}",
            updated.id, updated.name, exit_code
        );

        if let Err(e) = self.store.update_task(&updated).await {
            warn!("Failed to persist result of task {}: {}", updated.id, e);
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(&updated, exit_code).await;
        }
        exit_code
    }

    /// Add a task, returning its assigned id
    pub async fn add_task(&self, mut task: Task) -> Result<TaskId> {
        if is_legacy(&task.schedule) {
            return Err(SchedulerError::InvalidConfig(
                "legacy frequency schedules cannot be used for new tasks".to_string(),
            ));
        }
        task.dedup_dependencies();
        let store_next = self.store.next_id().await?;
        let now = Utc::now();

        let id = {
            let mut table = self.table.lock().await;
            let table_next = table.tasks.keys().next_back().map_or(1, |max| max + 1);
            task.id = store_next.max(table_next);
            task.validate()?;
            check_dependencies_exist(&task, &table.tasks)?;

            let keep_next = task.enabled
                && task.schedule != Schedule::Manual
                && task.next_run_at.is_some();
            if !keep_next {
                task.refresh_next_run(now);
            }

            table.tasks.insert(task.id, task.clone());
            task.id
        };

        if let Err(e) = self.store.save_task(&task).await {
            error!("Failed to persist new task {}: {}", id, e);
            self.table.lock().await.tasks.remove(&id);
            return Err(e);
        }

        info!("Added task {} ({})", id, task.name);
        Ok(id)
    }

    /// Remove a task. Dependencies on it in other tasks become dangling.
    pub async fn remove_task(&self, id: TaskId) -> Result<()> {
        if self.table.lock().await.tasks.remove(&id).is_none() {
            return Err(SchedulerError::TaskNotFound(id));
        }

        match self.store.delete_task(id).await {
            Ok(()) => {}
            Err(SchedulerError::TaskNotFound(_)) => {
                debug!("Task {} was never persisted", id);
            }
            Err(e) => return Err(e),
        }

        info!("Removed task {}", id);
        Ok(())
    }

    /// Replace a task's definition. Id, creation time and execution
    /// history of the stored record are kept.
    pub async fn update_task(&self, mut task: Task) -> Result<()> {
        task.dedup_dependencies();
        task.validate()?;
        let now = Utc::now();

        {
            let mut table = self.table.lock().await;
            check_dependencies_exist(&task, &table.tasks)?;
            let current = table
                .tasks
                .get_mut(&task.id)
                .ok_or(SchedulerError::TaskNotFound(task.id))?;
            if is_legacy(&task.schedule) && !is_legacy(&current.schedule) {
                return Err(SchedulerError::InvalidConfig(
                    "cannot switch a task to a legacy frequency schedule".to_string(),
                ));
            }

            task.created_at = current.created_at;
            task.last_run_at = current.last_run_at;
            task.exit_code = current.exit_code;
            task.refresh_next_run(now);
            *current = task.clone();
        }

        self.persist(&task).await
    }

    /// Enable or disable a task
    pub async fn set_task_enabled(&self, id: TaskId, enabled: bool) -> Result<()> {
        let now = Utc::now();
        self.modify(id, |task, _| {
            task.set_enabled(enabled, now);
            Ok(())
        })
        .await
    }

    /// Make `id` depend on `dep`. Both tasks must exist.
    pub async fn add_dependency(&self, id: TaskId, dep: TaskId) -> Result<()> {
        self.modify(id, |task, tasks| {
            if !tasks.contains_key(&dep) {
                return Err(SchedulerError::TaskNotFound(dep));
            }
            task.add_dependency(dep)
        })
        .await
    }

    /// Drop the dependency of `id` on `dep` if present
    pub async fn remove_dependency(&self, id: TaskId, dep: TaskId) -> Result<()> {
        self.modify(id, |task, _| {
            if !task.remove_dependency(dep) {
                debug!("Task {} did not depend on {}", id, dep);
            }
            Ok(())
        })
        .await
    }

    /// Switch the execution mode; the previous mode's payload is discarded
    pub async fn set_exec_mode(&self, id: TaskId, action: TaskAction) -> Result<()> {
        self.modify(id, |task, _| {
            task.action = action;
            Ok(())
        })
        .await
    }

    /// Apply `change` to a copy of the task, store it in the table if the
    /// change succeeds, then persist.
    async fn modify<F>(&self, id: TaskId, change: F) -> Result<()>
    where
        F: FnOnce(&mut Task, &BTreeMap<TaskId, Task>) -> Result<()>,
    {
        let updated = {
            let mut table = self.table.lock().await;
            let mut task = table
                .tasks
                .get(&id)
                .cloned()
                .ok_or(SchedulerError::TaskNotFound(id))?;
            change(&mut task, &table.tasks)?;
            task.validate()?;
            table.tasks.insert(id, task.clone());
            task
        };

        self.persist(&updated).await
    }

    async fn persist(&self, task: &Task) -> Result<()> {
        self.store.update_task(task).await.map_err(|e| {
            warn!("Failed to persist task {}: {}", task.id, e);
            e
        })
    }

    /// Execute a task now, regardless of its schedule
    pub async fn execute_task(&self, id: TaskId) -> Result<i32> {
        let task = {
            let mut table = self.table.lock().await;
            let task = table
                .tasks
                .get(&id)
                .ok_or(SchedulerError::TaskNotFound(id))?;
            if !task.enabled {
                return Err(SchedulerError::TaskDisabled(id));
            }
            if !dependencies_satisfied(task, &table.tasks) {
                return Err(SchedulerError::DependenciesUnsatisfied(id));
            }
            if table.running.contains(&id) {
                return Err(SchedulerError::AlreadyRunning(id));
            }
            let task = task.clone();
            table.running.insert(id);
            task
        };

        Ok(self.run_and_record(task).await)
    }

    /// Write every task to the store, inserting rows that are missing
    pub async fn sync(&self) -> Result<()> {
        let tasks: Vec<Task> = self.table.lock().await.tasks.values().cloned().collect();

        let mut failed = 0;
        for task in &tasks {
            let result = match self.store.update_task(task).await {
                Err(SchedulerError::TaskNotFound(_)) => self.store.save_task(task).await,
                other => other,
            };
            if let Err(e) = result {
                error!("Failed to sync task {}: {}", task.id, e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(SchedulerError::Storage(format!(
                "{} of {} tasks failed to sync",
                failed,
                tasks.len()
            )));
        }

        debug!("Synced {} tasks", tasks.len());
        Ok(())
    }

    /// Get task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.table
            .lock()
            .await
            .tasks
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// List all tasks in id order
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.table.lock().await.tasks.values().cloned().collect()
    }

    /// Get the number of running tasks
    pub async fn running_count(&self) -> usize {
        self.table.lock().await.running.len()
    }
}

fn is_legacy(schedule: &Schedule) -> bool {
    matches!(schedule, Schedule::Legacy { .. })
}

fn check_dependencies_exist(task: &Task, tasks: &BTreeMap<TaskId, Task>) -> Result<()> {
    match task
        .dependencies
        .iter()
        .find(|dep| !tasks.contains_key(dep))
    {
        Some(missing) => Err(SchedulerError::TaskNotFound(*missing)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests;
