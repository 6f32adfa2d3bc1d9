//! Task persistence
//!
//! The scheduler talks to storage through [`TaskStore`]; the SQLite
//! implementation keeps tasks and their ordered dependency edges.

mod migrations;
mod queries;


use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::scheduler::types::{Result, SchedulerError, Task, TaskId};

/// Durable storage for tasks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Next unused task id
    async fn next_id(&self) -> Result<TaskId>;
    /// Insert a task that already carries its id
    async fn save_task(&self, task: &Task) -> Result<()>;
    /// Replace an existing task
    async fn update_task(&self, task: &Task) -> Result<()>;
    /// Delete a task and every dependency edge touching it
    async fn delete_task(&self, id: TaskId) -> Result<()>;
    /// Load every task ordered by id
    async fn load_all_tasks(&self) -> Result<Vec<Task>>;
    /// Load a single task
    async fn get_task(&self, id: TaskId) -> Result<Option<Task>>;
}

/// SQLite-based task store
pub struct SqliteTaskStore {
    pub(super) pool: Pool<Sqlite>,
}

impl SqliteTaskStore {
    /// Open (creating if needed) the database at `path`
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SchedulerError::Storage(format!("Failed to create directory: {}", e))
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }
}
