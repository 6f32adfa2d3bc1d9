use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};
use std::collections::HashMap;

use super::{SqliteTaskStore, TaskStore};
use crate::scheduler::types::{Result, SchedulerError, Task, TaskId};

/// Database row for a task, without its dependencies
#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    name: String,
    action_json: String,
    schedule_json: String,
    working_dir: Option<String>,
    max_runtime_secs: i64,
    enabled: bool,
    created_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    exit_code: i32,
    dep_behavior: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = SchedulerError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: row.id,
            name: row.name,
            action: serde_json::from_str(&row.action_json)?,
            schedule: serde_json::from_str(&row.schedule_json)?,
            working_dir: row.working_dir,
            max_runtime_secs: u64::try_from(row.max_runtime_secs).unwrap_or(0),
            enabled: row.enabled,
            created_at: row.created_at,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            exit_code: row.exit_code,
            dependencies: Vec::new(),
            dep_behavior: row.dep_behavior.parse()?,
        })
    }
}

fn runtime_column(task: &Task) -> i64 {
    i64::try_from(task.max_runtime_secs).unwrap_or(i64::MAX)
}

async fn write_dependencies(tx: &mut Transaction<'_, Sqlite>, task: &Task) -> Result<()> {
    sqlx::query("DELETE FROM task_dependencies WHERE task_id = ?")
        .bind(task.id)
        .execute(&mut **tx)
        .await?;

    for (position, dep) in task.dependencies.iter().enumerate() {
        sqlx::query(
            "INSERT INTO task_dependencies (task_id, depends_on, position) VALUES (?, ?, ?)",
        )
        .bind(task.id)
        .bind(*dep)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl SqliteTaskStore {
    async fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let deps: Vec<(i64,)> = sqlx::query_as(
            "SELECT depends_on FROM task_dependencies WHERE task_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(deps.into_iter().map(|(d,)| d).collect())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn next_id(&self) -> Result<TaskId> {
        let (next,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(id), 0) + 1 FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(next)
    }

    async fn save_task(&self, task: &Task) -> Result<()> {
        let action_json = serde_json::to_string(&task.action)?;
        let schedule_json = serde_json::to_string(&task.schedule)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, name, action_json, schedule_json, working_dir,
                max_runtime_secs, enabled, created_at, last_run_at, next_run_at,
                exit_code, dep_behavior
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(action_json)
        .bind(schedule_json)
        .bind(&task.working_dir)
        .bind(runtime_column(task))
        .bind(task.enabled)
        .bind(task.created_at)
        .bind(task.last_run_at)
        .bind(task.next_run_at)
        .bind(task.exit_code)
        .bind(task.dep_behavior.as_str())
        .execute(&mut *tx)
        .await?;

        write_dependencies(&mut tx, task).await?;

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let action_json = serde_json::to_string(&task.action)?;
        let schedule_json = serde_json::to_string(&task.schedule)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                name = ?, action_json = ?, schedule_json = ?, working_dir = ?,
                max_runtime_secs = ?, enabled = ?, last_run_at = ?, next_run_at = ?,
                exit_code = ?, dep_behavior = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.name)
        .bind(action_json)
        .bind(schedule_json)
        .bind(&task.working_dir)
        .bind(runtime_column(task))
        .bind(task.enabled)
        .bind(task.last_run_at)
        .bind(task.next_run_at)
        .bind(task.exit_code)
        .bind(task.dep_behavior.as_str())
        .bind(task.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound(task.id));
        }

        write_dependencies(&mut tx, task).await?;

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        sqlx::query("DELETE FROM task_dependencies WHERE task_id = ? OR depends_on = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound(id));
        }

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn load_all_tasks(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let edges: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT task_id, depends_on FROM task_dependencies ORDER BY task_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut deps: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (task_id, depends_on) in edges {
            deps.entry(task_id).or_default().push(depends_on);
        }

        rows.into_iter()
            .map(|row| -> Result<Task> {
                let mut task: Task = row.try_into()?;
                task.dependencies = deps.remove(&task.id).unwrap_or_default();
                Ok(task)
            })
            .collect()
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut task: Task = row.try_into()?;
                task.dependencies = self.dependencies_of(id).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }
}
