use super::SqliteTaskStore;
use crate::scheduler::types::{Result, SchedulerError};

impl SqliteTaskStore {
    /// Create the schema if it does not exist yet
    pub(super) async fn migrate(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                action_json TEXT NOT NULL,
                schedule_json TEXT NOT NULL,
                working_dir TEXT,
                max_runtime_secs INTEGER NOT NULL DEFAULT 0,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL,
                last_run_at TIMESTAMP,
                next_run_at TIMESTAMP,
                exit_code INTEGER NOT NULL DEFAULT 0,
                dep_behavior TEXT NOT NULL DEFAULT 'all_success'
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| SchedulerError::Transaction(format!("Migration failed (tasks): {}", e)))?;

        // depends_on may name a task that no longer exists
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id INTEGER NOT NULL,
                depends_on INTEGER NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (task_id, depends_on),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            SchedulerError::Transaction(format!("Migration failed (task_dependencies): {}", e))
        })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_dependencies_target ON task_dependencies(depends_on)",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            SchedulerError::Transaction(format!("Migration failed (idx_dependencies_target): {}", e))
        })?;

        tx.commit()
            .await
            .map_err(|e| SchedulerError::Transaction(e.to_string()))?;

        Ok(())
    }
}
