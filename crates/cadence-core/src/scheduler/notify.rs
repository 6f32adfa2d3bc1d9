//! Post-execution notification hook

use async_trait::async_trait;
use tracing::{info, warn};

use super::types::Task;

/// Receives the outcome of every execution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Called after `task` finished with `exit_code`
    async fn notify(&self, task: &Task, exit_code: i32);
}

/// Reports outcomes through the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, task: &Task, exit_code: i32) {
        if exit_code == 0 {
            info!("Task {} ({}) succeeded", task.id, task.name);
        } else {
            warn!(
                "Task {} ({}) failed with exit code {}",
                task.id, task.name, exit_code
            );
        }
    }
}
