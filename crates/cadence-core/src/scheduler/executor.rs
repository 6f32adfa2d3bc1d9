//! Task execution strategies
//!
//! Every strategy ends in the bounded runner; infrastructure failures are
//! reported as exit code `-1` instead of errors.

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::runner::{run_bounded, FAILED_EXIT_CODE};
use super::types::{Result, SchedulerError, Task, TaskAction};
use crate::metrics::{MetricsCollector, SysinfoCollector, SystemMetrics};

/// Turns a goal and a system snapshot into a single shell command
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandGenerator: Send + Sync {
    /// Generate the command for `goal`
    async fn generate(&self, goal: &str, metrics: &SystemMetrics) -> Result<String>;
}

/// Runs tasks according to their action
pub struct TaskExecutor {
    metrics: Arc<dyn MetricsCollector>,
    generator: Option<Arc<dyn CommandGenerator>>,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor {
    /// Create an executor with the `sysinfo` collector and no generator
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(SysinfoCollector::new()),
            generator: None,
        }
    }

    /// Replace the metrics collector
    pub fn with_metrics_collector(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the command generator used by AI-dynamic tasks
    pub fn with_generator(mut self, generator: Arc<dyn CommandGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Run `task` once and return its exit code
    pub async fn execute(&self, task: &Task) -> i32 {
        let timeout = match task.max_runtime_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let working_dir = task.working_dir.as_deref().map(Path::new);

        info!("Executing task {} ({}) in {} mode", task.id, task.name, task.action.mode());

        let exit_code = match &task.action {
            TaskAction::Command { command } => {
                if command.trim().is_empty() {
                    warn!("Task {} has an empty command", task.id);
                    return FAILED_EXIT_CODE;
                }
                run_bounded(command, working_dir, timeout).await.exit_code()
            }
            TaskAction::Script { content } => match write_script(content) {
                Ok(path) => {
                    let command = shell_quote(&path.to_string_lossy());
                    let code = run_bounded(&command, working_dir, timeout).await.exit_code();
                    if let Err(e) = path.close() {
                        warn!("Failed to remove script file: {}", e);
                    }
                    code
                }
                Err(e) => {
                    error!("Task {}: {}", task.id, e);
                    FAILED_EXIT_CODE
                }
            },
            TaskAction::AiDynamic { prompt, metrics } => {
                match self.generate_command(prompt, metrics).await {
                    Ok(command) => {
                        info!("Task {} generated command: {}", task.id, command);
                        let command = wrap_notify_send(&command, task);
                        run_bounded(&command, working_dir, timeout).await.exit_code()
                    }
                    Err(e) => {
                        error!("Task {}: {}", task.id, e);
                        FAILED_EXIT_CODE
                    }
                }
            }
        };

        debug!("Task {} exited with {}", task.id, exit_code);
        exit_code
    }

    async fn generate_command(&self, goal: &str, spec: &str) -> Result<String> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            SchedulerError::Execution("no command generator configured".to_string())
        })?;
        let snapshot = self.metrics.collect(spec).await?;
        let command = generator.generate(goal, &snapshot).await?;
        let command = command.trim();
        if command.is_empty() {
            return Err(SchedulerError::Execution(
                "command generator returned nothing".to_string(),
            ));
        }
        Ok(command.to_string())
    }
}

/// Write `content` to an executable temp file. The file is removed when the
/// returned path is dropped or closed.
fn write_script(content: &str) -> Result<tempfile::TempPath> {
    let io_err = |e: std::io::Error| SchedulerError::Execution(format!("script file: {}", e));
    let mut file = tempfile::Builder::new()
        .prefix("cadence-script-")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755))
            .map_err(io_err)?;
    }

    // Closes the write handle so the kernel lets us exec the file
    Ok(file.into_temp_path())
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Fall back to a printed line when `notify-send` is not installed.
///
/// The command sits on its own lines so trailing comments, background `&`
/// and heredocs keep their meaning. The task name is quoted literally.
fn wrap_notify_send(command: &str, task: &Task) -> String {
    if !command.contains("notify-send") {
        return command.to_string();
    }
    let fallback = shell_quote(&format!(
        "NOTIFY: Task {} ({}) notification",
        task.id, task.name
    ));
    format!(
        "if command -v notify-send >/dev/null 2>&1; then\n{}\nelse\nprintf '%s\\n' {}\nfi",
        command, fallback
    )
}
