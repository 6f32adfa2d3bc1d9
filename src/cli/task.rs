//! Task CLI commands
//!
//! Every command opens the engine, applies one operation and exits. A
//! running daemon sees the change on its next reload.

use anyhow::{bail, Context, Result};
use cadence_core::{DependencyBehavior, Schedule, SchedulerEngine, Task, TaskAction};
use chrono::{DateTime, Local, Utc};

use super::{ActionArgs, Commands, ScheduleArgs};
use crate::server::build_engine;
use crate::server::config::AppConfig;

/// Run a task subcommand
pub async fn run(cmd: Commands, config: &AppConfig) -> Result<()> {
    let executes = matches!(cmd, Commands::Run { .. });
    let engine = build_engine(config, executes).await?;

    match cmd {
        Commands::List => list(&engine).await,
        Commands::Show { id } => show(&engine, id).await,
        Commands::Add {
            name,
            action,
            schedule,
            working_dir,
            max_runtime,
            depends_on,
            dep_behavior,
            disabled,
        } => {
            let behavior: DependencyBehavior = dep_behavior.parse()?;
            let mut task = Task::new(name)
                .with_action(action.into_action()?)
                .with_schedule(schedule.into_schedule())
                .with_max_runtime(max_runtime)
                .with_dependency_behavior(behavior)
                .with_enabled(!disabled);
            if let Some(dir) = working_dir {
                task = task.with_working_dir(dir);
            }
            for dep in depends_on {
                task.add_dependency(dep)?;
            }

            let id = engine.add_task(task).await?;
            println!("Added task {}", id);
            Ok(())
        }
        Commands::Schedule {
            id,
            schedule,
            manual,
        } => {
            let mut task = engine.get_task(id).await?;
            task.schedule = if manual {
                Schedule::Manual
            } else {
                schedule.into_schedule()
            };
            let description = task.schedule.describe();
            engine.update_task(task).await?;
            println!("Task {} now runs {}", id, description);
            Ok(())
        }
        Commands::SetMode { id, action } => {
            let action = action.into_action()?;
            let mode = action.mode();
            engine.set_exec_mode(id, action).await?;
            println!("Task {} now runs in {} mode", id, mode);
            Ok(())
        }
        Commands::Remove { id } => {
            engine.remove_task(id).await?;
            println!("Removed task {}", id);
            Ok(())
        }
        Commands::Run { id } => {
            let code = engine.execute_task(id).await?;
            println!("Task {} exited with {}", id, code);
            Ok(())
        }
        Commands::Enable { id } => {
            engine.set_task_enabled(id, true).await?;
            println!("Enabled task {}", id);
            Ok(())
        }
        Commands::Disable { id } => {
            engine.set_task_enabled(id, false).await?;
            println!("Disabled task {}", id);
            Ok(())
        }
        Commands::Depend { id, dep } => {
            engine.add_dependency(id, dep).await?;
            println!("Task {} now depends on {}", id, dep);
            Ok(())
        }
        Commands::Undepend { id, dep } => {
            engine.remove_dependency(id, dep).await?;
            println!("Task {} no longer depends on {}", id, dep);
            Ok(())
        }
        Commands::Daemon => bail!("daemon is not a task command"),
    }
}

impl ActionArgs {
    /// Resolve the flags into an action, reading the script file if given
    pub fn into_action(self) -> Result<TaskAction> {
        if let Some(command) = self.command {
            return Ok(TaskAction::command(command));
        }
        if let Some(path) = self.script_file {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            return Ok(TaskAction::script(content));
        }
        if let Some(prompt) = self.ai_prompt {
            return Ok(TaskAction::ai(prompt, self.metrics));
        }
        bail!("one of --command, --script-file or --ai-prompt is required")
    }
}

impl ScheduleArgs {
    /// Interval wins over cron; neither means manual
    pub fn into_schedule(self) -> Schedule {
        match (self.interval, self.cron) {
            (Some(minutes), _) => Schedule::interval(minutes),
            (None, Some(expression)) => Schedule::cron(expression),
            (None, None) => Schedule::Manual,
        }
    }
}

async fn list(engine: &SchedulerEngine) -> Result<()> {
    let tasks = engine.list_tasks().await;

    if tasks.is_empty() {
        println!("No tasks.");
        println!("  Add one: cadence add backup --command \"tar czf /tmp/etc.tgz /etc\" --cron \"0 3 * * *\"");
        return Ok(());
    }

    println!(
        "{:>4}  {:3}  {:20}  {:7}  {:24}  {:16}  {:>4}",
        "ID", "ON", "NAME", "MODE", "SCHEDULE", "NEXT RUN", "EXIT"
    );
    for task in &tasks {
        let exit = if task.has_run() {
            task.exit_code.to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:>4}  {:3}  {:20}  {:7}  {:24}  {:16}  {:>4}",
            task.id,
            if task.enabled { "yes" } else { "no" },
            truncate(&task.name, 20),
            task.action.mode(),
            truncate(&task.schedule.describe(), 24),
            format_time(task.next_run_at),
            exit
        );
    }
    Ok(())
}

async fn show(engine: &SchedulerEngine, id: i64) -> Result<()> {
    let task = engine.get_task(id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
