//! Bounded subprocess runner
//!
//! Runs a command line through `sh -c` with all standard streams detached
//! and kills it when the timeout elapses.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code recorded for anything other than a normal process exit
pub const FAILED_EXIT_CODE: i32 = -1;

/// How a bounded run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited normally
    Exited(i32),
    /// The process was terminated by a signal
    Signaled,
    /// The timeout elapsed and the process was killed
    TimedOut,
    /// The process could not be started
    SpawnFailed(String),
}

impl RunOutcome {
    /// Exit code to record on the task
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Exited(code) => *code,
            _ => FAILED_EXIT_CODE,
        }
    }
}

/// Run `command` with the shell, optionally inside `working_dir`.
///
/// A `None` timeout waits for the process indefinitely.
pub async fn run_bounded(
    command: &str,
    working_dir: Option<&Path>,
    timeout: Option<Duration>,
) -> RunOutcome {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn '{}': {}", command, e);
            return RunOutcome::SpawnFailed(e.to_string());
        }
    };

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Command timed out after {:?}, killing it", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out process: {}", e);
                }
                return RunOutcome::TimedOut;
            }
        },
        None => child.wait().await,
    };

    match status {
        Ok(status) => match status.code() {
            Some(code) => {
                debug!("Command exited with {}", code);
                RunOutcome::Exited(code)
            }
            None => RunOutcome::Signaled,
        },
        Err(e) => {
            warn!("Failed to wait for command: {}", e);
            RunOutcome::SpawnFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_exit_codes_pass_through() {
        assert_eq!(run_bounded("exit 0", None, None).await, RunOutcome::Exited(0));
        assert_eq!(run_bounded("exit 3", None, None).await.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = Instant::now();
        let outcome = run_bounded("sleep 10", None, Some(Duration::from_secs(1))).await;
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert_eq!(outcome.exit_code(), FAILED_EXIT_CODE);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_signal_is_failure() {
        let outcome = run_bounded("kill -9 $$", None, None).await;
        assert_eq!(outcome, RunOutcome::Signaled);
        assert_eq!(outcome.exit_code(), FAILED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let outcome = run_bounded("test -f marker", Some(dir.path()), None).await;
        assert_eq!(outcome, RunOutcome::Exited(0));
    }

    #[tokio::test]
    async fn test_missing_working_directory_fails_to_spawn() {
        let outcome = run_bounded("true", Some(Path::new("/nonexistent/cadence")), None).await;
        assert!(matches!(outcome, RunOutcome::SpawnFailed(_)));
        assert_eq!(outcome.exit_code(), FAILED_EXIT_CODE);
    }
}
