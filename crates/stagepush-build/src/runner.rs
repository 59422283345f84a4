//! External packager execution.

use std::process::Stdio;
use std::time::{Duration, Instant};

use stagepush_core::{DeliverError, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::launch::LaunchConfig;

/// Result of one packager run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl RunOutput {
    /// Whether the process exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs packagers as child processes.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run `launch` to completion and report its exit code.
    ///
    /// The exit code is not judged here. Spawn failures and timeouts are
    /// build failures; a timed-out child is killed.
    pub async fn run(launch: &LaunchConfig) -> Result<RunOutput> {
        let start = Instant::now();
        let command_line = launch.display_command();
        info!(command = %command_line, "starting installer build");

        let mut command = Command::new(&launch.executable);
        command
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &launch.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            DeliverError::BuildFailure(format!("cannot start {command_line}: {e}"))
        })?;

        let output = if launch.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(launch.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                DeliverError::BuildFailure(format!(
                    "{command_line} timed out after {} seconds",
                    launch.timeout_secs
                ))
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        };
        debug!(
            exit_code = ?result.exit_code,
            duration_ms,
            stderr = %result.stderr.trim(),
            "installer build finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn launch(exe: &str, args: &[&str], timeout_secs: u64) -> LaunchConfig {
        LaunchConfig {
            executable: PathBuf::from(exe),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
            timeout_secs,
        }
    }

    #[test]
    fn test_run_output_succeeded() {
        let output = RunOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        };
        assert!(output.succeeded());
        assert!(!RunOutput {
            exit_code: None,
            ..output
        }
        .succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output() {
        let result = ProcessRunner::run(&launch("echo", &["hello"], 60))
            .await
            .expect("run failed");
        assert!(result.succeeded());
        assert!(result.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_nonzero_exit() {
        let result = ProcessRunner::run(&launch("sh", &["-c", "exit 3"], 60))
            .await
            .expect("run failed");
        assert_eq!(result.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let err = ProcessRunner::run(&launch("sleep", &["5"], 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliverError::BuildFailure(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_build_failure() {
        let err = ProcessRunner::run(&launch("/definitely/not/a/packager", &[], 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliverError::BuildFailure(_)));
    }
}
