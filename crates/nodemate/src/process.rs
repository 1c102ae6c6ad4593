//! Bounded subprocess execution.
//!
//! Used for short probes such as `node --version`. Every call is wrapped in a
//! timeout and the child is killed if the deadline passes.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Deadline for version probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Run `program` to completion and return its trimmed output.
///
/// Non-zero exit is reported as [`CommandError::Failed`].
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?,
        // Dropping the output future drops the child, which kills it.
        Err(_) => {
            debug!(program, "command timed out");
            return Err(CommandError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }
    };

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code(),
    };

    if !result.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            code: result.exit_code,
            stderr: result.stderr,
        });
    }

    debug!(program, stdout = %result.stdout, "command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_trimmed_stdout() {
        let output = run("echo", &["v20.11.0"], None, PROBE_TIMEOUT).await.unwrap();
        assert_eq!(output.stdout, "v20.11.0");
        assert!(output.success());
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = run("pwd", &[], Some(dir.path()), PROBE_TIMEOUT).await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            Path::new(&output.stdout).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run("nodemate-no-such-binary", &[], None, PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let err = run("false", &[], None, PROBE_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, CommandError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = run("sleep", &["5"], None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert_eq!(err.to_string(), "sleep timed out after 100ms");
    }
}
