//! Real child processes via `tokio::process`.

use super::{command_line, CommandError, CommandOutput, CommandRunner};
use async_trait::async_trait;
use tokio::process::Command;

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command = %command_line(program, args), "running");

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            program,
            status = ?output.status,
            stdout = %output.stdout.trim_end(),
            "command finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let result = ProcessRunner::new()
            .run("flingr-definitely-not-a-program", &[])
            .await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let output = ProcessRunner::new()
            .run("echo", &["started successfully".to_string()])
            .await
            .unwrap();
        assert_eq!(output.status, Some(0));
        assert_eq!(output.stdout.trim_end(), "started successfully");
    }
}
