//! External process abstraction.
//!
//! The NAT and service controllers drive command-line tools (`upnpc`, the
//! host service manager) and rely only on their textual output. This seam
//! lets tests script that output.

mod mock;
mod process;

pub use mock::MockRunner;
pub use process::ProcessRunner;

use async_trait::async_trait;
use thiserror::Error;

/// Command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to run {program}: {reason}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Why it could not be started.
        reason: String,
    },
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal.
    pub status: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Standard output followed by standard error.
    ///
    /// Tools print confirmations and diagnostics on either stream, so
    /// parsers look at both.
    pub fn text(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs a program to completion and captures its output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and wait for it to exit.
    ///
    /// A non-zero exit status is not an error; callers judge success from
    /// the output.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError>;
}

/// Render a command line for logs.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
