//! Mock command runner for testing.
//!
//! Responses are matched against the rendered command line. One-shot
//! responses are consumed first, then sticky ones; a command nothing matches
//! succeeds with empty output.

use super::{command_line, CommandError, CommandOutput, CommandRunner};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum Reply {
    Output(String),
    SpawnFailure(String),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    reply: Reply,
    once: bool,
}

/// Mock runner for testing.
#[derive(Debug, Default)]
pub struct MockRunner {
    inner: Arc<Mutex<MockRunnerInner>>,
}

#[derive(Debug, Default)]
struct MockRunnerInner {
    rules: Vec<Rule>,
    calls: Vec<String>,
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command line containing `pattern` with `stdout`.
    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.push(pattern, Reply::Output(stdout.to_string()), false);
    }

    /// Answer the next command line containing `pattern` with `stdout`.
    pub fn respond_once(&self, pattern: &str, stdout: &str) {
        self.push(pattern, Reply::Output(stdout.to_string()), true);
    }

    /// Fail to spawn every command line containing `pattern`.
    pub fn fail_spawn(&self, pattern: &str, reason: &str) {
        self.push(pattern, Reply::SpawnFailure(reason.to_string()), false);
    }

    /// Every command line that was run, in order.
    pub fn calls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Command lines containing `pattern`.
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(pattern))
            .collect()
    }

    fn push(&self, pattern: &str, reply: Reply, once: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
            once,
        });
    }
}

impl Clone for MockRunner {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let line = command_line(program, args);
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(line.clone());

        let index = inner
            .rules
            .iter()
            .position(|rule| rule.once && line.contains(&rule.pattern))
            .or_else(|| {
                inner
                    .rules
                    .iter()
                    .position(|rule| !rule.once && line.contains(&rule.pattern))
            });

        let Some(index) = index else {
            return Ok(CommandOutput::from_stdout(""));
        };
        let reply = if inner.rules[index].once {
            inner.rules.remove(index).reply
        } else {
            match &inner.rules[index].reply {
                Reply::Output(stdout) => Reply::Output(stdout.clone()),
                Reply::SpawnFailure(reason) => Reply::SpawnFailure(reason.clone()),
            }
        };

        match reply {
            Reply::Output(stdout) => Ok(CommandOutput::from_stdout(stdout)),
            Reply::SpawnFailure(reason) => Err(CommandError::Spawn {
                program: program.to_string(),
                reason,
            }),
        }
    }
}
