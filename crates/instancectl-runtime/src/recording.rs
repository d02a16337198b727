use crate::command::{CommandRunner, CommandSpec, ExecutionResult};
use crate::RuntimeError;
use std::sync::Mutex;

struct ScriptedFailure {
    pattern: String,
    result: ExecutionResult,
}

/// Runner that executes nothing: it records every command and answers with
/// success unless a scripted failure matches.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Vec<ScriptedFailure>,
    fail_at: Option<(usize, ExecutionResult)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose rendered form contains `pattern`.
    #[must_use]
    pub fn fail_matching(mut self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.failures.push(ScriptedFailure {
            pattern: pattern.to_owned(),
            result: ExecutionResult::failure(exit_code, stderr),
        });
        self
    }

    /// Fail the `n`-th command run through this runner (1-based).
    #[must_use]
    pub fn fail_on_call(mut self, n: usize, exit_code: i32, stderr: &str) -> Self {
        self.fail_at = Some((n, ExecutionResult::failure(exit_code, stderr)));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Rendered command lines, in execution order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, RuntimeError> {
        let n = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))?;
            calls.push(command.clone());
            calls.len()
        };

        if let Some((at, result)) = &self.fail_at {
            if *at == n {
                return Ok(result.clone());
            }
        }
        let rendered = command.to_string();
        if let Some(f) = self
            .failures
            .iter()
            .find(|f| rendered.contains(&f.pattern))
        {
            return Ok(f.result.clone());
        }
        Ok(ExecutionResult {
            exit_code: 0,
            stdout: format!("recorded: {rendered}\n"),
            stderr: String::new(),
        })
    }
}
