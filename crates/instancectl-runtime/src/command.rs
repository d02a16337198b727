use crate::{lookup_user, RuntimeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, trace};

fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return s.to_owned();
    }
    // Single-quoting in POSIX shell: replace ' with '\'' then wrap in '
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// One external command: a program and its arguments as discrete tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    /// Run as this system user instead of the current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            user: None,
        }
    }

    /// `sh -c <script>`: the only path that gets shell word splitting and globbing.
    pub fn shell(script: &str) -> Self {
        Self::new("sh").args(["-c", script])
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Whether any token equals `needle`. Handy for matching in tests and logs.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Outcome of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Exit code of a child; death by signal maps to the shell's `128 + signo`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

/// Runs external commands to completion, blocking the caller.
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, RuntimeError>;

    fn run_via_shell(&self, script: &str) -> Result<ExecutionResult, RuntimeError> {
        self.run(&CommandSpec::shell(script))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Collect stdout and stderr into the result.
    #[default]
    Captured,
    /// Share the parent's terminal; the result carries no output.
    Attached,
}

/// Spawns real child processes without a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    mode: OutputMode,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured() -> Self {
        Self {
            mode: OutputMode::Captured,
        }
    }

    pub fn attached() -> Self {
        Self {
            mode: OutputMode::Attached,
        }
    }

    fn build(command: &CommandSpec) -> Result<Command, RuntimeError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (k, v) in &command.env {
            cmd.env(k, v);
        }
        if let Some(user) = &command.user {
            let ids = lookup_user(user)?;
            debug!("running as {user} ({}:{})", ids.uid, ids.gid);
            cmd.gid(ids.gid).uid(ids.uid);
        }
        Ok(cmd)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, RuntimeError> {
        debug!("exec: {command}");
        let mut cmd = Self::build(command)?;
        let spawn_err = |source| RuntimeError::Spawn {
            program: command.program.clone(),
            source,
        };

        let result = match self.mode {
            OutputMode::Captured => {
                let output = cmd.stdin(Stdio::null()).output().map_err(spawn_err)?;
                ExecutionResult {
                    exit_code: exit_code(output.status),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            OutputMode::Attached => {
                let status = cmd.status().map_err(spawn_err)?;
                ExecutionResult {
                    exit_code: exit_code(status),
                    stdout: String::new(),
                    stderr: String::new(),
                }
            }
        };

        trace!("exit code {} from {}", result.exit_code, command.program);
        Ok(result)
    }
}
