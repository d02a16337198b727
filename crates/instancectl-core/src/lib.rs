//! Orchestration layer for instancectl.
//!
//! This crate composes the config and runtime crates into the instance
//! lifecycle: the `Orchestrator` with its rebuild, update and
//! restore-database workflows, the container `bootstrap_prepare` pass, the
//! entry point's launch commands, settings loading, and the advisory
//! `InstanceLock` plus Ctrl-C handling that keep two operations from
//! interleaving on one instance.

pub mod bootstrap;
pub mod concurrency;
pub mod entrypoint;
pub mod orchestrator;
pub mod settings;
pub mod workflow;

pub use bootstrap::{bootstrap_prepare, permission_steps, BootstrapReport};
pub use concurrency::{install_signal_handler, shutdown_requested, InstanceLock};
pub use entrypoint::{cou_command, supervisord_command, user_command};
pub use orchestrator::{Operations, Orchestrator};
pub use settings::{ComposeSettings, InstanceSettings};
pub use workflow::{StepOutcome, Workflow, WorkflowKind, WorkflowReport, WorkflowStep};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(#[from] instancectl_config::ConfigError),
    #[error("runtime error: {0}")]
    Runtime(#[from] instancectl_runtime::RuntimeError),
    #[error("step {index} of {workflow} failed with exit code {exit_code}: {command}{}", format_stderr(.stderr))]
    StepFailed {
        workflow: WorkflowKind,
        index: usize,
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("backup archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),
    #[error("instance lock: {0}")]
    Lock(String),
    #[error("{workflow} interrupted after {completed} completed steps")]
    Interrupted {
        workflow: WorkflowKind,
        completed: usize,
    },
    #[error("settings error: {0}")]
    Settings(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}
