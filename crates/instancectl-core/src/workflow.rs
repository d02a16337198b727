use crate::concurrency::shutdown_requested;
use crate::CoreError;
use chrono::Utc;
use instancectl_runtime::{CommandRunner, CommandSpec};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowKind {
    Rebuild,
    Update,
    RestoreDatabase,
    BootstrapPrepare,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rebuild => "rebuild",
            Self::Update => "update",
            Self::RestoreDatabase => "restore-database",
            Self::BootstrapPrepare => "bootstrap-prepare",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    pub label: String,
    pub command: CommandSpec,
}

impl WorkflowStep {
    pub fn new(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

/// An ordered step list. Built up front so it can be shown or inspected
/// before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workflow {
    pub kind: WorkflowKind,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, label: impl Into<String>, command: CommandSpec) {
        self.steps.push(WorkflowStep::new(label, command));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.command.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// 1-based position within the workflow.
    pub index: usize,
    pub label: String,
    pub command: String,
    pub exit_code: i32,
}

/// What a finished workflow did. Timestamps are RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub workflow: WorkflowKind,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub steps: Vec<StepOutcome>,
}

impl WorkflowReport {
    pub fn start(workflow: WorkflowKind) -> Self {
        Self {
            workflow,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    /// Ordinal the next recorded step will get.
    pub fn next_index(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn record(&mut self, step: &WorkflowStep, exit_code: i32) {
        let index = self.next_index();
        self.steps.push(StepOutcome {
            index,
            label: step.label.clone(),
            command: step.command.to_string(),
            exit_code,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now().to_rfc3339());
    }
}

/// Run `steps` in order, appending each success to `report`.
///
/// Halts at the first non-zero exit with [`CoreError::StepFailed`]; later
/// steps are never started. A pending shutdown request is honored before
/// each step.
pub(crate) fn run_steps(
    runner: &dyn CommandRunner,
    kind: WorkflowKind,
    steps: &[WorkflowStep],
    report: &mut WorkflowReport,
) -> Result<(), CoreError> {
    for step in steps {
        let index = report.next_index();
        if shutdown_requested() {
            return Err(CoreError::Interrupted {
                workflow: kind,
                completed: report.steps.len(),
            });
        }

        info!("[{kind} {index}] {}", step.label);
        debug!("running: {}", step.command);
        let result = runner.run(&step.command)?;
        if !result.succeeded() {
            return Err(CoreError::StepFailed {
                workflow: kind,
                index,
                command: step.command.to_string(),
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        report.record(step, result.exit_code);
    }
    Ok(())
}
