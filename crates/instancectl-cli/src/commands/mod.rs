pub mod cou;
pub mod manage;
pub mod run;
pub mod start;

use indicatif::{ProgressBar, ProgressStyle};
use instancectl_config::EnvSettings;
use instancectl_core::{bootstrap_prepare, BootstrapReport, WorkflowReport};
use instancectl_runtime::SystemRunner;
use std::time::Duration;
use tracing::info;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STEP_FAILED: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Exit status for an error message produced by a command.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("config error:")
        || msg.starts_with("settings error:")
        || msg.starts_with("missing required argument:")
    {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with("step ") && msg.contains(" failed with exit code ") {
        EXIT_STEP_FAILED
    } else {
        EXIT_FAILURE
    }
}

/// A child's exit code as our own; codes outside `0..=255` become a generic failure.
pub fn child_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_FAILURE)
}

/// One line per workflow for human output.
pub fn summarize(report: &WorkflowReport) -> String {
    use console::Style;
    let name = Style::new().bold().apply_to(report.workflow.as_str());
    let status = Style::new().green().apply_to("done");
    format!("{name}: {status} ({} steps)", report.steps.len())
}

/// Bootstrap the container before handing off to the real command.
pub fn prepare(env: &EnvSettings) -> Result<BootstrapReport, String> {
    let runner = SystemRunner::captured();
    let report = bootstrap_prepare(env, &runner).map_err(|e| e.to_string())?;
    info!(
        "container prepared: role {}, {} overrides, {} permission steps",
        report.role,
        report.override_keys.len(),
        report.workflow.steps.len()
    );
    Ok(report)
}
