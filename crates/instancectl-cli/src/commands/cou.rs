use super::{child_exit_code, prepare};
use instancectl_config::EnvSettings;
use instancectl_core::cou_command;
use instancectl_runtime::{CommandRunner, SystemRunner};
use tracing::info;

pub fn run(env: &EnvSettings, db_name: Option<&str>) -> Result<u8, String> {
    prepare(env)?;

    let pythonpath = std::env::var("PYTHONPATH").ok();
    let command = cou_command(env, db_name, pythonpath.as_deref());
    info!(
        "updating modules{}",
        db_name.map(|d| format!(" of {d}")).unwrap_or_default()
    );
    let result = SystemRunner::attached()
        .run(&command)
        .map_err(|e| e.to_string())?;
    Ok(child_exit_code(result.exit_code))
}
