use super::{child_exit_code, prepare};
use instancectl_config::EnvSettings;
use instancectl_core::supervisord_command;
use instancectl_runtime::{CommandRunner, SystemRunner};
use tracing::info;

pub fn run(env: &EnvSettings) -> Result<u8, String> {
    prepare(env)?;

    let command = supervisord_command();
    info!("starting {command}");
    let result = SystemRunner::attached()
        .run(&command)
        .map_err(|e| e.to_string())?;
    Ok(child_exit_code(result.exit_code))
}
