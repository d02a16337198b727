use super::{child_exit_code, prepare};
use instancectl_config::EnvSettings;
use instancectl_core::user_command;
use instancectl_runtime::{CommandRunner, SystemRunner};
use tracing::info;

/// Prepare the container, then run `command` as `user` with inherited stdio
/// and exit with its status.
pub fn run(env: &EnvSettings, command: &[String], user: &str) -> Result<u8, String> {
    let spec = user_command(command, user).ok_or("missing required argument: command")?;
    prepare(env)?;

    info!("running as {user}: {spec}");
    let result = SystemRunner::attached()
        .run(&spec)
        .map_err(|e| e.to_string())?;
    Ok(child_exit_code(result.exit_code))
}
