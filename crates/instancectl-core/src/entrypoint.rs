//! Commands the container entry point hands control to once the config has
//! been prepared.

use instancectl_config::EnvSettings;
use instancectl_runtime::CommandSpec;

pub const SUPERVISORD_CONFIG: &str = "/etc/supervisor/supervisord.conf";
pub const COU_LOGFILE: &str = "/tmp/deployvlogs/cou_update.log";
pub const APP_SOURCE_DIR: &str = "/home/odoo/instance/odoo";
pub const COU_USER: &str = "odoo";

pub fn supervisord_command() -> CommandSpec {
    CommandSpec::new("supervisord").args(["-c", SUPERVISORD_CONFIG])
}

/// The user's command, run as `user`.
///
/// A single argument containing whitespace is treated as a shell command
/// line and handed to `sh -c`; anything else is executed as an argument
/// vector. Returns `None` for an empty command.
pub fn user_command(command: &[String], user: &str) -> Option<CommandSpec> {
    let spec = match command {
        [] => return None,
        [line] if line.split_whitespace().nth(1).is_some() => CommandSpec::shell(line),
        [program, args @ ..] => CommandSpec::new(program.as_str()).args(args.iter().cloned()),
    };
    Some(spec.as_user(user))
}

/// `click-odoo-update` against the reconciled config, optionally limited
/// to one database. `current_pythonpath` is appended after the
/// application sources.
pub fn cou_command(
    env: &EnvSettings,
    db_name: Option<&str>,
    current_pythonpath: Option<&str>,
) -> CommandSpec {
    let pythonpath = match current_pythonpath.filter(|p| !p.is_empty()) {
        Some(rest) => format!("{APP_SOURCE_DIR}:{rest}"),
        None => APP_SOURCE_DIR.to_owned(),
    };

    let mut spec = CommandSpec::new("click-odoo-update")
        .arg("-c")
        .arg(env.config_path.to_string_lossy().into_owned())
        .args(["--logfile", COU_LOGFILE]);
    if let Some(db) = db_name {
        spec = spec.args(["-d", db]);
    }
    spec.env("PYTHONPATH", pythonpath).as_user(COU_USER)
}
