use clap::{ArgGroup, Parser};
use instancectl_cli::commands::{self, exit_code_for};
use instancectl_core::{install_signal_handler, InstanceSettings, Operations};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "instancectl",
    version,
    about = "Rebuild, update and restore a containerized Odoo instance"
)]
#[command(group(
    ArgGroup::new("operation")
        .required(true)
        .multiple(true)
        .args(["update", "restoredb", "rebuild"])
))]
struct Cli {
    /// Working directory of the instance.
    #[arg(short = 'w', long = "worker-dir")]
    worker_dir: PathBuf,

    /// Compose file describing the instance's services.
    #[arg(short = 'f', long = "file_yml")]
    file_yml: PathBuf,

    /// Restore database and file store from this backup (repeatable).
    #[arg(long = "restoredb", value_name = "ARCHIVE")]
    restoredb: Vec<PathBuf>,

    /// Update all modules of the instance.
    #[arg(long, default_value_t = false)]
    update: bool,

    /// Tear down and rebuild the instance's services.
    #[arg(long, default_value_t = false)]
    rebuild: bool,

    /// Database to restore into.
    #[arg(short = 'd', long = "dbname")]
    dbname: Option<String>,

    /// PostgreSQL host to restore to.
    #[arg(short = 's', long = "dbhost")]
    dbhost: Option<String>,

    /// TOML settings file (compose command, service, scale, users, paths).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output workflow reports as structured JSON.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false)]
    trace: bool,
}

fn main() -> ExitCode {
    instancectl_cli::install_broken_pipe_hook();

    let cli = Cli::parse();
    instancectl_cli::init_logging(cli.verbose, cli.trace, "warn");
    install_signal_handler();

    let result = commands::manage::load_compose_settings(cli.config.as_deref()).and_then(|compose| {
        let settings = InstanceSettings::new(cli.worker_dir, cli.file_yml)
            .with_database(cli.dbname, cli.dbhost)
            .with_compose(compose);
        let ops = Operations {
            update: cli.update,
            restore: cli.restoredb,
            rebuild: cli.rebuild,
        };
        commands::manage::run(&settings, &ops, cli.json)
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
