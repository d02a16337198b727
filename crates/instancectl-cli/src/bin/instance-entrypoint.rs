use clap::{Parser, Subcommand};
use instancectl_cli::commands::{self, exit_code_for};
use instancectl_config::EnvSettings;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "instance-entrypoint",
    version,
    about = "Prepare the container's config and start the application"
)]
struct Cli {
    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the process supervisor (the default).
    Start,
    /// Run a command as the given user.
    Run {
        /// User to run the command as.
        #[arg(short, long, default_value = "root")]
        user: String,
        /// Command and arguments; a single quoted string is run through `sh -c`.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Update installed modules with click-odoo-update.
    Cou {
        /// Limit the update to this database.
        #[arg(short = 'd', long = "db_name")]
        db_name: Option<String>,
    },
}

fn main() -> ExitCode {
    instancectl_cli::install_broken_pipe_hook();

    let cli = Cli::parse();
    instancectl_cli::init_logging(cli.verbose, cli.trace, "info");

    let env = EnvSettings::from_env();
    let result = match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => commands::start::run(&env),
        Commands::Run { user, command } => commands::run::run(&env, &command, &user),
        Commands::Cou { db_name } => commands::cou::run(&env, db_name.as_deref()),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
