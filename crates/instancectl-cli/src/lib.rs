//! Shared plumbing for the `instancectl` and `instance-entrypoint` binaries.

pub mod commands;

/// Install the fmt subscriber. `INSTANCECTL_LOG` wins over the flags.
/// Logs go to stderr so `--json` output and child output stay clean.
pub fn init_logging(verbose: bool, trace: bool, default_level: &str) {
    let level = if trace {
        "trace"
    } else if verbose {
        "debug"
    } else {
        default_level
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("INSTANCECTL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Exit quietly when stdout is closed under us (`instancectl ... | head`).
pub fn install_broken_pipe_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));
}
