use crate::concurrency::InstanceLock;
use crate::workflow::{run_steps, WorkflowKind, WorkflowReport, WorkflowStep};
use crate::CoreError;
use instancectl_config::{reconcile_file, seed_config, EnvSettings};
use instancectl_runtime::{CommandRunner, CommandSpec};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// What the container preparation pass changed.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    /// The config file was created from the template on this run.
    pub seeded: bool,
    pub role: String,
    /// Keys written into the config file, sorted.
    pub override_keys: Vec<String>,
    pub config_lines: usize,
    pub workflow: WorkflowReport,
}

/// Ownership and permission fixes for the container. Steps whose target
/// does not exist are left out.
pub fn permission_steps(env: &EnvSettings) -> Vec<WorkflowStep> {
    let owner = format!("{0}:{0}", env.user);
    let mut candidates: Vec<(&str, CommandSpec, std::path::PathBuf)> = vec![
        (
            "open /tmp",
            CommandSpec::new("chmod").args(["ugo+rwxt", "/tmp"]),
            "/tmp".into(),
        ),
        (
            "open supervisor logs",
            CommandSpec::new("chmod").args(["ugo+rw", "/var/log/supervisor"]),
            "/var/log/supervisor".into(),
        ),
    ];

    if let Some(parent) = env
        .filestore_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        candidates.push((
            "own file store parent",
            CommandSpec::new("chown")
                .arg(owner.as_str())
                .arg(parent.to_string_lossy().into_owned()),
            parent.to_path_buf(),
        ));
    }
    candidates.push((
        "own file store",
        CommandSpec::new("chown")
            .arg(owner.as_str())
            .arg(env.filestore_path.to_string_lossy().into_owned()),
        env.filestore_path.clone(),
    ));

    let ssh = env.home_dir().join(".ssh");
    candidates.push((
        "own ssh keys",
        CommandSpec::new("chown")
            .args(["-R", owner.as_str()])
            .arg(ssh.to_string_lossy().into_owned()),
        ssh,
    ));

    candidates
        .into_iter()
        .filter(|(label, _, target)| {
            let present = target.exists();
            if !present {
                debug!("skipping '{label}': {} does not exist", target.display());
            }
            present
        })
        .map(|(label, command, _)| WorkflowStep::new(label, command))
        .collect()
}

fn role_name(env: &EnvSettings) -> String {
    instancectl_config::Role::parse(&env.container_type)
        .map_or_else(|| env.container_type.clone(), |r| r.as_str().to_owned())
}

/// Prepare the container before the application starts: seed and
/// reconcile the server config, create the file store and fix
/// permissions. Safe to run on every start.
pub fn bootstrap_prepare(
    env: &EnvSettings,
    runner: &dyn CommandRunner,
) -> Result<BootstrapReport, CoreError> {
    let kind = WorkflowKind::BootstrapPrepare;
    let mut workflow = WorkflowReport::start(kind);

    let lock_path = InstanceLock::path_for_config(&env.config_path);
    let _lock = InstanceLock::acquire(&lock_path)?;

    let seeded = seed_config(&env.config_path, &env.config_template)?;
    if seeded {
        info!(
            "created {} from {}",
            env.config_path.display(),
            env.config_template.display()
        );
    }

    let overrides = env.desired_overrides();
    let config_lines = reconcile_file(&env.config_path, &overrides)?;
    info!(
        "reconciled {} ({} overrides)",
        env.config_path.display(),
        overrides.len()
    );

    ensure_dir(&env.filestore_path)?;

    if env.skip_permissions {
        info!("skipping permission fixes");
    } else {
        run_steps(runner, kind, &permission_steps(env), &mut workflow)?;
    }
    workflow.finish();

    Ok(BootstrapReport {
        seeded,
        role: role_name(env),
        override_keys: overrides.keys().map(str::to_owned).collect(),
        config_lines,
        workflow,
    })
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    if !path.is_dir() {
        debug!("creating {}", path.display());
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
