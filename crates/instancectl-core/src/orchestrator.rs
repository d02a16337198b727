use crate::concurrency::{shutdown_requested, InstanceLock};
use crate::settings::InstanceSettings;
use crate::workflow::{run_steps, Workflow, WorkflowKind, WorkflowReport, WorkflowStep};
use crate::CoreError;
use instancectl_runtime::{ArchiveInventory, ArchiveReader, CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Operations requested for one manager invocation. They always run in the
/// order update, restores (as given), rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operations {
    pub update: bool,
    pub restore: Vec<PathBuf>,
    pub rebuild: bool,
}

impl Operations {
    pub fn is_empty(&self) -> bool {
        !self.update && self.restore.is_empty() && !self.rebuild
    }
}

/// Drives the instance lifecycle through a [`CommandRunner`].
pub struct Orchestrator<'a> {
    settings: &'a InstanceSettings,
    runner: &'a dyn CommandRunner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a InstanceSettings, runner: &'a dyn CommandRunner) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &InstanceSettings {
        self.settings
    }

    /// `<compose> -f <file_yml>`, ready for a subcommand.
    fn compose(&self) -> CommandSpec {
        let tokens = self.settings.compose.compose_tokens();
        let (program, leading) = tokens
            .split_first()
            .map_or(("docker-compose", &[][..]), |(p, rest)| (*p, rest));
        CommandSpec::new(program)
            .args(leading.iter().copied())
            .arg("-f")
            .arg(self.settings.compose_file.to_string_lossy().into_owned())
    }

    fn scale_arg(&self, count: u32) -> String {
        format!("{}={count}", self.settings.compose.service)
    }

    fn supervisorctl(&self, action: &str) -> CommandSpec {
        let c = &self.settings.compose;
        self.compose().args([
            "exec",
            "-T",
            c.service.as_str(),
            "supervisorctl",
            action,
            c.supervisor_program.as_str(),
        ])
    }

    pub fn rebuild_plan(&self) -> Workflow {
        let scale = self.settings.compose.scale;
        let mut wf = Workflow::new(WorkflowKind::Rebuild);
        wf.push("stop services", self.compose().arg("down"));
        wf.push(
            "rebuild and start services",
            self.compose()
                .args(["up", "-d", "--build", "--scale"])
                .arg(self.scale_arg(scale)),
        );
        wf
    }

    pub fn update_plan(&self) -> Workflow {
        let c = &self.settings.compose;
        let mut wf = Workflow::new(WorkflowKind::Update);
        wf.push(
            "scale down to one replica",
            self.compose()
                .args(["up", "-d", "--scale"])
                .arg(self.scale_arg(1)),
        );
        wf.push("stop application", self.supervisorctl("stop"));
        wf.push(
            "update all modules",
            self.compose().args([
                "exec",
                "-T",
                "-u",
                c.app_user.as_str(),
                c.service.as_str(),
                c.app_binary.as_str(),
                "-c",
                c.app_config.as_str(),
                "-u",
                "all",
                "--stop-after-init",
            ]),
        );
        wf.push("start application", self.supervisorctl("start"));
        wf.push(
            "scale back up",
            self.compose()
                .args(["up", "-d", "--scale"])
                .arg(self.scale_arg(c.scale)),
        );
        wf
    }

    /// Database and file store steps of a restore, for an extracted backup.
    pub fn restore_data_steps(
        &self,
        db: &str,
        host: &str,
        inventory: &ArchiveInventory,
    ) -> Vec<WorkflowStep> {
        let user = self.settings.compose.db_user.as_str();
        let dump = inventory.dump_file().to_string_lossy().into_owned();
        let target = self.settings.filestore_target(db);
        let target = target.to_string_lossy().into_owned();

        let mut steps = vec![
            WorkflowStep::new(
                "drop database",
                CommandSpec::new("dropdb").args(["-h", host, "-U", user, "--if-exists", db]),
            ),
            WorkflowStep::new(
                "create database",
                CommandSpec::new("createdb").args(["-h", host, "-U", user, db]),
            ),
            WorkflowStep::new(
                "load dump",
                CommandSpec::new("psql").args([
                    "-h",
                    host,
                    "-U",
                    user,
                    "-d",
                    db,
                    "-q",
                    "-v",
                    "ON_ERROR_STOP=1",
                    "-1",
                    "-f",
                    dump.as_str(),
                ]),
            ),
            WorkflowStep::new(
                "create file store",
                CommandSpec::new("mkdir").args(["-p", target.as_str()]),
            ),
        ];

        match inventory.filestore_dir() {
            Some(source) => {
                // Trailing "/." copies the directory's contents, hidden files included.
                let source = format!("{}/.", source.display());
                steps.push(WorkflowStep::new(
                    "copy file store",
                    CommandSpec::new("cp").args(["-rf", source.as_str(), target.as_str()]),
                ));
            }
            None => warn!(
                "backup has no {} directory, skipping file store copy",
                instancectl_runtime::FILESTORE_DIR
            ),
        }
        steps
    }

    fn run_steps(
        &self,
        kind: WorkflowKind,
        steps: &[WorkflowStep],
        report: &mut WorkflowReport,
    ) -> Result<(), CoreError> {
        run_steps(self.runner, kind, steps, report)
    }

    /// Run every step of `workflow` in order, halting on the first failure.
    pub fn execute(&self, workflow: &Workflow) -> Result<WorkflowReport, CoreError> {
        let mut report = WorkflowReport::start(workflow.kind);
        self.run_steps(workflow.kind, &workflow.steps, &mut report)?;
        report.finish();
        info!("{} finished: {} steps", workflow.kind, report.steps.len());
        Ok(report)
    }

    pub fn rebuild(&self) -> Result<WorkflowReport, CoreError> {
        self.execute(&self.rebuild_plan())
    }

    pub fn update(&self) -> Result<WorkflowReport, CoreError> {
        self.execute(&self.update_plan())
    }

    fn database_target(&self) -> Result<(&str, &str), CoreError> {
        let db = self
            .settings
            .db_name
            .as_deref()
            .ok_or(CoreError::MissingArgument("--dbname"))?;
        let host = self
            .settings
            .db_host
            .as_deref()
            .ok_or(CoreError::MissingArgument("--dbhost"))?;
        Ok((db, host))
    }

    fn preflight_restore(&self, archive: &Path) -> Result<ArchiveReader, CoreError> {
        if !archive.is_file() {
            return Err(CoreError::ArchiveNotFound(archive.to_path_buf()));
        }
        Ok(ArchiveReader::detect(archive)?)
    }

    fn scratch_root(&self) -> PathBuf {
        self.settings
            .compose
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Replace the instance's database and file store with a backup, then
    /// run a full update. Returns the restore report followed by the
    /// update report.
    pub fn restore(&self, archive: &Path) -> Result<Vec<WorkflowReport>, CoreError> {
        let kind = WorkflowKind::RestoreDatabase;
        let (db, host) = self.database_target()?;
        let reader = self.preflight_restore(archive)?;
        let service = self.settings.compose.service.as_str();

        let mut report = WorkflowReport::start(kind);
        self.run_steps(
            kind,
            &[WorkflowStep::new(
                "stop service",
                self.compose().args(["stop", service]),
            )],
            &mut report,
        )?;

        let scratch_root = self.scratch_root();
        std::fs::create_dir_all(&scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("instancectl-restore-")
            .tempdir_in(&scratch_root)?;
        debug!("scratch directory {}", scratch.path().display());

        if shutdown_requested() {
            return Err(CoreError::Interrupted {
                workflow: kind,
                completed: report.steps.len(),
            });
        }
        let extract_step = WorkflowStep::new(
            "extract backup",
            reader.extract_command(archive, scratch.path()),
        );
        info!("[{kind} {}] {}", report.next_index(), extract_step.label);
        let inventory = instancectl_runtime::extract(self.runner, archive, scratch.path())?;
        report.record(&extract_step, 0);
        let dump = inventory.require_dump()?;
        debug!("dump file: {}", dump.display());

        let data_steps = self.restore_data_steps(db, host, &inventory);
        self.run_steps(kind, &data_steps, &mut report)?;
        self.run_steps(
            kind,
            &[WorkflowStep::new(
                "start service",
                self.compose().args(["start", service]),
            )],
            &mut report,
        )?;
        report.finish();
        drop(scratch);
        info!("{kind} of {db} from {} finished", archive.display());

        let update = self.update()?;
        Ok(vec![report, update])
    }

    /// Run the requested operations under the instance lock.
    ///
    /// Restore arguments and archives are validated before the first step of
    /// any operation runs.
    pub fn run_operations(&self, ops: &Operations) -> Result<Vec<WorkflowReport>, CoreError> {
        if !ops.restore.is_empty() {
            self.database_target()?;
            for archive in &ops.restore {
                self.preflight_restore(archive)?;
            }
        }

        let lock_path = InstanceLock::path_for_instance(&self.settings.worker_dir);
        let _lock = InstanceLock::try_acquire(&lock_path)?.ok_or_else(|| {
            CoreError::Lock(format!(
                "{} is held by another operation on this instance",
                lock_path.display()
            ))
        })?;

        let mut reports = Vec::new();
        if ops.update {
            reports.push(self.update()?);
        }
        for archive in &ops.restore {
            reports.extend(self.restore(archive)?);
        }
        if ops.rebuild {
            reports.push(self.rebuild()?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ComposeSettings;
    use instancectl_runtime::{ExecutionResult, RecordingRunner, RuntimeError};

    /// Records like [`RecordingRunner`] and drops a `dump.sql` into the
    /// destination of every extraction, standing in for tar/unzip.
    struct ExtractingRunner {
        recorder: RecordingRunner,
    }

    impl ExtractingRunner {
        fn new(recorder: RecordingRunner) -> Self {
            Self { recorder }
        }
    }

    impl std::ops::Deref for ExtractingRunner {
        type Target = RecordingRunner;
        fn deref(&self) -> &RecordingRunner {
            &self.recorder
        }
    }

    impl CommandRunner for ExtractingRunner {
        fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, RuntimeError> {
            if command.program == "tar" || command.program == "unzip" {
                if let Some(dest) = command.args.last() {
                    std::fs::write(Path::new(dest).join("dump.sql"), "SELECT 1;\n")?;
                }
            }
            self.recorder.run(command)
        }
    }

    fn settings(dir: &Path) -> InstanceSettings {
        let compose = ComposeSettings {
            scratch_dir: Some(dir.join("scratch")),
            ..ComposeSettings::default()
        };
        InstanceSettings::new(dir.join("worker"), "/srv/dc.yml")
            .with_database(Some("prod".to_owned()), Some("db1".to_owned()))
            .with_compose(compose)
    }

    #[test]
    fn rebuild_runs_down_then_up() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();
        let report = Orchestrator::new(&s, &runner).rebuild().unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "docker-compose -f /srv/dc.yml down",
                "docker-compose -f /srv/dc.yml up -d --build --scale odoo=3",
            ]
        );
        assert_eq!(report.workflow, WorkflowKind::Rebuild);
        assert_eq!(report.steps.len(), 2);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn update_issues_five_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();
        Orchestrator::new(&s, &runner).update().unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "docker-compose -f /srv/dc.yml up -d --scale odoo=1",
                "docker-compose -f /srv/dc.yml exec -T odoo supervisorctl stop odoo",
                "docker-compose -f /srv/dc.yml exec -T -u odoo odoo /home/odoo/instance/odoo/odoo-bin -c /home/odoo/.openerp_serverrc -u all --stop-after-init",
                "docker-compose -f /srv/dc.yml exec -T odoo supervisorctl start odoo",
                "docker-compose -f /srv/dc.yml up -d --scale odoo=3",
            ]
        );
    }

    #[test]
    fn update_halts_at_failing_step() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new().fail_on_call(3, 255, "module error");
        let err = Orchestrator::new(&s, &runner).update().unwrap_err();

        match err {
            CoreError::StepFailed {
                workflow,
                index,
                exit_code,
                stderr,
                command,
            } => {
                assert_eq!(workflow, WorkflowKind::Update);
                assert_eq!(index, 3);
                assert_eq!(exit_code, 255);
                assert_eq!(stderr, "module error");
                assert!(command.contains("--stop-after-init"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn compose_command_with_subcommand_is_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.compose.compose_command = "docker compose".to_owned();
        let runner = RecordingRunner::new();
        Orchestrator::new(&s, &runner).rebuild().unwrap();

        let first = &runner.calls()[0];
        assert_eq!(first.program, "docker");
        assert_eq!(first.args[..3], ["compose", "-f", "/srv/dc.yml"]);
    }

    #[test]
    fn restore_requires_database_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.tar.gz");
        std::fs::write(&archive, b"").unwrap();
        let mut s = settings(dir.path());
        s.db_host = None;
        let runner = RecordingRunner::new();

        let err = Orchestrator::new(&s, &runner).restore(&archive).unwrap_err();
        assert!(matches!(err, CoreError::MissingArgument("--dbhost")));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn unsupported_archive_fails_before_any_step() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("backup.rar");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();

        let err = Orchestrator::new(&s, &runner).restore(&archive).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Runtime(RuntimeError::UnsupportedFormat(_))
        ));
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join("scratch").exists());
    }

    #[test]
    fn missing_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();
        let err = Orchestrator::new(&s, &runner)
            .restore(&dir.path().join("nope.zip"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ArchiveNotFound(_)));
    }

    #[test]
    fn restore_without_filestore_skips_copy_and_runs_update() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.zip");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner = ExtractingRunner::new(RecordingRunner::new());

        let reports = Orchestrator::new(&s, &runner).restore(&archive).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].workflow, WorkflowKind::RestoreDatabase);
        assert_eq!(reports[1].workflow, WorkflowKind::Update);

        let labels: Vec<_> = reports[0].steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "stop service",
                "extract backup",
                "drop database",
                "create database",
                "load dump",
                "create file store",
                "start service",
            ]
        );

        let lines = runner.command_lines();
        assert_eq!(lines[0], "docker-compose -f /srv/dc.yml stop odoo");
        assert!(lines[1].starts_with("unzip -o -q"));
        assert_eq!(lines[2], "dropdb -h db1 -U odoo --if-exists prod");
        assert_eq!(lines[3], "createdb -h db1 -U odoo prod");
        assert!(lines[4].starts_with("psql -h db1 -U odoo -d prod"));
        assert!(lines[4].ends_with("/dump.sql"));
        assert!(lines.iter().all(|l| !l.starts_with("cp ")));
        assert_eq!(lines.len(), 7 + 5);

        let scratch = dir.path().join("scratch");
        assert_eq!(std::fs::read_dir(scratch).unwrap().count(), 0);
    }

    #[test]
    fn psql_stops_on_first_error_in_one_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.tar.gz");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner = ExtractingRunner::new(RecordingRunner::new());
        Orchestrator::new(&s, &runner).restore(&archive).unwrap();

        let psql = runner
            .calls()
            .into_iter()
            .find(|c| c.program == "psql")
            .unwrap();
        assert!(psql.args.windows(2).any(|w| w == ["-v", "ON_ERROR_STOP=1"]));
        assert!(psql.has_arg("-1"));
        let f = psql.args.iter().position(|a| a == "-f").unwrap();
        assert!(psql.args[f + 1].ends_with("/dump.sql"));
    }

    #[test]
    fn restore_without_dump_stops_before_dropping_database() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.zip");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();

        let err = Orchestrator::new(&s, &runner).restore(&archive).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Runtime(RuntimeError::MissingDump(_))
        ));
        let programs: Vec<_> = runner.calls().into_iter().map(|c| c.program).collect();
        assert_eq!(programs, vec!["docker-compose", "unzip"]);
        assert_eq!(std::fs::read_dir(dir.path().join("scratch")).unwrap().count(), 0);
    }

    #[test]
    fn failed_database_step_reports_restore_index() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.tgz");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner =
            ExtractingRunner::new(RecordingRunner::new().fail_matching("createdb", 1, "already exists"));

        let err = Orchestrator::new(&s, &runner).restore(&archive).unwrap_err();
        assert!(matches!(
            err,
            CoreError::StepFailed {
                workflow: WorkflowKind::RestoreDatabase,
                index: 4,
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(dir.path().join("scratch")).unwrap().count(), 0);
    }

    #[test]
    fn operations_run_update_restore_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("b.tar.bz2");
        std::fs::write(&archive, b"").unwrap();
        let s = settings(dir.path());
        let runner = ExtractingRunner::new(RecordingRunner::new());
        let ops = Operations {
            update: true,
            restore: vec![archive],
            rebuild: true,
        };

        let reports = Orchestrator::new(&s, &runner).run_operations(&ops).unwrap();
        let kinds: Vec<_> = reports.iter().map(|r| r.workflow).collect();
        assert_eq!(
            kinds,
            vec![
                WorkflowKind::Update,
                WorkflowKind::RestoreDatabase,
                WorkflowKind::Update,
                WorkflowKind::Rebuild,
            ]
        );
        assert_eq!(
            runner.command_lines().last().unwrap(),
            "docker-compose -f /srv/dc.yml up -d --build --scale odoo=3"
        );
    }

    #[test]
    fn operations_validate_restores_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let runner = RecordingRunner::new();
        let ops = Operations {
            update: true,
            restore: vec![dir.path().join("missing.tar.gz")],
            rebuild: false,
        };

        let err = Orchestrator::new(&s, &runner).run_operations(&ops).unwrap_err();
        assert!(matches!(err, CoreError::ArchiveNotFound(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn held_instance_lock_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let _held =
            InstanceLock::acquire(&InstanceLock::path_for_instance(&s.worker_dir)).unwrap();
        let runner = RecordingRunner::new();
        let ops = Operations {
            rebuild: true,
            ..Operations::default()
        };

        let err = Orchestrator::new(&s, &runner).run_operations(&ops).unwrap_err();
        assert!(matches!(err, CoreError::Lock(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn empty_operations() {
        assert!(Operations::default().is_empty());
        assert!(!Operations {
            rebuild: true,
            ..Operations::default()
        }
        .is_empty());
    }
}
