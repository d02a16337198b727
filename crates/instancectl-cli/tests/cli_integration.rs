//! CLI subprocess integration tests.
//!
//! These tests invoke the `instancectl` and `instance-entrypoint` binaries
//! with a fake `docker-compose` on `PATH` and verify exit codes, the
//! commands issued, and JSON output.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fake compose executable that logs its arguments and fails on demand.
struct FakeCompose {
    dir: tempfile::TempDir,
}

impl FakeCompose {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let script = bin.join("docker-compose");
        fs::write(
            &script,
            r#"#!/bin/sh
echo "$*" >> "$FAKE_COMPOSE_LOG"
case "$*" in
  *"$FAKE_COMPOSE_FAIL_ON"*)
    if [ -n "$FAKE_COMPOSE_FAIL_ON" ]; then
      echo "simulated failure" >&2
      exit 4
    fi
    ;;
esac
exit 0
"#,
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("compose.log")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn path_env(&self) -> String {
        let current = std::env::var("PATH").unwrap_or_default();
        format!("{}:{current}", self.dir.path().join("bin").display())
    }
}

fn instancectl(fake: &FakeCompose) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_instancectl"));
    cmd.env("PATH", fake.path_env())
        .env("FAKE_COMPOSE_LOG", fake.log_path())
        .env("INSTANCECTL_SKIP_PREREQS", "1")
        .env_remove("INSTANCECTL_LOG");
    cmd
}

fn worker_args(worker: &Path) -> Vec<String> {
    vec![
        "-w".to_owned(),
        worker.display().to_string(),
        "-f".to_owned(),
        worker.join("docker-compose.yml").display().to_string(),
    ]
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_instancectl"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("instancectl"));
}

#[test]
fn cli_requires_an_operation() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let output = instancectl(&fake)
        .args(worker_args(worker.path()))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(fake.calls().is_empty());
}

#[test]
fn rebuild_issues_down_then_up() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let output = instancectl(&fake)
        .args(worker_args(worker.path()))
        .arg("--rebuild")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "rebuild must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let compose_file = worker.path().join("docker-compose.yml");
    assert_eq!(
        fake.calls(),
        vec![
            format!("-f {} down", compose_file.display()),
            format!("-f {} up -d --build --scale odoo=3", compose_file.display()),
        ]
    );
}

#[test]
fn update_failure_exits_with_step_code() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let output = instancectl(&fake)
        .env("FAKE_COMPOSE_FAIL_ON", "--stop-after-init")
        .args(worker_args(worker.path()))
        .args(["--update", "--rebuild"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("step 3 of update failed with exit code 4"));
    assert!(stderr.contains("simulated failure"));
    assert_eq!(fake.calls().len(), 3);
}

#[test]
fn restore_without_dbname_is_a_config_error() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let archive = worker.path().join("backup.tar.gz");
    fs::write(&archive, b"").unwrap();

    let output = instancectl(&fake)
        .args(worker_args(worker.path()))
        .arg("--restoredb")
        .arg(&archive)
        .args(["-s", "db"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--dbname"));
    assert!(fake.calls().is_empty());
}

#[test]
fn json_output_lists_workflow_reports() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let settings = worker.path().join("instancectl.toml");
    fs::write(&settings, "scale = 2\nservice = \"web\"\n").unwrap();

    let output = instancectl(&fake)
        .args(worker_args(worker.path()))
        .arg("--update")
        .arg("--config")
        .arg(&settings)
        .arg("--json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let workflows = json["workflows"].as_array().unwrap();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0]["workflow"], "update");
    assert_eq!(workflows[0]["steps"].as_array().unwrap().len(), 5);
    assert!(fake.calls().last().unwrap().ends_with("up -d --scale web=2"));
}

#[test]
fn invalid_settings_file_exits_with_config_code() {
    let fake = FakeCompose::new();
    let worker = tempfile::tempdir().unwrap();
    let settings = worker.path().join("instancectl.toml");
    fs::write(&settings, "replicas = 2\n").unwrap();

    let output = instancectl(&fake)
        .args(worker_args(worker.path()))
        .arg("--rebuild")
        .arg("--config")
        .arg(&settings)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// Entry point

struct Container {
    dir: tempfile::TempDir,
}

impl Container {
    fn new(template: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("template"), template).unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("home/.openerp_serverrc")
    }

    fn entrypoint(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_instance-entrypoint"));
        cmd.env("ODOO_CONFIG_FILE", self.config_path())
            .env("ODOO_CONFIG_TEMPLATE", self.dir.path().join("template"))
            .env("ODOO_FILESTORE_PATH", self.dir.path().join("data/filestore"))
            .env("INSTANCECTL_SKIP_PERMISSIONS", "1")
            .env_remove("CONTAINER_TYPE")
            .env_remove("INSTANCECTL_LOG");
        cmd
    }
}

fn current_user() -> String {
    let out = Command::new("id").arg("-un").output().unwrap();
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

#[test]
fn entrypoint_run_propagates_exit_code() {
    let container = Container::new("[options]\n");
    let output = container
        .entrypoint()
        .args(["run", "-u", &current_user(), "exit 7"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(container.config_path().exists());
    assert!(container.dir.path().join("data/filestore").is_dir());
}

#[test]
fn entrypoint_run_reconciles_config_first() {
    let container = Container::new("[options]\n; keep me\ndb_host = False\nadmin_passwd = admin\n");
    let output = container
        .entrypoint()
        .env("CONTAINER_TYPE", "WORKER")
        .env("ODOORC_DB_HOST", "postgres")
        .args(["run", "-u", &current_user(), "true"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let content = fs::read_to_string(container.config_path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "[options]");
    assert_eq!(lines[1], "; keep me");
    assert_eq!(lines[2], "db_host = postgres");
    assert!(lines[3].starts_with("admin_passwd = "));
    assert_ne!(lines[3], "admin_passwd = admin");
    assert!(lines.contains(&"http_enable = True"));
    assert!(lines.contains(&"max_cron_threads = 0"));
}

#[test]
fn entrypoint_run_passes_argv_through() {
    let container = Container::new("[options]\n");
    let marker = container.dir.path().join("marker file");
    let output = container
        .entrypoint()
        .args(["run", "-u", &current_user(), "touch"])
        .arg(&marker)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(marker.exists());
}

#[test]
fn entrypoint_missing_template_exits_with_config_code() {
    let container = Container::new("");
    fs::remove_file(container.dir.path().join("template")).unwrap();
    let output = container
        .entrypoint()
        .args(["run", "true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("template"));
}
