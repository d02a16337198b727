use crate::ArchiveReader;
use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

pub fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Tools the instance manager shells out to. Database tools are only
/// required when a restore was requested, and only the extractor each
/// requested archive format needs is checked.
pub fn check_manager_prereqs(
    compose_command: &str,
    restore_formats: &[ArchiveReader],
) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists(compose_command) {
        missing.push(MissingPrereq {
            name: compose_command.to_owned(),
            purpose: "starting, scaling and stopping the instance's services",
            install_hint: "apt install docker-compose | pip install docker-compose",
        });
    }

    if restore_formats.is_empty() {
        return missing;
    }

    let mut extractors: Vec<&'static str> = restore_formats.iter().map(|r| r.tool()).collect();
    extractors.sort_unstable();
    extractors.dedup();
    for tool in extractors {
        let (purpose, hint) = if tool == "unzip" {
            ("extracting .zip backups", "apt install unzip")
        } else {
            ("extracting .tar.gz/.tar.bz2 backups", "apt install tar bzip2 gzip")
        };
        if !command_exists(tool) {
            missing.push(MissingPrereq {
                name: tool.to_owned(),
                purpose,
                install_hint: hint,
            });
        }
    }

    for (tool, purpose) in [
        ("dropdb", "dropping the target database"),
        ("createdb", "recreating the target database"),
        ("psql", "loading the SQL dump"),
    ] {
        if !command_exists(tool) {
            missing.push(MissingPrereq {
                name: tool.to_owned(),
                purpose,
                install_hint: "apt install postgresql-client",
            });
        }
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ninstancectl drives these tools to manage the instance.");
    msg
}
