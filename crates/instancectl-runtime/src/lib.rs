//! Execution layer for instancectl.
//!
//! Everything that leaves the process lives here: the `CommandRunner` trait
//! with its real (`SystemRunner`) and test (`RecordingRunner`)
//! implementations, backup archive extraction and inventory
//! (`ArchiveReader`, `ArchiveInventory`), system user lookup for run-as
//! execution, and host prerequisite checks.

pub mod archive;
pub mod command;
pub mod prereq;
pub mod recording;
pub mod user;

pub use archive::{
    extract, ArchiveInventory, ArchiveReader, DEFAULT_DUMP_NAME, DUMP_SUFFIX, FILESTORE_DIR,
};
pub use command::{CommandRunner, CommandSpec, ExecutionResult, OutputMode, SystemRunner};
pub use prereq::{check_manager_prereqs, command_exists, format_missing, MissingPrereq};
pub use recording::RecordingRunner;
pub use user::{lookup_user, UserIds};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported archive format: {} (expected .tar.gz, .tar.bz2 or .zip)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("extraction of {} failed with exit code {exit_code}: {stderr}", archive.display())]
    Extraction {
        archive: PathBuf,
        exit_code: i32,
        stderr: String,
    },
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown system user: {0}")]
    UnknownUser(String),
    #[error("backup has no database dump: no .sql file under {}", .0.display())]
    MissingDump(PathBuf),
}
