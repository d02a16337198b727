use crate::command::{CommandRunner, CommandSpec};
use crate::RuntimeError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entries ending in this suffix are treated as the database dump.
pub const DUMP_SUFFIX: &str = ".sql";
/// Dump file name assumed when the archive holds no `.sql` entry.
pub const DEFAULT_DUMP_NAME: &str = "database_dump.sql";
/// Directory holding the attachment store inside a backup.
pub const FILESTORE_DIR: &str = "filestore";

/// Supported backup archive formats, picked once from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveReader {
    GzipTar,
    Bzip2Tar,
    Zip,
}

impl ArchiveReader {
    pub fn detect(archive: &Path) -> Result<Self, RuntimeError> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if [".tar.gz", ".tgz", ".gz"].iter().any(|s| name.ends_with(s)) {
            Ok(Self::GzipTar)
        } else if [".tar.bz2", ".tbz2", ".tbz", ".bz2"]
            .iter()
            .any(|s| name.ends_with(s))
        {
            Ok(Self::Bzip2Tar)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(RuntimeError::UnsupportedFormat(archive.to_path_buf()))
        }
    }

    /// Tar archives are expected to wrap everything in one top-level
    /// directory, which is stripped; zip archives are extracted as-is.
    pub fn extract_command(self, archive: &Path, dest: &Path) -> CommandSpec {
        let archive = archive.to_string_lossy().into_owned();
        let dest = dest.to_string_lossy().into_owned();
        match self {
            Self::GzipTar | Self::Bzip2Tar => {
                let mode = if self == Self::GzipTar { "-xzf" } else { "-xjf" };
                CommandSpec::new("tar").args([
                    mode,
                    archive.as_str(),
                    "--strip-components=1",
                    "-C",
                    dest.as_str(),
                ])
            }
            Self::Zip => CommandSpec::new("unzip").args(["-o", "-q", archive.as_str(), "-d", dest.as_str()]),
        }
    }

    /// External program this format is extracted with.
    pub fn tool(self) -> &'static str {
        match self {
            Self::GzipTar | Self::Bzip2Tar => "tar",
            Self::Zip => "unzip",
        }
    }

    pub fn extract(
        self,
        runner: &dyn CommandRunner,
        archive: &Path,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        fs::create_dir_all(dest)?;
        let result = runner.run(&self.extract_command(archive, dest))?;
        if !result.succeeded() {
            return Err(RuntimeError::Extraction {
                archive: archive.to_path_buf(),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_owned(),
            });
        }
        Ok(())
    }

    /// List what extraction actually put on disk under `dest`.
    pub fn list_entries(self, dest: &Path) -> Result<Vec<String>, RuntimeError> {
        let mut entries = collect_entries(dest, dest)?;
        entries.sort();
        Ok(entries)
    }
}

/// Recursively collect paths relative to `root`, directories included.
fn collect_entries(root: &Path, current: &Path) -> Result<Vec<String>, RuntimeError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let full = entry.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| std::io::Error::other(format!("path strip: {e}")))?
            .to_string_lossy()
            .to_string();

        let meta = full.symlink_metadata()?;
        result.push(rel);
        if meta.is_dir() {
            result.extend(collect_entries(root, &full)?);
        }
    }
    Ok(result)
}

/// Entries found on disk after extracting a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInventory {
    root: PathBuf,
    entries: Vec<String>,
}

impl ArchiveInventory {
    pub fn new(root: impl Into<PathBuf>, entries: Vec<String>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.iter().any(|e| e == entry)
    }

    /// First `.sql` entry at the top level, then the first nested one, or
    /// [`DEFAULT_DUMP_NAME`] under the root. The result may not exist; see
    /// [`ArchiveInventory::require_dump`].
    pub fn dump_file(&self) -> PathBuf {
        let sql = |e: &&String| e.ends_with(DUMP_SUFFIX);
        let rel = self
            .entries
            .iter()
            .filter(sql)
            .find(|e| !e.contains('/'))
            .or_else(|| self.entries.iter().find(sql))
            .map_or(DEFAULT_DUMP_NAME, String::as_str);
        self.root.join(rel)
    }

    /// The dump file, provided extraction actually produced it.
    pub fn require_dump(&self) -> Result<PathBuf, RuntimeError> {
        let dump = self.dump_file();
        if dump.is_file() {
            Ok(dump)
        } else {
            Err(RuntimeError::MissingDump(self.root.clone()))
        }
    }

    /// The backup's file store directory, if the archive carried one.
    pub fn filestore_dir(&self) -> Option<PathBuf> {
        let dir = self.root.join(FILESTORE_DIR);
        dir.is_dir().then_some(dir)
    }
}

/// Extract `archive` into `dest` and inventory the result.
///
/// The format is checked before anything touches the filesystem, so an
/// unsupported file name leaves no trace. `dest` is created if needed.
pub fn extract(
    runner: &dyn CommandRunner,
    archive: &Path,
    dest: &Path,
) -> Result<ArchiveInventory, RuntimeError> {
    let reader = ArchiveReader::detect(archive)?;
    info!(
        "extracting {} ({reader:?}) into {}",
        archive.display(),
        dest.display()
    );
    reader.extract(runner, archive, dest)?;
    let entries = reader.list_entries(dest)?;
    debug!("{} entries extracted", entries.len());
    Ok(ArchiveInventory::new(dest, entries))
}
