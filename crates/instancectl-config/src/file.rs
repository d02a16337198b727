use crate::{reconcile, ConfigError, OverrideMap};
use std::fs;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub fn read_lines(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    Ok(content.lines().map(str::to_owned).collect())
}

/// Replace `dest` with `lines` through a temp file in the same directory.
///
/// An existing file's mode and ownership carry over to the replacement, so a
/// config written by root stays readable by the service user.
pub fn write_atomic(dest: &Path, lines: &[String]) -> Result<(), ConfigError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let io = |e| ConfigError::io(dest, e);

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io)?;
    for line in lines {
        writeln!(tmp, "{line}").map_err(io)?;
    }
    tmp.as_file().sync_all().map_err(io)?;

    if let Ok(meta) = fs::metadata(dest) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(io)?;
        std::os::unix::fs::fchown(tmp.as_file(), Some(meta.uid()), Some(meta.gid()))
            .map_err(io)?;
    }

    tmp.persist(dest).map_err(|e| ConfigError::io(dest, e.error))?;
    fsync_dir(&dir).map_err(|e| ConfigError::io(&dir, e))?;
    Ok(())
}

/// Flush directory metadata so a completed rename survives a crash.
fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}

/// Read the config at `path`, merge `overrides` into it and write it back.
/// Returns the number of lines written.
pub fn reconcile_file(path: &Path, overrides: &OverrideMap) -> Result<usize, ConfigError> {
    info!("reconciling {}", path.display());
    let current = read_lines(path)?;
    let updated = reconcile(&current, overrides);
    debug!(
        "{} lines read, {} lines written",
        current.len(),
        updated.len()
    );
    write_atomic(path, &updated)?;
    Ok(updated.len())
}

/// Copy `template` to `path` unless a config already exists there.
/// Returns whether a copy was made.
pub fn seed_config(path: &Path, template: &Path) -> Result<bool, ConfigError> {
    if path.is_file() {
        return Ok(false);
    }
    if !template.is_file() {
        return Err(ConfigError::TemplateMissing(template.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }
    fs::copy(template, path).map_err(|e| ConfigError::io(path, e))?;
    info!(
        "seeded {} from {}",
        path.display(),
        template.display()
    );
    Ok(true)
}
