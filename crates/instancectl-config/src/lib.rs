//! Configuration layer for instancectl.
//!
//! This crate owns everything that touches the instance's line-oriented
//! server config file: the `OverrideMap` built from `ODOORC_`-prefixed
//! environment variables, the fixed role table (`resolve_role`), the
//! line-preserving `reconcile` merge with its admin-secret policy, atomic
//! file rewriting, and the `EnvSettings` snapshot of the container
//! environment read once at start.

pub mod env;
pub mod file;
pub mod overrides;
pub mod reconcile;
pub mod role;

pub use env::EnvSettings;
pub use file::{read_lines, reconcile_file, seed_config, write_atomic};
pub use overrides::{OverrideMap, OVERRIDE_PREFIX};
pub use reconcile::{generate_secret, reconcile, INSECURE_SECRET, SECRET_KEY, SECRET_LEN};
pub use role::{resolve_role, Role};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config template not found: {}", .0.display())]
    TemplateMissing(PathBuf),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
