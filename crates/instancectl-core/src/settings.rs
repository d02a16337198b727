use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the manager talks to the instance's service stack. Every field has a
/// default, so an empty (or absent) settings file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposeSettings {
    /// Compose executable; may carry a subcommand, e.g. `"docker compose"`.
    pub compose_command: String,
    pub service: String,
    /// Replica count after a rebuild or update.
    pub scale: u32,
    pub supervisor_program: String,
    pub app_user: String,
    pub app_binary: String,
    /// Config path inside the container.
    pub app_config: String,
    pub db_user: String,
    /// Parent for restore scratch directories; the system temp dir if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            compose_command: "docker-compose".to_owned(),
            service: "odoo".to_owned(),
            scale: 3,
            supervisor_program: "odoo".to_owned(),
            app_user: "odoo".to_owned(),
            app_binary: "/home/odoo/instance/odoo/odoo-bin".to_owned(),
            app_config: "/home/odoo/.openerp_serverrc".to_owned(),
            db_user: "odoo".to_owned(),
            scratch_dir: None,
        }
    }
}

impl ComposeSettings {
    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| CoreError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Settings(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
            .map_err(|e| CoreError::Settings(format!("{}: {e}", path.display())))
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.compose_tokens().is_empty() {
            return Err(CoreError::Settings("compose_command is empty".to_owned()));
        }
        for (field, value) in [
            ("service", &self.service),
            ("supervisor_program", &self.supervisor_program),
            ("app_user", &self.app_user),
            ("db_user", &self.db_user),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Settings(format!("{field} is empty")));
            }
        }
        if self.scale == 0 {
            return Err(CoreError::Settings("scale must be at least 1".to_owned()));
        }
        Ok(())
    }

    /// The compose command split into program and leading arguments.
    pub fn compose_tokens(&self) -> Vec<&str> {
        self.compose_command.split_whitespace().collect()
    }
}

/// Everything one manager invocation needs to know about its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSettings {
    pub worker_dir: PathBuf,
    pub compose_file: PathBuf,
    pub db_name: Option<String>,
    pub db_host: Option<String>,
    pub compose: ComposeSettings,
}

impl InstanceSettings {
    pub fn new(worker_dir: impl Into<PathBuf>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            worker_dir: worker_dir.into(),
            compose_file: compose_file.into(),
            db_name: None,
            db_host: None,
            compose: ComposeSettings::default(),
        }
    }

    #[must_use]
    pub fn with_database(mut self, name: Option<String>, host: Option<String>) -> Self {
        self.db_name = name;
        self.db_host = host;
        self
    }

    #[must_use]
    pub fn with_compose(mut self, compose: ComposeSettings) -> Self {
        self.compose = compose;
        self
    }

    /// Where the restored file store of database `db` lives on the host.
    pub fn filestore_target(&self, db: &str) -> PathBuf {
        self.worker_dir.join("filestore").join(db)
    }
}
