use crate::{resolve_role, OverrideMap};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_USER: &str = "odoo";
pub const DEFAULT_CONFIG_TEMPLATE: &str = "/external_files/openerp_serverrc";
pub const DEFAULT_CONTAINER_TYPE: &str = "normal";
pub const DEFAULT_WORKERS: &str = "2";
pub const DEFAULT_INSTANCE_TYPE: &str = "develop";

/// Snapshot of the container environment, taken once at start and passed
/// explicitly to everything that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    /// System user the application runs as (`ODOO_USER`).
    pub user: String,
    /// Root of per-database file storage (`ODOO_FILESTORE_PATH`).
    pub filestore_path: PathBuf,
    /// Server config file reconciled at start (`ODOO_CONFIG_FILE`).
    pub config_path: PathBuf,
    /// Copied to `config_path` when no config exists yet (`ODOO_CONFIG_TEMPLATE`).
    pub config_template: PathBuf,
    /// Raw role name (`CONTAINER_TYPE`).
    pub container_type: String,
    /// Worker count for the long-polling role (`WORKERS`).
    pub workers: String,
    /// Deployment stage reported to Sentry (`INSTANCE_TYPE`).
    pub instance_type: String,
    /// Skip ownership and permission fixes (`INSTANCECTL_SKIP_PERMISSIONS=1`).
    pub skip_permissions: bool,
    /// Every `ODOORC_` variable, normalized.
    pub overrides: OverrideMap,
}

impl EnvSettings {
    /// Read the process environment. Variables that are not valid UTF-8 are skipped.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let overrides = OverrideMap::from_vars(vars.iter().map(|(k, v)| (k, v)));
        let lookup: HashMap<&str, &str> = vars
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let get = |name: &str| lookup.get(name).map(|v| (*v).to_owned());

        let user = get("ODOO_USER").unwrap_or_else(|| DEFAULT_USER.to_owned());
        let filestore_path = get("ODOO_FILESTORE_PATH").map_or_else(
            || PathBuf::from(format!("/home/{user}/.local/share/Odoo/filestore")),
            PathBuf::from,
        );
        let config_path = get("ODOO_CONFIG_FILE").map_or_else(
            || PathBuf::from(format!("/home/{user}/.openerp_serverrc")),
            PathBuf::from,
        );

        Self {
            filestore_path,
            config_path,
            config_template: get("ODOO_CONFIG_TEMPLATE")
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_TEMPLATE), PathBuf::from),
            container_type: get("CONTAINER_TYPE")
                .unwrap_or_else(|| DEFAULT_CONTAINER_TYPE.to_owned())
                .to_ascii_lowercase(),
            workers: get("WORKERS").unwrap_or_else(|| DEFAULT_WORKERS.to_owned()),
            instance_type: get("INSTANCE_TYPE")
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_owned()),
            skip_permissions: get("INSTANCECTL_SKIP_PERMISSIONS").as_deref() == Some("1"),
            user,
            overrides,
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.user)
    }

    /// The complete override set for this container: `ODOORC_` variables,
    /// then the role table on top, then Sentry defaults.
    pub fn desired_overrides(&self) -> OverrideMap {
        let mut map = self.overrides.clone();
        map.merge(resolve_role(&self.container_type, &self.workers));
        map.apply_sentry_defaults(&self.instance_type);
        map
    }
}
