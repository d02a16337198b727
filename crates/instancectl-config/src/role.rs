use crate::OverrideMap;
use std::fmt;
use tracing::{info, warn};

/// Functional mode a process container runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Worker,
    Cron,
    Longpoll,
    Normal,
}

impl Role {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "worker" => Some(Self::Worker),
            "cron" => Some(Self::Cron),
            "longpoll" => Some(Self::Longpoll),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Cron => "cron",
            Self::Longpoll => "longpoll",
            Self::Normal => "normal",
        }
    }

    /// Config overrides implied by this role. `workers` is only consulted by
    /// the long-polling role, which sizes its own process pool.
    pub fn overrides(self, workers: &str) -> OverrideMap {
        let pairs: Vec<(&str, &str)> = match self {
            Self::Worker => vec![
                ("http_enable", "True"),
                ("max_cron_threads", "0"),
                ("workers", "0"),
                ("xmlrpcs", "False"),
            ],
            Self::Cron => vec![
                ("http_enable", "False"),
                ("max_cron_threads", "1"),
                ("workers", "0"),
                ("xmlrpc", "False"),
                ("xmlrpcs", "False"),
            ],
            Self::Longpoll => vec![
                ("http_enable", "False"),
                ("max_cron_threads", "0"),
                ("workers", workers),
                ("xmlrpcs", "False"),
            ],
            Self::Normal => Vec::new(),
        };
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Look up the overrides for a role name. Unknown names yield an empty map.
pub fn resolve_role(role_name: &str, workers: &str) -> OverrideMap {
    match Role::parse(role_name) {
        Some(role) => {
            info!("container role: {role}");
            role.overrides(workers)
        }
        None => {
            warn!("unknown container role '{role_name}', no role overrides applied");
            OverrideMap::new()
        }
    }
}
