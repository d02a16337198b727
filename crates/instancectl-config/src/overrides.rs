use std::collections::BTreeMap;
use tracing::debug;

/// Environment variables carrying this prefix (any case) become config overrides.
pub const OVERRIDE_PREFIX: &str = "ODOORC_";

const SENTRY_ENABLED: &str = "sentry_enabled";
const SENTRY_ODOO_DIR: &str = "sentry_odoo_dir";
const SENTRY_ENVIRONMENT: &str = "sentry_environment";
const DEFAULT_SENTRY_ODOO_DIR: &str = "/home/odoo/instance/odoo";

/// Desired config values keyed by normalized key (lower-case, prefix stripped).
///
/// Iteration is in key order, which is also the order unconsumed keys get
/// appended to the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideMap {
    entries: BTreeMap<String, String>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(name, value)` pairs, keeping only names that start
    /// with [`OVERRIDE_PREFIX`]. Later duplicates overwrite earlier ones.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = OVERRIDE_PREFIX.to_ascii_lowercase();
        let mut map = Self::new();
        for (name, value) in vars {
            let lowered = name.as_ref().to_ascii_lowercase();
            let Some(key) = lowered.strip_prefix(&prefix) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            debug!("override from environment: {key}");
            map.entries
                .insert(key.to_owned(), value.as_ref().trim().to_owned());
        }
        map
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.to_ascii_lowercase(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Overlay `other` on top of `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: OverrideMap) {
        self.entries.extend(other.entries);
    }

    /// When Sentry reporting is switched on, fill in the source directory and
    /// environment name it needs unless they were given explicitly.
    pub fn apply_sentry_defaults(&mut self, instance_type: &str) {
        let enabled = self.get(SENTRY_ENABLED).is_some_and(is_truthy);
        if !enabled {
            return;
        }
        self.entries
            .entry(SENTRY_ODOO_DIR.to_owned())
            .or_insert_with(|| DEFAULT_SENTRY_ODOO_DIR.to_owned());
        self.entries
            .entry(SENTRY_ENVIRONMENT.to_owned())
            .or_insert_with(|| instance_type.to_owned());
    }
}

impl IntoIterator for OverrideMap {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for OverrideMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k.as_ref(), v);
        }
        map
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_prefixed_vars_are_kept() {
        let map = OverrideMap::from_vars([("ODOORC_WORKERS", "4"), ("UNRELATED_VAR", "x")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("workers"), Some("4"));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        let map = OverrideMap::from_vars([("odoorc_DB_HOST", "db"), ("OdooRc_Db_Port", "5432")]);
        assert_eq!(map.get("db_host"), Some("db"));
        assert_eq!(map.get("db_port"), Some("5432"));
    }

    #[test]
    fn values_are_trimmed() {
        let map = OverrideMap::from_vars([("ODOORC_DB_USER", "  odoo \n")]);
        assert_eq!(map.get("db_user"), Some("odoo"));
    }

    #[test]
    fn last_duplicate_wins() {
        let map = OverrideMap::from_vars([("ODOORC_WORKERS", "2"), ("odoorc_workers", "8")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("workers"), Some("8"));
    }

    #[test]
    fn bare_prefix_is_ignored() {
        let map = OverrideMap::from_vars([("ODOORC_", "x")]);
        assert!(map.is_empty());
    }

    #[test]
    fn prefix_in_the_middle_is_not_a_match() {
        let map = OverrideMap::from_vars([("MY_ODOORC_WORKERS", "3")]);
        assert!(map.is_empty());
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut base = OverrideMap::from_vars([("ODOORC_WORKERS", "4"), ("ODOORC_DB_HOST", "db")]);
        let role: OverrideMap = [("workers", "0")].into_iter().collect();
        base.merge(role);
        assert_eq!(base.get("workers"), Some("0"));
        assert_eq!(base.get("db_host"), Some("db"));
    }

    #[test]
    fn iteration_is_key_ordered() {
        let map: OverrideMap = [("zeta", "1"), ("alpha", "2"), ("mid", "3")]
            .into_iter()
            .collect();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn sentry_defaults_added_when_enabled() {
        let mut map = OverrideMap::from_vars([("ODOORC_SENTRY_ENABLED", "True")]);
        map.apply_sentry_defaults("production");
        assert_eq!(map.get("sentry_odoo_dir"), Some("/home/odoo/instance/odoo"));
        assert_eq!(map.get("sentry_environment"), Some("production"));
    }

    #[test]
    fn sentry_defaults_keep_explicit_values() {
        let mut map = OverrideMap::from_vars([
            ("ODOORC_SENTRY_ENABLED", "1"),
            ("ODOORC_SENTRY_ENVIRONMENT", "staging"),
        ]);
        map.apply_sentry_defaults("develop");
        assert_eq!(map.get("sentry_environment"), Some("staging"));
    }

    #[test]
    fn sentry_defaults_skipped_when_disabled() {
        let mut map = OverrideMap::from_vars([("ODOORC_SENTRY_ENABLED", "False")]);
        map.apply_sentry_defaults("develop");
        assert!(!map.contains_key("sentry_environment"));

        let mut empty = OverrideMap::new();
        empty.apply_sentry_defaults("develop");
        assert!(empty.is_empty());
    }
}
