use crate::OverrideMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

/// Config key holding the database-manager master password.
pub const SECRET_KEY: &str = "admin_passwd";
/// Value shipped in stock config templates; never left in place.
pub const INSECURE_SECRET: &str = "admin";
pub const SECRET_LEN: usize = 12;

/// Split an entry line into its trimmed key and raw value.
///
/// Blank lines, `#`/`;` comments, section headers and lines without `=` are
/// not entries and are carried through untouched.
fn parse_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with(['#', ';', '[']) {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

fn format_entry(key: &str, value: &str) -> String {
    format!("{key} = {}", value.trim())
}

fn is_insecure_secret(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == INSECURE_SECRET
}

/// Random alphanumeric secret drawn from the thread-local CSPRNG.
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

fn secret_entry(resolved: &str) -> Option<String> {
    if is_insecure_secret(resolved) {
        info!("{SECRET_KEY} unset or insecure, generating a new one");
        Some(format_entry(SECRET_KEY, &generate_secret()))
    } else {
        None
    }
}

/// Merge `overrides` into the lines of a config file.
///
/// Entry lines whose key has an override are rewritten in place (first
/// occurrence only); every other line is returned unchanged and in order.
/// Overrides that matched no line are appended at the end in map order.
/// [`SECRET_KEY`] is regenerated whenever its effective value (the override
/// if one is given, the current file value otherwise) is empty or
/// [`INSECURE_SECRET`].
pub fn reconcile(current: &[String], overrides: &OverrideMap) -> Vec<String> {
    let mut pending = overrides.clone();
    let mut out = Vec::with_capacity(current.len() + overrides.len());

    for line in current {
        let Some((key, value)) = parse_entry(line) else {
            out.push(line.clone());
            continue;
        };

        let supplied = pending.remove(key);
        if key == SECRET_KEY {
            let resolved = supplied.as_deref().unwrap_or(value);
            if let Some(entry) = secret_entry(resolved) {
                out.push(entry);
                continue;
            }
        }

        match supplied {
            Some(new_value) => {
                debug!("replacing {key}");
                out.push(format_entry(key, &new_value));
            }
            None => out.push(line.clone()),
        }
    }

    for (key, value) in pending {
        let entry = if key == SECRET_KEY {
            secret_entry(&value).unwrap_or_else(|| format_entry(&key, &value))
        } else {
            format_entry(&key, &value)
        };
        debug!("appending {key}");
        out.push(entry);
    }

    out
}
