//! Key/value diffing of environment documents.
//!
//! An environment document is a multi-line `KEY=VALUE` text. Parsing rules:
//! - blank lines and lines starting with `#` are ignored
//! - each remaining line is split on the first `=`; lines without one are skipped
//! - keys are trimmed, values are kept verbatim
//! - a later duplicate key overwrites an earlier one
//!
//! Keys are case-sensitive and values compare by exact string equality.

use serde::Serialize;
use std::collections::BTreeMap;

/// Parsed environment: key → value, ordered by key.
pub type EnvMap = BTreeMap<String, String>;

/// Parse an environment document into a key/value map.
pub fn parse_env(text: &str) -> EnvMap {
    let mut map = EnvMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    map
}

/// A key present on both sides with different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedEntry {
    /// The key.
    pub key: String,
    /// Value in the local document.
    pub local: String,
    /// Value in the remote document.
    pub remote: String,
}

/// Set difference between a local and a remote environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvDiff {
    /// Keys only in remote, with the remote value.
    pub added: Vec<(String, String)>,
    /// Keys only in local, with the local value.
    pub removed: Vec<(String, String)>,
    /// Keys in both with differing values.
    pub changed: Vec<ChangedEntry>,
}

impl EnvDiff {
    /// Whether both sides are identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of differing keys.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Compare two parsed environments.
pub fn diff(local: &EnvMap, remote: &EnvMap) -> EnvDiff {
    let mut out = EnvDiff::default();

    for (key, remote_value) in remote {
        match local.get(key) {
            None => out.added.push((key.clone(), remote_value.clone())),
            Some(local_value) if local_value != remote_value => {
                out.changed.push(ChangedEntry {
                    key: key.clone(),
                    local: local_value.clone(),
                    remote: remote_value.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for (key, local_value) in local {
        if !remote.contains_key(key) {
            out.removed.push((key.clone(), local_value.clone()));
        }
    }

    out
}

/// Parse and compare two documents in one step.
pub fn diff_documents(local: &str, remote: &str) -> EnvDiff {
    diff(&parse_env(local), &parse_env(remote))
}
