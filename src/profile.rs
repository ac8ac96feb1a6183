//! Persisted profile storage.
//!
//! The panel keeps two things in the host profile: the boot list tree and
//! the "window was open" flag. Values are plain JSON; the shape of the boot
//! list value is owned by [`crate::boot_list`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Key/value storage provided by the host.
pub trait ProfileStore {
    fn get(&self, key: &str) -> Option<Value>;

    /// Replaces the value under `key`. Either the whole value is stored or
    /// nothing is.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Stores `default` only when `key` has no value yet.
    fn create_value(&mut self, key: &str, default: Value) -> Result<()> {
        if self.get(key).is_none() {
            self.set(key, default)?;
        }
        Ok(())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|value| value.as_bool())
    }

    fn set_flag(&mut self, key: &str, value: bool) -> Result<()> {
        self.set(key, Value::Bool(value))
    }
}

/// Profile kept in memory for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfile {
    values: BTreeMap<String, Value>,
}

impl MemoryProfile {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfile {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProfileDocument {
    #[serde(default)]
    saved_at: Option<String>,
    #[serde(default)]
    values: BTreeMap<String, Value>,
}

/// Profile persisted as one JSON document on disk.
///
/// Every `set` rewrites the document through a sibling temp file that is
/// renamed over the original, so readers never see a half-written profile.
#[derive(Debug)]
pub struct JsonFileProfile {
    path: PathBuf,
    document: ProfileDocument,
}

impl JsonFileProfile {
    /// Opens the profile at `path`. A missing file is an empty profile.
    pub fn open(path: &Path) -> Result<Self> {
        let document = if path.exists() {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read profile: {:?}", path))?;
            serde_json::from_str(&content)
                .context(format!("Failed to parse profile: {:?}", path))?
        } else {
            ProfileDocument::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// RFC 3339 timestamp of the last write, if the profile was ever saved.
    pub fn saved_at(&self) -> Option<&str> {
        self.document.saved_at.as_deref()
    }

    fn persist(&self, document: &ProfileDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create profile directory: {:?}", parent))?;
            }
        }
        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).context(format!("Failed to write profile: {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .context(format!("Failed to replace profile: {:?}", self.path))?;
        Ok(())
    }
}

impl ProfileStore for JsonFileProfile {
    fn get(&self, key: &str) -> Option<Value> {
        self.document.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut next = self.document.clone();
        next.values.insert(key.to_string(), value);
        next.saved_at = Some(chrono::Local::now().to_rfc3339());
        self.persist(&next)?;
        self.document = next;
        tracing::debug!(
            target: "addinpanel::profile",
            key = %key,
            path = %self.path.display(),
            "profile value written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_value_keeps_existing() {
        let mut profile = MemoryProfile::new();
        profile.set_flag("Panel/WndOpened", false).unwrap();
        profile.create_value("Panel/WndOpened", json!(true)).unwrap();
        assert_eq!(profile.flag("Panel/WndOpened"), Some(false));

        profile.create_value("Other", json!(true)).unwrap();
        assert_eq!(profile.flag("Other"), Some(true));
    }

    #[test]
    fn file_profile_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profile.json");
        {
            let mut profile = JsonFileProfile::open(&path).unwrap();
            assert_eq!(profile.path(), path.as_path());
            assert!(profile.get("list").is_none());
            profile.set("list", json!([{"addin": "a"}])).unwrap();
            assert!(profile.saved_at().is_some());
        }
        let reopened = JsonFileProfile::open(&path).unwrap();
        assert_eq!(reopened.get("list"), Some(json!([{"addin": "a"}])));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_profile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileProfile::open(&path).is_err());
    }
}
