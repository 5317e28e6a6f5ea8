//! Stored item descriptions
//!
//! `ItemInfo` is an immutable snapshot of a file or folder. Mutation hooks
//! receive snapshots, never the live item held by the store.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::path::RepoPath;

/// Multi-valued item properties, insertion ordered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(IndexMap<String, Vec<String>>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values of a key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// Append a value to a key
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// First value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Description of a stored file or folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub repo_path: RepoPath,
    pub folder: bool,
    /// Size in bytes (0 for folders)
    pub size: u64,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl ItemInfo {
    pub fn file(repo_path: RepoPath, size: u64) -> Self {
        let now = Utc::now();
        Self {
            repo_path,
            folder: false,
            size,
            created: now,
            last_modified: now,
            modified_by: None,
            properties: Properties::new(),
        }
    }

    pub fn folder(repo_path: RepoPath) -> Self {
        Self {
            folder: true,
            ..Self::file(repo_path, 0)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn name(&self) -> &str {
        self.repo_path.name()
    }

    pub fn repo_key(&self) -> &str {
        self.repo_path.repo_key()
    }

    /// Copy of this item relocated to `target`
    pub fn relocated(&self, target: RepoPath) -> Self {
        Self {
            repo_path: target,
            ..self.clone()
        }
    }
}
