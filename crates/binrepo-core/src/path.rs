//! Logical artifact paths and their physical mapping
//!
//! A [`RepoPath`] names an item inside a repository independently of where
//! the bytes live. Paths are normalized on construction: forward slashes,
//! no leading or trailing slash, no empty or `.` segments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// Logical `{repository key, relative path}` identifier.
///
/// The root of a repository is represented by an empty relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawRepoPath")]
pub struct RepoPath {
    repo_key: String,
    path: String,
}

/// Wire shape of [`RepoPath`]; deserialized paths are normalized through
/// [`RepoPath::new`]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRepoPath {
    repo_key: String,
    #[serde(default)]
    path: String,
}

impl From<RawRepoPath> for RepoPath {
    fn from(raw: RawRepoPath) -> Self {
        Self::new(raw.repo_key, raw.path)
    }
}

impl RepoPath {
    /// Create a path, normalizing the relative part
    pub fn new(repo_key: impl Into<String>, path: impl AsRef<str>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: normalize(path.as_ref()),
        }
    }

    /// The root folder of a repository
    pub fn root(repo_key: impl Into<String>) -> Self {
        Self {
            repo_key: repo_key.into(),
            path: String::new(),
        }
    }

    /// Parse `key:relative/path` (or `key/relative/path`)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('/');
        let (key, rest) = match s.find(':') {
            Some(idx) => (&s[..idx], &s[idx + 1..]),
            None => s.split_once('/').unwrap_or((s, "")),
        };

        if key.is_empty() {
            return Err(CoreError::InvalidPath {
                path: s.to_string(),
                reason: "missing repository key".to_string(),
            });
        }
        if key.contains('/') {
            return Err(CoreError::InvalidPath {
                path: s.to_string(),
                reason: "repository key must not contain '/'".to_string(),
            });
        }

        Ok(Self::new(key, rest))
    }

    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    /// Relative path inside the repository (empty for the root)
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment (empty for the root)
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Parent folder, or `None` for the repository root
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        };
        Some(Self {
            repo_key: self.repo_key.clone(),
            path: parent.to_string(),
        })
    }

    /// Child path under this one
    pub fn child(&self, name: &str) -> RepoPath {
        if self.is_root() {
            Self::new(self.repo_key.clone(), name)
        } else {
            Self::new(self.repo_key.clone(), format!("{}/{}", self.path, name))
        }
    }

    /// Same relative path in another repository
    pub fn with_repo_key(&self, repo_key: impl Into<String>) -> RepoPath {
        Self {
            repo_key: repo_key.into(),
            path: self.path.clone(),
        }
    }

    /// Whether `self` equals `ancestor` or lives underneath it
    pub fn is_descendant_of(&self, ancestor: &RepoPath) -> bool {
        if self.repo_key != ancestor.repo_key {
            return false;
        }
        if ancestor.is_root() || self.path == ancestor.path {
            return true;
        }
        self.path
            .strip_prefix(ancestor.path.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_key, self.path)
    }
}

fn normalize(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Maps repository keys and paths onto the physical storage layout.
///
/// Constructed once at startup and passed by reference; it holds no
/// mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    repos_root: PathBuf,
    config_root: PathBuf,
}

impl PathMapper {
    /// Configuration file name inside the config root
    pub const CONFIG_FILE: &'static str = "repositories.yaml";

    pub fn new(repos_root: impl Into<PathBuf>, config_root: impl Into<PathBuf>) -> Self {
        Self {
            repos_root: repos_root.into(),
            config_root: config_root.into(),
        }
    }

    /// Platform defaults: `<data_dir>/binrepo/repos` and `<config_dir>/binrepo`
    pub fn from_defaults() -> Result<Self> {
        let data = dirs::data_dir().ok_or(CoreError::DirectoryUnavailable { what: "data" })?;
        let config = dirs::config_dir().ok_or(CoreError::DirectoryUnavailable { what: "config" })?;
        Ok(Self::new(
            data.join("binrepo").join("repos"),
            config.join("binrepo"),
        ))
    }

    /// Mapper rooted at a single directory (`<root>/repos`, `<root>/etc`)
    pub fn under(root: &Path) -> Self {
        Self::new(root.join("repos"), root.join("etc"))
    }

    pub fn repos_root(&self) -> &Path {
        &self.repos_root
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// Location of the repositories configuration document
    pub fn config_file(&self) -> PathBuf {
        self.config_root.join(Self::CONFIG_FILE)
    }

    /// Storage directory of one repository
    pub fn repo_dir(&self, repo_key: &str) -> PathBuf {
        self.repos_root.join(repo_key)
    }

    /// Physical location of an item
    pub fn item_location(&self, repo_path: &RepoPath) -> PathBuf {
        let mut location = self.repo_dir(repo_path.repo_key());
        for segment in repo_path.path().split('/').filter(|s| !s.is_empty()) {
            location.push(segment);
        }
        location
    }

    /// Inverse of [`item_location`](Self::item_location)
    pub fn repo_path_of(&self, location: &Path) -> Option<RepoPath> {
        let relative = location.strip_prefix(&self.repos_root).ok()?;
        let mut components = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned());
        let key = components.next()?;
        let rest: Vec<String> = components.collect();
        Some(RepoPath::new(key, rest.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let path = RepoPath::new("libs", "/com//acme/./app/1.0/");
        assert_eq!(path.path(), "com/acme/app/1.0");
        assert_eq!(RepoPath::new("libs", "a\\b\\c").path(), "a/b/c");
        assert_eq!(RepoPath::new("libs", "a/b/../c").path(), "a/c");
        assert_eq!(RepoPath::new("libs", "../../a").path(), "a");
    }

    #[test]
    fn test_equality_by_value() {
        assert_eq!(
            RepoPath::new("libs", "com/acme"),
            RepoPath::new("libs", "/com/acme/")
        );
        assert_ne!(
            RepoPath::new("libs", "com/acme"),
            RepoPath::new("other", "com/acme")
        );
    }

    #[test]
    fn test_parse() {
        let path = RepoPath::parse("libs:com/acme/app/1.0/app.jar").unwrap();
        assert_eq!(path.repo_key(), "libs");
        assert_eq!(path.path(), "com/acme/app/1.0/app.jar");

        let path = RepoPath::parse("/libs/com/acme").unwrap();
        assert_eq!(path.repo_key(), "libs");
        assert_eq!(path.path(), "com/acme");

        let root = RepoPath::parse("libs").unwrap();
        assert!(root.is_root());

        assert!(RepoPath::parse(":com/acme").is_err());
        assert!(RepoPath::parse("").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        let path = RepoPath::new("libs", "com/acme/app.pom");
        assert_eq!(path.name(), "app.pom");
        let parent = path.parent().unwrap();
        assert_eq!(parent.path(), "com/acme");
        assert_eq!(parent.parent().unwrap().path(), "com");
        assert!(parent.parent().unwrap().parent().unwrap().is_root());
        assert!(RepoPath::root("libs").parent().is_none());
    }

    #[test]
    fn test_child_and_descendant() {
        let root = RepoPath::root("libs");
        let com = root.child("com");
        assert_eq!(com.path(), "com");
        let acme = com.child("acme");
        assert!(acme.is_descendant_of(&com));
        assert!(acme.is_descendant_of(&root));
        assert!(!com.is_descendant_of(&acme));
        assert!(!RepoPath::new("libs", "common").is_descendant_of(&com));
        assert!(!acme.is_descendant_of(&acme.with_repo_key("other")));
    }

    #[test]
    fn test_deserialize_normalizes() {
        let path: RepoPath =
            serde_yaml::from_str("repoKey: libs\npath: /com//acme/./app/\n").unwrap();
        assert_eq!(path, RepoPath::new("libs", "com/acme/app"));

        let root: RepoPath = serde_yaml::from_str("repoKey: libs\n").unwrap();
        assert!(root.is_root());

        let yaml = serde_yaml::to_string(&RepoPath::new("libs", "a/b")).unwrap();
        assert!(yaml.contains("repoKey: libs"));
    }

    #[test]
    fn test_display() {
        assert_eq!(RepoPath::new("libs", "a/b").to_string(), "libs:a/b");
    }

    #[test]
    fn test_path_mapper() {
        let mapper = PathMapper::new("/data/repos", "/etc/binrepo");
        let path = RepoPath::new("libs-release", "com/acme/app.jar");

        let location = mapper.item_location(&path);
        assert_eq!(
            location,
            PathBuf::from("/data/repos/libs-release/com/acme/app.jar")
        );
        assert_eq!(mapper.repo_path_of(&location), Some(path));
        assert_eq!(
            mapper.config_file(),
            PathBuf::from("/etc/binrepo/repositories.yaml")
        );
        assert!(mapper.repo_path_of(Path::new("/elsewhere/x")).is_none());
    }

    #[test]
    fn test_path_mapper_under() {
        let temp = tempfile::TempDir::new().unwrap();
        let mapper = PathMapper::under(temp.path());
        assert_eq!(mapper.repo_dir("libs"), temp.path().join("repos").join("libs"));
        assert_eq!(
            mapper.config_file(),
            temp.path().join("etc").join("repositories.yaml")
        );
    }
}
