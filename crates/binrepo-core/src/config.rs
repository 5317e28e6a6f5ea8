//! Repository configuration document
//!
//! Stores repository descriptors in `<config_dir>/binrepo/repositories.yaml`.
//! The document is read-mostly: the engine builds its runtime graph from it
//! and rebuilds on every reload.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::path::PathMapper;

/// Reserved key of the implicit global virtual repository
pub const GLOBAL_VIRTUAL_KEY: &str = "repo";

/// Suffix of the cache repository owned by a remote repository
pub const CACHE_SUFFIX: &str = "-cache";

/// Repository configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoriesConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub local_repositories: Vec<LocalRepoDescriptor>,

    #[serde(default)]
    pub remote_repositories: Vec<RemoteRepoDescriptor>,

    #[serde(default)]
    pub virtual_repositories: Vec<VirtualRepoDescriptor>,

    /// Network proxies; their keys share the repository namespace
    #[serde(default)]
    pub proxies: Vec<ProxyDescriptor>,

    /// Path lock acquisition policy
    #[serde(default)]
    pub locking: LockPolicy,
}

fn default_api_version() -> String {
    "binrepo.io/v1".to_string()
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            local_repositories: Vec::new(),
            remote_repositories: Vec::new(),
            virtual_repositories: Vec::new(),
            proxies: Vec::new(),
            locking: LockPolicy::default(),
        }
    }
}

impl RepositoriesConfig {
    /// Load configuration from the mapper's config location
    pub fn load(mapper: &PathMapper) -> Result<Self> {
        let path = mapper.config_file();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Every descriptor, in document order (locals, remotes, derived caches, virtuals)
    pub fn descriptors(&self) -> Vec<RepoDescriptor> {
        let mut all: Vec<RepoDescriptor> = Vec::new();
        all.extend(self.local_repositories.iter().cloned().map(RepoDescriptor::Local));
        all.extend(self.remote_repositories.iter().cloned().map(RepoDescriptor::Remote));
        all.extend(
            self.remote_repositories
                .iter()
                .filter(|r| r.store_artifacts_locally)
                .map(|r| RepoDescriptor::Local(r.cache_descriptor())),
        );
        all.extend(self.virtual_repositories.iter().cloned().map(RepoDescriptor::Virtual));
        all
    }

    /// Add a local repository
    pub fn add_local(&mut self, repo: LocalRepoDescriptor) -> &mut Self {
        self.local_repositories.push(repo);
        self
    }

    /// Add a remote repository
    pub fn add_remote(&mut self, repo: RemoteRepoDescriptor) -> &mut Self {
        self.remote_repositories.push(repo);
        self
    }

    /// Add a virtual repository
    pub fn add_virtual(&mut self, repo: VirtualRepoDescriptor) -> &mut Self {
        self.virtual_repositories.push(repo);
        self
    }
}

/// Behaviour of snapshot versions deployed into a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotVersionBehavior {
    /// Timestamped snapshot versions
    #[default]
    Unique,
    NonUnique,
    /// The deployer controls metadata; the server never recalculates it
    Deployer,
}

/// Packaging format handled by a repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    Maven,
    Nuget,
    Generic,
}

/// Flags shared by local repositories and remote caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoPolicy {
    /// Blacked-out repositories serve nothing and accept nothing
    #[serde(default)]
    pub blacked_out: bool,

    #[serde(default = "default_true")]
    pub handle_releases: bool,

    #[serde(default = "default_true")]
    pub handle_snapshots: bool,

    #[serde(default)]
    pub snapshot_version_behavior: SnapshotVersionBehavior,

    #[serde(default)]
    pub package_type: PackageType,
}

fn default_true() -> bool {
    true
}

impl Default for RepoPolicy {
    fn default() -> Self {
        Self {
            blacked_out: false,
            handle_releases: true,
            handle_snapshots: true,
            snapshot_version_behavior: SnapshotVersionBehavior::default(),
            package_type: PackageType::default(),
        }
    }
}

/// Local repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRepoDescriptor {
    pub key: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(flatten)]
    pub policy: RepoPolicy,

    /// Key of the owning remote when this is a derived cache
    #[serde(skip)]
    pub cache_of: Option<String>,
}

impl LocalRepoDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: None,
            policy: RepoPolicy::default(),
            cache_of: None,
        }
    }

    pub fn with_policy(mut self, policy: RepoPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_cache(&self) -> bool {
        self.cache_of.is_some()
    }
}

/// Remote repository definition (an upstream plus an optional local cache)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepoDescriptor {
    pub key: String,

    pub url: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Keep downloaded artifacts in the owned `<key>-cache` repository
    #[serde(default = "default_true")]
    pub store_artifacts_locally: bool,

    /// Proxy key used to reach the upstream
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(flatten)]
    pub policy: RepoPolicy,
}

impl RemoteRepoDescriptor {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            description: None,
            store_artifacts_locally: true,
            proxy: None,
            policy: RepoPolicy::default(),
        }
    }

    /// Key of the owned cache repository
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.key, CACHE_SUFFIX)
    }

    /// Descriptor of the owned cache repository
    pub fn cache_descriptor(&self) -> LocalRepoDescriptor {
        LocalRepoDescriptor {
            key: self.cache_key(),
            description: Some(format!("Cache of {}", self.url)),
            policy: self.policy.clone(),
            cache_of: Some(self.key.clone()),
        }
    }
}

/// Virtual repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRepoDescriptor {
    pub key: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Ordered member keys (locals, remotes, or other virtuals)
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Whether requests made by the server itself may pull through to remotes
    #[serde(default)]
    pub artifactory_requests_can_retrieve_remote_artifacts: bool,
}

impl VirtualRepoDescriptor {
    pub fn new<I, S>(key: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            description: None,
            repositories: members.into_iter().map(Into::into).collect(),
            artifactory_requests_can_retrieve_remote_artifacts: false,
        }
    }
}

/// Network proxy definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDescriptor {
    pub key: String,
    pub host: String,
    pub port: u16,
}

/// Polymorphic repository descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoDescriptor {
    Local(LocalRepoDescriptor),
    Remote(RemoteRepoDescriptor),
    Virtual(VirtualRepoDescriptor),
}

impl RepoDescriptor {
    pub fn key(&self) -> &str {
        match self {
            RepoDescriptor::Local(d) => &d.key,
            RepoDescriptor::Remote(d) => &d.key,
            RepoDescriptor::Virtual(d) => &d.key,
        }
    }

    /// Short kind label
    pub fn kind(&self) -> &'static str {
        match self {
            RepoDescriptor::Local(d) if d.is_cache() => "cache",
            RepoDescriptor::Local(_) => "local",
            RepoDescriptor::Remote(_) => "remote",
            RepoDescriptor::Virtual(_) => "virtual",
        }
    }

    /// Storage policy, for kinds that store items
    pub fn policy(&self) -> Option<&RepoPolicy> {
        match self {
            RepoDescriptor::Local(d) => Some(&d.policy),
            RepoDescriptor::Remote(d) => Some(&d.policy),
            RepoDescriptor::Virtual(_) => None,
        }
    }
}

/// How lock contention is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum LockPolicy {
    /// Report contention immediately as a retryable error
    #[default]
    FailFast,
    /// Wait up to the timeout for the conflicting holder to release
    Wait {
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
}

/// Validate a repository key
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(CoreError::InvalidConfig {
            message: "repository key must not be empty".to_string(),
        });
    }
    if key.contains('/') || key.contains(':') {
        return Err(CoreError::InvalidConfig {
            message: format!("repository key '{}' must not contain '/' or ':'", key),
        });
    }
    Ok(())
}
