//! Runtime repository graph
//!
//! The graph is built from a [`RepositoriesConfig`] and published through an
//! `ArcSwap`: a reload builds a complete new [`RuntimeGraph`] and swaps it
//! in, so readers never observe a partially built graph and never block on
//! a reload.
//!
//! # Invariants
//!
//! - A key is unique across locals, remotes, derived caches, virtuals, and
//!   proxies, and never equals the reserved global virtual key
//! - Every virtual member references a known repository
//! - A virtual's resolved member list is cached on the runtime object, so a
//!   reload (which creates new runtime objects) invalidates it wholesale

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use binrepo_core::config::validate_key;
use binrepo_core::{
    GLOBAL_VIRTUAL_KEY, LocalRepoDescriptor, LockPolicy, RemoteRepoDescriptor, RepoDescriptor,
    RepositoriesConfig, VirtualRepoDescriptor,
};

use crate::error::{RepoError, Result};
use crate::resolver::ResolvedRepoList;

/// A repository that physically stores items (a local or a remote's cache)
#[derive(Debug)]
pub struct LocalRepo {
    descriptor: LocalRepoDescriptor,
}

impl LocalRepo {
    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &LocalRepoDescriptor {
        &self.descriptor
    }

    pub fn is_cache(&self) -> bool {
        self.descriptor.is_cache()
    }

    pub fn is_blacked_out(&self) -> bool {
        self.descriptor.policy.blacked_out
    }
}

/// A remote repository; items it serves live in its cache
#[derive(Debug)]
pub struct RemoteRepo {
    descriptor: RemoteRepoDescriptor,
}

impl RemoteRepo {
    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &RemoteRepoDescriptor {
        &self.descriptor
    }

    pub fn stores_artifacts_locally(&self) -> bool {
        self.descriptor.store_artifacts_locally
    }

    pub fn is_blacked_out(&self) -> bool {
        self.descriptor.policy.blacked_out
    }

    /// Key of the owned cache, when artifacts are stored locally
    pub fn cache_key(&self) -> Option<String> {
        self.stores_artifacts_locally()
            .then(|| self.descriptor.cache_key())
    }
}

/// A virtual repository with its lazily resolved member list
#[derive(Debug)]
pub struct VirtualRepo {
    descriptor: VirtualRepoDescriptor,
    resolved: OnceLock<Arc<ResolvedRepoList>>,
}

impl VirtualRepo {
    fn new(descriptor: VirtualRepoDescriptor) -> Self {
        Self {
            descriptor,
            resolved: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &VirtualRepoDescriptor {
        &self.descriptor
    }

    /// Declared member keys, in order
    pub fn members(&self) -> &[String] {
        &self.descriptor.repositories
    }

    pub fn can_retrieve_remote_for_internal_requests(&self) -> bool {
        self.descriptor
            .artifactory_requests_can_retrieve_remote_artifacts
    }

    pub(crate) fn resolved_cache(&self) -> &OnceLock<Arc<ResolvedRepoList>> {
        &self.resolved
    }

    /// Whether the member list has been resolved since the last reload
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

/// Kind of a configured key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Local,
    Cache,
    Remote,
    Virtual,
}

/// Immutable snapshot of the configured repositories
#[derive(Debug)]
pub struct RuntimeGraph {
    locals: HashMap<String, Arc<LocalRepo>>,
    remotes: HashMap<String, Arc<RemoteRepo>>,
    virtuals: HashMap<String, Arc<VirtualRepo>>,
    proxies: HashSet<String>,
    /// Keys in declaration order
    order: Vec<String>,
    global: Arc<VirtualRepo>,
    config: Arc<RepositoriesConfig>,
}

impl RuntimeGraph {
    /// Build and validate a graph from configuration
    pub fn build(config: RepositoriesConfig) -> Result<Self> {
        let mut kinds: HashMap<String, &'static str> = HashMap::new();
        let mut claim = |key: &str, kind: &'static str| -> Result<()> {
            validate_key(key)?;
            if key == GLOBAL_VIRTUAL_KEY {
                return Err(RepoError::InvalidConfig {
                    message: format!("'{}' is reserved for the global virtual repository", key),
                });
            }
            if let Some(first) = kinds.insert(key.to_string(), kind) {
                return Err(RepoError::DuplicateKey {
                    key: key.to_string(),
                    first,
                    second: kind,
                });
            }
            Ok(())
        };

        let mut locals = HashMap::new();
        let mut remotes = HashMap::new();
        let mut virtuals = HashMap::new();
        let mut proxies = HashSet::new();
        let mut order = Vec::new();

        for descriptor in config.descriptors() {
            match descriptor {
                RepoDescriptor::Local(d) => {
                    claim(&d.key, if d.is_cache() { "cache" } else { "local" })?;
                    order.push(d.key.clone());
                    locals.insert(d.key.clone(), Arc::new(LocalRepo { descriptor: d }));
                }
                RepoDescriptor::Remote(d) => {
                    claim(&d.key, "remote")?;
                    order.push(d.key.clone());
                    remotes.insert(d.key.clone(), Arc::new(RemoteRepo { descriptor: d }));
                }
                RepoDescriptor::Virtual(d) => {
                    claim(&d.key, "virtual")?;
                    order.push(d.key.clone());
                    virtuals.insert(d.key.clone(), Arc::new(VirtualRepo::new(d)));
                }
            }
        }

        for proxy in &config.proxies {
            claim(&proxy.key, "proxy")?;
            proxies.insert(proxy.key.clone());
        }

        for remote in config.remote_repositories.iter() {
            if let Some(proxy) = &remote.proxy
                && !proxies.contains(proxy)
            {
                return Err(RepoError::InvalidConfig {
                    message: format!(
                        "remote repository '{}' references unknown proxy '{}'",
                        remote.key, proxy
                    ),
                });
            }
        }

        for virt in virtuals.values() {
            for member in virt.members() {
                let known = locals.contains_key(member)
                    || remotes.contains_key(member)
                    || virtuals.contains_key(member);
                if !known {
                    return Err(RepoError::UnknownMember {
                        virtual_key: virt.key().to_string(),
                        member: member.clone(),
                    });
                }
            }
        }

        // The global virtual aggregates every local, then every remote
        let global_members: Vec<String> = config
            .local_repositories
            .iter()
            .map(|d| d.key.clone())
            .chain(config.remote_repositories.iter().map(|d| d.key.clone()))
            .collect();
        let global = Arc::new(VirtualRepo::new(VirtualRepoDescriptor::new(
            GLOBAL_VIRTUAL_KEY,
            global_members,
        )));

        tracing::debug!(
            locals = locals.len(),
            remotes = remotes.len(),
            virtuals = virtuals.len(),
            "built repository graph"
        );

        Ok(Self {
            locals,
            remotes,
            virtuals,
            proxies,
            order,
            global,
            config: Arc::new(config),
        })
    }

    /// Graph with no repositories
    pub fn empty() -> Self {
        Self {
            locals: HashMap::new(),
            remotes: HashMap::new(),
            virtuals: HashMap::new(),
            proxies: HashSet::new(),
            order: Vec::new(),
            global: Arc::new(VirtualRepo::new(VirtualRepoDescriptor::new(
                GLOBAL_VIRTUAL_KEY,
                Vec::<String>::new(),
            ))),
            config: Arc::new(RepositoriesConfig::default()),
        }
    }

    /// Local or cache repository by key
    pub fn local(&self, key: &str) -> Option<&Arc<LocalRepo>> {
        self.locals.get(key)
    }

    pub fn remote(&self, key: &str) -> Option<&Arc<RemoteRepo>> {
        self.remotes.get(key)
    }

    /// Virtual repository by key, including the global virtual
    pub fn virtual_repo(&self, key: &str) -> Option<&Arc<VirtualRepo>> {
        if key == GLOBAL_VIRTUAL_KEY {
            return Some(&self.global);
        }
        self.virtuals.get(key)
    }

    /// The local repository that stores items for `key`: the local itself,
    /// or the cache of a remote
    pub fn storing_repo(&self, key: &str) -> Option<&Arc<LocalRepo>> {
        if let Some(local) = self.locals.get(key) {
            return Some(local);
        }
        let remote = self.remotes.get(key)?;
        let cache_key = remote.cache_key()?;
        self.locals.get(&cache_key)
    }

    pub fn kind_of(&self, key: &str) -> Option<RepoKind> {
        if let Some(local) = self.locals.get(key) {
            return Some(if local.is_cache() {
                RepoKind::Cache
            } else {
                RepoKind::Local
            });
        }
        if self.remotes.contains_key(key) {
            return Some(RepoKind::Remote);
        }
        self.virtual_repo(key).map(|_| RepoKind::Virtual)
    }

    /// Descriptor of any configured repository
    pub fn repo_descriptor_by_key(&self, key: &str) -> Option<RepoDescriptor> {
        if let Some(local) = self.locals.get(key) {
            return Some(RepoDescriptor::Local(local.descriptor.clone()));
        }
        if let Some(remote) = self.remotes.get(key) {
            return Some(RepoDescriptor::Remote(remote.descriptor.clone()));
        }
        self.virtual_repo(key)
            .map(|v| RepoDescriptor::Virtual(v.descriptor.clone()))
    }

    /// True unless the key collides with a repository, a proxy, or a reserved name
    pub fn is_key_available(&self, key: &str) -> bool {
        key != GLOBAL_VIRTUAL_KEY
            && !self.locals.contains_key(key)
            && !self.remotes.contains_key(key)
            && !self.virtuals.contains_key(key)
            && !self.proxies.contains(key)
    }

    /// Configured keys in declaration order (excluding the global virtual)
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn locals(&self) -> impl Iterator<Item = &Arc<LocalRepo>> {
        self.order.iter().filter_map(|k| self.locals.get(k))
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Arc<RemoteRepo>> {
        self.order.iter().filter_map(|k| self.remotes.get(k))
    }

    pub fn virtuals(&self) -> impl Iterator<Item = &Arc<VirtualRepo>> {
        self.order.iter().filter_map(|k| self.virtuals.get(k))
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.config.locking
    }

    pub fn config(&self) -> &RepositoriesConfig {
        &self.config
    }
}

/// Atomically swappable holder of the current [`RuntimeGraph`]
#[derive(Debug)]
pub struct RepositoryGraph {
    current: ArcSwap<RuntimeGraph>,
}

impl RepositoryGraph {
    pub fn new(config: RepositoriesConfig) -> Result<Self> {
        Ok(Self {
            current: ArcSwap::from_pointee(RuntimeGraph::build(config)?),
        })
    }

    pub fn empty() -> Self {
        Self {
            current: ArcSwap::from_pointee(RuntimeGraph::empty()),
        }
    }

    /// Current graph; stays valid for the caller even across reloads
    pub fn snapshot(&self) -> Arc<RuntimeGraph> {
        self.current.load_full()
    }

    /// Build a new graph and swap it in.
    ///
    /// On error the current graph stays in place.
    pub fn reload(&self, config: RepositoriesConfig) -> Result<()> {
        let next = RuntimeGraph::build(config)?;
        self.current.store(Arc::new(next));
        tracing::info!("repository configuration reloaded");
        Ok(())
    }

    pub fn repo_descriptor_by_key(&self, key: &str) -> Option<RepoDescriptor> {
        self.current.load().repo_descriptor_by_key(key)
    }

    pub fn is_key_available(&self, key: &str) -> bool {
        self.current.load().is_key_available(key)
    }
}
