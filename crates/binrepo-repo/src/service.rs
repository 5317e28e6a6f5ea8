//! Repository service facade
//!
//! [`RepositoryService`] ties the graph, the lock manager, the interceptor
//! pipeline, and the item store together behind the operations a
//! higher-level server calls: resolve a path, mutate an item, acquire a unit
//! of work, and reload the configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use binrepo_core::{LocalRepoDescriptor, RepoPath, RepositoriesConfig, StatusHolder};
//! use binrepo_repo::RepositoryService;
//!
//! # fn main() -> binrepo_repo::Result<()> {
//! let mut config = RepositoriesConfig::default();
//! config.add_local(LocalRepoDescriptor::new("libs-local"));
//!
//! let service = RepositoryService::builder(config)?.build();
//! let mut status = StatusHolder::fail_fast();
//! service.create(&RepoPath::new("libs-local", "com/acme/app.jar"), 42, Default::default(), &mut status)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use binrepo_core::{
    ItemInfo, Properties, RepoPath, RepositoriesConfig, StatusReporter,
};

use crate::error::{RepoError, Result};
use crate::graph::{RepoKind, RepositoryGraph};
use crate::lock::{LockManager, LockMode};
use crate::pipeline::{
    Interceptor, InterceptorPipeline, InterceptorRegistry, MutationOutcome, MutationRequest,
};
use crate::resolver::{VirtualRepoItem, VirtualRepoResolver};
use crate::stats::StatsBuffer;
use crate::store::{ItemStore, MemoryItemStore};
use crate::unit_of_work::{SaveHook, SaveHooks, UnitOfWork};

/// User name reported when nobody is authenticated
pub const ANONYMOUS_USER: &str = "anonymous";

/// Source of the acting user's identity
pub trait Authenticator: Send + Sync {
    fn current_user(&self) -> String;
}

/// Every call acts as [`ANONYMOUS_USER`]
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

impl Authenticator for AnonymousAuthenticator {
    fn current_user(&self) -> String {
        ANONYMOUS_USER.to_string()
    }
}

/// Every call acts as one fixed user
#[derive(Debug, Clone)]
pub struct FixedUserAuthenticator {
    user: String,
}

impl FixedUserAuthenticator {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl Authenticator for FixedUserAuthenticator {
    fn current_user(&self) -> String {
        self.user.clone()
    }
}

/// A logical path routed to the repository that stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    /// Storing repository (a local or a cache)
    pub repo_key: String,
    pub info: ItemInfo,
}

impl ResolvedItem {
    pub fn path(&self) -> &RepoPath {
        &self.info.repo_path
    }
}

/// Startup-time assembly of a [`RepositoryService`]
pub struct RepositoryServiceBuilder {
    graph: Arc<RepositoryGraph>,
    store: Option<Arc<dyn ItemStore>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    registry: InterceptorRegistry,
    save_hooks: Vec<Arc<dyn SaveHook>>,
    stats: Option<Arc<StatsBuffer>>,
}

impl RepositoryServiceBuilder {
    pub fn new(config: RepositoriesConfig) -> Result<Self> {
        Ok(Self {
            graph: Arc::new(RepositoryGraph::new(config)?),
            store: None,
            authenticator: None,
            registry: InterceptorRegistry::new(),
            save_hooks: Vec::new(),
            stats: None,
        })
    }

    /// Graph handle for interceptors that need repository lookups
    pub fn graph(&self) -> Arc<RepositoryGraph> {
        Arc::clone(&self.graph)
    }

    pub fn store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn stats(mut self, stats: Arc<StatsBuffer>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Add an interceptor; interceptors run in registration order
    pub fn register_interceptor<I: Interceptor>(mut self, interceptor: Arc<I>) -> Self {
        self.registry.register(interceptor);
        self
    }

    /// Add a hook flushed on unit-of-work commit
    pub fn save_hook(mut self, hook: Arc<dyn SaveHook>) -> Self {
        self.save_hooks.push(hook);
        self
    }

    pub fn build(self) -> RepositoryService {
        let policy = self.graph.snapshot().lock_policy();
        RepositoryService {
            graph: self.graph,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryItemStore::new())),
            authenticator: self
                .authenticator
                .unwrap_or_else(|| Arc::new(AnonymousAuthenticator)),
            locks: Arc::new(LockManager::new(policy)),
            save_hooks: Arc::new(self.save_hooks),
            pipeline: self.registry.build(),
            stats: self.stats.unwrap_or_default(),
        }
    }
}

/// Entry point of the repository engine
pub struct RepositoryService {
    graph: Arc<RepositoryGraph>,
    store: Arc<dyn ItemStore>,
    authenticator: Arc<dyn Authenticator>,
    locks: Arc<LockManager>,
    save_hooks: SaveHooks,
    pipeline: InterceptorPipeline,
    stats: Arc<StatsBuffer>,
}

impl RepositoryService {
    pub fn builder(config: RepositoriesConfig) -> Result<RepositoryServiceBuilder> {
        RepositoryServiceBuilder::new(config)
    }

    pub fn graph(&self) -> &Arc<RepositoryGraph> {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn pipeline(&self) -> &InterceptorPipeline {
        &self.pipeline
    }

    pub fn stats(&self) -> &Arc<StatsBuffer> {
        &self.stats
    }

    pub fn current_user(&self) -> String {
        self.authenticator.current_user()
    }

    /// Route a logical path to the item that serves it.
    ///
    /// Virtual paths are looked up in every resolved member in order; the
    /// first member holding the path wins. Remote paths are served from the
    /// remote's cache. Each storing path is read-locked while it is looked
    /// up, so a pending write on it surfaces as lock contention.
    pub fn resolve(&self, path: &RepoPath, status: &mut dyn StatusReporter) -> Result<ResolvedItem> {
        let graph = self.graph.snapshot();
        let key = path.repo_key();
        let not_found = || RepoError::ItemNotFound {
            path: path.to_string(),
        };

        let candidates: Vec<String> = match graph.kind_of(key) {
            None => {
                return Err(RepoError::RepositoryNotFound {
                    key: key.to_string(),
                });
            }
            Some(RepoKind::Virtual) => VirtualRepoResolver::new(&graph)
                .resolve_key(key, status)?
                .keys()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Some(_) => {
                let repo = graph.storing_repo(key).ok_or_else(not_found)?;
                if repo.is_blacked_out() {
                    return Err(not_found());
                }
                vec![repo.key().to_string()]
            }
        };

        for repo_key in candidates {
            let stored = path.with_repo_key(&repo_key);
            match self.read_item(&stored) {
                Ok(Some(info)) => return Ok(ResolvedItem { repo_key, info }),
                Ok(None) => {}
                Err(e) => {
                    let _ = status.set_error(&e.to_string(), e.status_code(), None);
                    return Err(e);
                }
            }
        }
        Err(not_found())
    }

    /// Look up a stored item under a short-lived read lock
    fn read_item(&self, stored: &RepoPath) -> Result<Option<ItemInfo>> {
        let owner = self.locks.next_owner_id();
        let token = self
            .locks
            .acquire(stored, LockMode::Read, owner, &self.current_user())?;
        let info = self.store.item(stored);
        self.locks.release(token);
        Ok(info)
    }

    /// Storing path of an item that may already exist.
    ///
    /// Only the repository kind is checked: virtual repositories store
    /// nothing, remote keys map to their cache, and blacked-out
    /// repositories refuse every mutation.
    pub fn resolve_storing_path(&self, path: &RepoPath) -> Result<RepoPath> {
        let graph = self.graph.snapshot();
        let key = path.repo_key();
        let not_deployable = |reason: &str| RepoError::NotDeployable {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let repo = match graph.kind_of(key) {
            None => {
                return Err(RepoError::RepositoryNotFound {
                    key: key.to_string(),
                });
            }
            Some(RepoKind::Virtual) => {
                return Err(not_deployable("virtual repositories only aggregate other repositories"));
            }
            Some(_) => graph
                .storing_repo(key)
                .ok_or_else(|| not_deployable("remote repository does not store artifacts locally"))?,
        };
        if repo.is_blacked_out() {
            return Err(not_deployable("repository is blacked out"));
        }
        Ok(path.with_repo_key(repo.key()))
    }

    /// Storing path a new write to `path` lands on.
    ///
    /// On top of [`resolve_storing_path`](Self::resolve_storing_path), the
    /// repository must accept the release or snapshot the path names.
    pub fn resolve_write_target(&self, path: &RepoPath) -> Result<RepoPath> {
        let target = self.resolve_storing_path(path)?;
        let graph = self.graph.snapshot();
        let Some(repo) = graph.local(target.repo_key()) else {
            return Err(RepoError::RepositoryNotFound {
                key: target.repo_key().to_string(),
            });
        };
        let not_deployable = |reason: &str| RepoError::NotDeployable {
            key: path.repo_key().to_string(),
            reason: reason.to_string(),
        };

        let policy = &repo.descriptor().policy;
        let snapshot = is_snapshot_path(path);
        if snapshot && !policy.handle_snapshots {
            return Err(not_deployable("repository does not handle snapshots"));
        }
        if !snapshot && !policy.handle_releases && !path.is_root() {
            return Err(not_deployable("repository does not handle releases"));
        }
        Ok(target)
    }

    /// Open a unit of work without any locks
    pub fn begin_unit_of_work(&self) -> UnitOfWork {
        UnitOfWork::new(
            Arc::clone(&self.locks),
            Arc::clone(&self.save_hooks),
            self.current_user(),
        )
    }

    /// Open a unit of work holding write locks on the storing paths of
    /// `paths`, acquired in sorted order. On failure nothing stays locked.
    pub fn acquire_unit_of_work(&self, paths: &[RepoPath]) -> Result<UnitOfWork> {
        let targets = paths
            .iter()
            .map(|p| self.resolve_storing_path(p))
            .collect::<Result<Vec<_>>>()?;
        let mut uow = self.begin_unit_of_work();
        uow.lock_all(&targets, LockMode::Write)?;
        Ok(uow)
    }

    /// Run a mutation through the pipeline inside an existing unit of work.
    ///
    /// A veto is returned as [`RepoError::Cancelled`].
    pub fn mutate_in<F>(
        &self,
        uow: &UnitOfWork,
        request: &MutationRequest<'_>,
        status: &mut dyn StatusReporter,
        physical: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        let outcome = self.pipeline.mutate(request, uow, status, physical)?;
        match outcome.cancel_signal() {
            Some(signal) => Err(RepoError::Cancelled {
                code: signal.code(),
                message: format!("{} rejected: {}", request.kind.label(), signal.message()),
            }),
            None => Ok(outcome),
        }
    }

    /// Run a mutation in its own unit of work.
    ///
    /// The item path (and the target of a move or copy) are write-locked
    /// for the duration; the unit commits on success and is discarded
    /// otherwise.
    pub fn mutate<F>(
        &self,
        request: &MutationRequest<'_>,
        status: &mut dyn StatusReporter,
        physical: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut paths = vec![request.item.repo_path.clone()];
        paths.extend(request.target.cloned());

        let uow = match self.acquire_unit_of_work(&paths) {
            Ok(uow) => uow,
            Err(e) => {
                let _ = status.set_error(&e.to_string(), e.status_code(), None);
                return Err(e);
            }
        };

        match self.mutate_in(&uow, request, status, physical) {
            Ok(outcome) => {
                uow.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                uow.rollback();
                Err(e)
            }
        }
    }

    /// Store a new file
    pub fn create(
        &self,
        path: &RepoPath,
        size: u64,
        properties: Properties,
        status: &mut dyn StatusReporter,
    ) -> Result<ItemInfo> {
        let target = self.resolve_write_target(path)?;
        let mut item = ItemInfo::file(target, size);
        item.modified_by = Some(self.current_user());
        item.properties = properties;

        self.mutate(&MutationRequest::create(&item), status, || {
            self.store.create(item.clone())
        })?;
        Ok(item)
    }

    /// Delete a file or folder
    pub fn delete(&self, path: &RepoPath, status: &mut dyn StatusReporter) -> Result<ItemInfo> {
        let target = self.resolve_storing_path(path)?;
        let item = self.existing(&target)?;
        self.mutate(&MutationRequest::delete(&item), status, || {
            self.store.delete(&target).map(|_| ())
        })?;
        Ok(item)
    }

    /// Move a file or folder
    pub fn move_item(
        &self,
        from: &RepoPath,
        to: &RepoPath,
        status: &mut dyn StatusReporter,
    ) -> Result<ItemInfo> {
        self.relocate(from, to, false, status)
    }

    /// Copy a file or folder
    pub fn copy_item(
        &self,
        from: &RepoPath,
        to: &RepoPath,
        status: &mut dyn StatusReporter,
    ) -> Result<ItemInfo> {
        self.relocate(from, to, true, status)
    }

    fn relocate(
        &self,
        from: &RepoPath,
        to: &RepoPath,
        copy: bool,
        status: &mut dyn StatusReporter,
    ) -> Result<ItemInfo> {
        let source = self.resolve_storing_path(from)?;
        let dest = self.resolve_write_target(to)?;
        let item = self.existing(&source)?;
        let user = self.current_user();

        let mut relocated = None;
        let request = if copy {
            MutationRequest::copy_to(&item, &dest)
        } else {
            MutationRequest::move_to(&item, &dest)
        };
        self.mutate(&request, status, || {
            let result = if copy {
                self.store.copy_item(&source, &dest, &user)?
            } else {
                self.store.move_item(&source, &dest, &user)?
            };
            relocated = Some(result);
            Ok(())
        })?;
        relocated.ok_or_else(|| RepoError::storage("relocation produced no item"))
    }

    fn existing(&self, path: &RepoPath) -> Result<ItemInfo> {
        self.store.item(path).ok_or_else(|| RepoError::ItemNotFound {
            path: path.to_string(),
        })
    }

    /// Immediate children of a folder; virtual folders merge every member.
    ///
    /// Listings take no locks: writers lock item paths, and a listing is a
    /// point-in-time view of the store.
    pub fn children(
        &self,
        folder: &RepoPath,
        status: &mut dyn StatusReporter,
    ) -> Result<Vec<VirtualRepoItem>> {
        let graph = self.graph.snapshot();
        let key = folder.repo_key();
        match graph.kind_of(key) {
            None => Err(RepoError::RepositoryNotFound {
                key: key.to_string(),
            }),
            Some(RepoKind::Virtual) => VirtualRepoResolver::new(&graph).get_children(
                key,
                folder.path(),
                self.store.as_ref(),
                status,
            ),
            Some(_) => {
                let Some(repo) = graph.storing_repo(key) else {
                    return Ok(Vec::new());
                };
                Ok(self
                    .store
                    .children(&folder.with_repo_key(repo.key()))
                    .into_iter()
                    .map(|info| VirtualRepoItem {
                        path: folder.child(info.name()),
                        folder: info.is_folder(),
                        repo_keys: vec![repo.key().to_string()],
                        info,
                    })
                    .collect())
            }
        }
    }

    /// Swap in a new configuration; the lock policy follows it
    pub fn reload_configuration(&self, config: RepositoriesConfig) -> Result<()> {
        let policy = config.locking;
        self.graph.reload(config)?;
        self.locks.set_policy(policy);
        Ok(())
    }

    pub fn is_write_locked(&self, path: &RepoPath) -> bool {
        self.resolve_storing_path(path)
            .map(|target| self.locks.is_write_locked(&target))
            .unwrap_or(false)
    }

    /// Whether the acting user holds the write lock on `path`
    pub fn is_write_locked_by_current_user(&self, path: &RepoPath) -> bool {
        let Ok(target) = self.resolve_storing_path(path) else {
            return false;
        };
        self.locks
            .write_lock_holder(&target)
            .is_some_and(|holder| holder == self.current_user())
    }

    /// Count a download of a resolved item
    pub fn record_download(&self, item: &ResolvedItem) {
        self.stats
            .record_download(item.path(), &self.current_user());
    }
}

/// Maven-style snapshot detection
fn is_snapshot_path(path: &RepoPath) -> bool {
    path.path().contains("-SNAPSHOT")
}
