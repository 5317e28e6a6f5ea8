//! Package metadata and latest-version tracking
//!
//! On create the package id and version are extracted from the file and
//! stored. Whenever the set of versions of a package changes in a
//! repository, a [`LatestVersionRequest`] is sent over an unbounded channel;
//! the [`LatestVersionWorker`] recomputes the latest-version marker off the
//! mutating call path.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexSet;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use binrepo_core::{ItemInfo, PackageType, RepoPath};

use crate::graph::RepositoryGraph;
use crate::pipeline::{
    AfterCopy, AfterCreate, AfterDelete, AfterMove, HookContext, HookResult, Interceptor,
    InterceptorRegistry,
};

/// Metadata stored for one package file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub id: String,
    pub version: String,
    pub latest: bool,
}

/// A packaging format able to identify its files
pub trait PackageFormat: Send + Sync {
    fn package_type(&self) -> PackageType;

    /// `(id, version)` of a package file, or `None` if the file is not one
    fn identify(&self, item: &ItemInfo) -> Option<(String, String)>;
}

/// NuGet packages: `<id>.<version>.nupkg`
#[derive(Debug, Default, Clone, Copy)]
pub struct NupkgFormat;

impl PackageFormat for NupkgFormat {
    fn package_type(&self) -> PackageType {
        PackageType::Nuget
    }

    fn identify(&self, item: &ItemInfo) -> Option<(String, String)> {
        if item.is_folder() {
            return None;
        }
        let stem = item.name().strip_suffix(".nupkg")?;
        // The version starts at the first dot-separated segment that begins
        // with a digit
        let segments: Vec<&str> = stem.split('.').collect();
        let split = segments
            .iter()
            .position(|s| s.chars().next().is_some_and(|c| c.is_ascii_digit()))?;
        if split == 0 {
            return None;
        }
        Some((segments[..split].join("."), segments[split..].join(".")))
    }
}

/// Identifies recomputation work: one package in one repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LatestVersionRequest {
    pub repo_key: String,
    pub package_id: String,
}

/// Package metadata keyed by item path
#[derive(Debug, Default)]
pub struct PackageMetadataStore {
    entries: RwLock<HashMap<RepoPath, PackageMetadata>>,
}

impl PackageMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RepoPath, PackageMetadata>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RepoPath, PackageMetadata>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, path: &RepoPath) -> Option<PackageMetadata> {
        self.read().get(path).cloned()
    }

    pub fn put(&self, path: RepoPath, metadata: PackageMetadata) {
        self.write().insert(path, metadata);
    }

    /// Remove every entry at or below `path`
    pub fn take_under(&self, path: &RepoPath) -> Vec<(RepoPath, PackageMetadata)> {
        let mut entries = self.write();
        let matching: Vec<RepoPath> = entries
            .keys()
            .filter(|k| k.is_descendant_of(path))
            .cloned()
            .collect();
        matching
            .into_iter()
            .filter_map(|k| entries.remove(&k).map(|m| (k, m)))
            .collect()
    }

    /// Entries at or below `path`, left in place
    pub fn list_under(&self, path: &RepoPath) -> Vec<(RepoPath, PackageMetadata)> {
        self.read()
            .iter()
            .filter(|(k, _)| k.is_descendant_of(path))
            .map(|(k, m)| (k.clone(), m.clone()))
            .collect()
    }

    /// Paths and versions of one package in one repository
    pub fn versions_of(&self, repo_key: &str, package_id: &str) -> Vec<(RepoPath, String)> {
        self.read()
            .iter()
            .filter(|(k, m)| k.repo_key() == repo_key && m.id == package_id)
            .map(|(k, m)| (k.clone(), m.version.clone()))
            .collect()
    }

    /// Path currently flagged as latest for a package
    pub fn latest(&self, repo_key: &str, package_id: &str) -> Option<RepoPath> {
        self.read()
            .iter()
            .find(|(k, m)| k.repo_key() == repo_key && m.id == package_id && m.latest)
            .map(|(k, _)| k.clone())
    }

    /// Flag `latest` and clear the flag on every other version
    fn mark_latest(&self, repo_key: &str, package_id: &str, latest: Option<&RepoPath>) {
        for (path, meta) in self.write().iter_mut() {
            if path.repo_key() == repo_key && meta.id == package_id {
                meta.latest = Some(path) == latest;
            }
        }
    }
}

/// Compare versions by semver precedence, falling back to lexical order
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Create the request channel shared by the interceptor and the worker
pub fn latest_version_channel() -> (
    UnboundedSender<LatestVersionRequest>,
    UnboundedReceiver<LatestVersionRequest>,
) {
    mpsc::unbounded_channel()
}

/// Recomputes latest-version markers
#[derive(Debug, Clone)]
pub struct LatestVersionWorker {
    store: Arc<PackageMetadataStore>,
}

impl LatestVersionWorker {
    pub fn new(store: Arc<PackageMetadataStore>) -> Self {
        Self { store }
    }

    /// Consume requests until every sender is dropped.
    ///
    /// Requests that are already queued are coalesced per package.
    pub async fn run(self, mut requests: UnboundedReceiver<LatestVersionRequest>) {
        while let Some(first) = requests.recv().await {
            let mut batch = IndexSet::new();
            batch.insert(first);
            while let Ok(next) = requests.try_recv() {
                batch.insert(next);
            }
            for request in &batch {
                self.recompute(request);
            }
        }
        tracing::debug!("latest version worker stopped");
    }

    /// Recompute one package; returns the path now flagged latest
    pub fn recompute(&self, request: &LatestVersionRequest) -> Option<RepoPath> {
        let latest = self
            .store
            .versions_of(&request.repo_key, &request.package_id)
            .into_iter()
            .max_by(|(_, a), (_, b)| compare_versions(a, b))
            .map(|(path, _)| path);
        self.store
            .mark_latest(&request.repo_key, &request.package_id, latest.as_ref());
        tracing::debug!(
            repo = %request.repo_key,
            package = %request.package_id,
            latest = ?latest.as_ref().map(|p| p.to_string()),
            "latest version recomputed"
        );
        latest
    }
}

/// Interceptor maintaining package metadata for one format
pub struct PackageMetadataInterceptor {
    graph: Arc<RepositoryGraph>,
    format: Arc<dyn PackageFormat>,
    store: Arc<PackageMetadataStore>,
    requests: UnboundedSender<LatestVersionRequest>,
}

impl PackageMetadataInterceptor {
    pub fn new(
        graph: Arc<RepositoryGraph>,
        format: Arc<dyn PackageFormat>,
        store: Arc<PackageMetadataStore>,
        requests: UnboundedSender<LatestVersionRequest>,
    ) -> Self {
        Self {
            graph,
            format,
            store,
            requests,
        }
    }

    /// Whether `repo_key` holds packages of this format
    fn handles_repo(&self, repo_key: &str) -> bool {
        self.graph
            .snapshot()
            .local(repo_key)
            .is_some_and(|r| r.descriptor().policy.package_type == self.format.package_type())
    }

    fn request(&self, repo_key: &str, package_id: &str) {
        let request = LatestVersionRequest {
            repo_key: repo_key.to_string(),
            package_id: package_id.to_string(),
        };
        if self.requests.send(request).is_err() {
            tracing::warn!(repo = repo_key, package = package_id, "latest version worker is gone");
        }
    }

    /// Store metadata for a package file landing at `path`
    fn store_new(&self, path: &RepoPath, metadata: PackageMetadata) {
        let id = metadata.id.clone();
        self.store.put(
            path.clone(),
            PackageMetadata {
                latest: false,
                ..metadata
            },
        );
        self.request(path.repo_key(), &id);
    }

    /// Re-request every package that lost its latest version
    fn request_for_lost_latest(&self, removed: &[(RepoPath, PackageMetadata)]) {
        let mut lost = IndexSet::new();
        for (path, meta) in removed.iter().filter(|(_, m)| m.latest) {
            lost.insert((path.repo_key().to_string(), meta.id.clone()));
        }
        for (repo, id) in lost {
            self.request(&repo, &id);
        }
    }

    /// Copy (or move) the metadata under `from` onto `to`
    fn relocate(&self, ctx: &HookContext<'_>, keep_source: bool) {
        let from = &ctx.item().repo_path;
        let Some(to) = ctx.target() else {
            return;
        };
        let entries = if keep_source {
            self.store.list_under(from)
        } else {
            self.store.take_under(from)
        };
        if !keep_source {
            self.request_for_lost_latest(&entries);
        }
        if !self.handles_repo(to.repo_key()) {
            return;
        }
        for (path, meta) in entries {
            let rest = path.path().strip_prefix(from.path()).unwrap_or_default();
            let target = if rest.is_empty() {
                to.clone()
            } else {
                to.child(rest.trim_start_matches('/'))
            };
            self.store_new(&target, meta);
        }
    }
}

impl AfterCreate for PackageMetadataInterceptor {
    fn after_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let item = ctx.item();
        if !self.handles_repo(item.repo_key()) {
            return Ok(());
        }
        if let Some((id, version)) = self.format.identify(item) {
            tracing::debug!(path = %item.repo_path, id = %id, version = %version, "package metadata extracted");
            self.store_new(
                &item.repo_path,
                PackageMetadata {
                    id,
                    version,
                    latest: false,
                },
            );
        }
        Ok(())
    }
}

impl AfterDelete for PackageMetadataInterceptor {
    fn after_delete(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let removed = self.store.take_under(&ctx.item().repo_path);
        self.request_for_lost_latest(&removed);
        Ok(())
    }
}

impl AfterMove for PackageMetadataInterceptor {
    fn after_move(&self, ctx: &mut HookContext<'_>) -> HookResult {
        self.relocate(ctx, false);
        Ok(())
    }
}

impl AfterCopy for PackageMetadataInterceptor {
    fn after_copy(&self, ctx: &mut HookContext<'_>) -> HookResult {
        self.relocate(ctx, true);
        Ok(())
    }
}

impl Interceptor for PackageMetadataInterceptor {
    fn name(&self) -> &str {
        "package-metadata"
    }

    fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
        registry.after_create(Arc::clone(&self));
        registry.after_delete(Arc::clone(&self));
        registry.after_move(Arc::clone(&self));
        registry.after_copy(self);
    }
}
