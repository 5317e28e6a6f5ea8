//! Virtual repository resolution
//!
//! A virtual's members are flattened depth-first in declared order into a
//! list of concrete (storing) repositories. The first occurrence of a
//! repository wins; later duplicates are skipped silently. Cycles between
//! virtuals are broken at the repeated virtual and reported as a warning.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use binrepo_core::{ItemInfo, RepoPath, StatusReporter};

use crate::error::{RepoError, Result};
use crate::graph::{LocalRepo, RemoteRepo, RuntimeGraph, VirtualRepo};
use crate::store::ItemStore;

/// Flattened, ordered member list of a virtual repository
#[derive(Debug, Clone)]
pub struct ResolvedRepoList {
    virtual_key: String,
    repos: Vec<Arc<LocalRepo>>,
    remotes: Vec<Arc<RemoteRepo>>,
    allow_internal_remote: bool,
    warnings: Vec<String>,
}

impl ResolvedRepoList {
    pub fn virtual_key(&self) -> &str {
        &self.virtual_key
    }

    /// Storing repositories (locals and caches) in lookup order
    pub fn repos(&self) -> &[Arc<LocalRepo>] {
        &self.repos
    }

    pub fn keys(&self) -> Vec<&str> {
        self.repos.iter().map(|r| r.key()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.repos.iter().any(|r| r.key() == key)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Remote repositories reached during resolution, in order
    pub fn remotes(&self) -> &[Arc<RemoteRepo>] {
        &self.remotes
    }

    /// Remotes that may be queried for this request.
    ///
    /// Requests that originate from the server itself only reach remotes when
    /// the virtual allows it.
    pub fn remote_candidates(&self, internal_request: bool) -> &[Arc<RemoteRepo>] {
        if internal_request && !self.allow_internal_remote {
            &[]
        } else {
            &self.remotes
        }
    }

    /// Cycle warnings produced while resolving
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// An entry of a virtual folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRepoItem {
    /// Path under the virtual repository
    pub path: RepoPath,
    pub folder: bool,
    /// Storing repositories that contain this entry, in lookup order
    pub repo_keys: Vec<String>,
    /// Snapshot from the first repository that contains the entry
    pub info: ItemInfo,
}

impl VirtualRepoItem {
    pub fn name(&self) -> &str {
        self.path.name()
    }
}

/// Resolves virtual repositories against one graph snapshot
pub struct VirtualRepoResolver<'g> {
    graph: &'g RuntimeGraph,
}

struct Walk {
    seen_repos: HashSet<String>,
    seen_remotes: HashSet<String>,
    repos: Vec<Arc<LocalRepo>>,
    remotes: Vec<Arc<RemoteRepo>>,
    warnings: Vec<String>,
}

impl<'g> VirtualRepoResolver<'g> {
    pub fn new(graph: &'g RuntimeGraph) -> Self {
        Self { graph }
    }

    /// Resolve a virtual by key
    pub fn resolve_key(
        &self,
        key: &str,
        status: &mut dyn StatusReporter,
    ) -> Result<Arc<ResolvedRepoList>> {
        let virt = self
            .graph
            .virtual_repo(key)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                key: key.to_string(),
            })?;
        Ok(self.resolve(virt, status))
    }

    /// Flattened member list of a virtual.
    ///
    /// The list is cached on the virtual until the next reload. Cycle
    /// warnings are reported to `status` on every call.
    pub fn resolve(
        &self,
        virt: &VirtualRepo,
        status: &mut dyn StatusReporter,
    ) -> Arc<ResolvedRepoList> {
        let resolved = virt
            .resolved_cache()
            .get_or_init(|| Arc::new(self.compute(virt)))
            .clone();
        for warning in resolved.warnings() {
            status.set_warning(warning, None);
        }
        resolved
    }

    fn compute(&self, virt: &VirtualRepo) -> ResolvedRepoList {
        let mut walk = Walk {
            seen_repos: HashSet::new(),
            seen_remotes: HashSet::new(),
            repos: Vec::new(),
            remotes: Vec::new(),
            warnings: Vec::new(),
        };
        let mut chain = Vec::new();
        self.visit(virt, &mut chain, &mut walk);

        tracing::debug!(
            virtual_key = virt.key(),
            repos = walk.repos.len(),
            remotes = walk.remotes.len(),
            "resolved virtual repository"
        );

        ResolvedRepoList {
            virtual_key: virt.key().to_string(),
            repos: walk.repos,
            remotes: walk.remotes,
            allow_internal_remote: virt.can_retrieve_remote_for_internal_requests(),
            warnings: walk.warnings,
        }
    }

    fn visit(&self, virt: &VirtualRepo, chain: &mut Vec<String>, walk: &mut Walk) {
        chain.push(virt.key().to_string());

        for member in virt.members() {
            if let Some(local) = self.graph.local(member) {
                push_local(walk, local);
            } else if let Some(remote) = self.graph.remote(member) {
                if remote.is_blacked_out() {
                    continue;
                }
                if let Some(cache) = remote.cache_key().and_then(|k| self.graph.local(&k)) {
                    push_local(walk, cache);
                }
                if walk.seen_remotes.insert(remote.key().to_string()) {
                    walk.remotes.push(Arc::clone(remote));
                }
            } else if let Some(nested) = self.graph.virtual_repo(member) {
                if chain.iter().any(|k| k == member) {
                    walk.warnings.push(format!(
                        "Cycle detected in virtual repositories: {} -> {}; skipping '{}'",
                        chain.join(" -> "),
                        member,
                        member
                    ));
                    continue;
                }
                self.visit(nested, chain, walk);
            } else {
                tracing::debug!(virtual_key = virt.key(), member = %member, "skipping unknown member");
            }
        }

        chain.pop();
    }

    /// Merged listing of a folder across every repository of a virtual
    pub fn get_children(
        &self,
        virtual_key: &str,
        relative_path: &str,
        store: &dyn ItemStore,
        status: &mut dyn StatusReporter,
    ) -> Result<Vec<VirtualRepoItem>> {
        let resolved = self.resolve_key(virtual_key, status)?;
        let folder = RepoPath::new(virtual_key, relative_path);

        let mut merged: IndexMap<String, VirtualRepoItem> = IndexMap::new();
        for repo in resolved.repos() {
            let concrete = folder.with_repo_key(repo.key());
            for child in store.children(&concrete) {
                let name = child.name().to_string();
                match merged.get_mut(&name) {
                    Some(existing) => existing.repo_keys.push(repo.key().to_string()),
                    None => {
                        merged.insert(
                            name.clone(),
                            VirtualRepoItem {
                                path: folder.child(&name),
                                folder: child.is_folder(),
                                repo_keys: vec![repo.key().to_string()],
                                info: child,
                            },
                        );
                    }
                }
            }
        }

        let mut items: Vec<VirtualRepoItem> = merged.into_values().collect();
        items.sort_by(|a, b| b.folder.cmp(&a.folder).then_with(|| a.name().cmp(b.name())));
        Ok(items)
    }

    /// First stored item for `relative_path`, searching members in order
    pub fn find_item(
        &self,
        virtual_key: &str,
        relative_path: &str,
        store: &dyn ItemStore,
        status: &mut dyn StatusReporter,
    ) -> Result<Option<ItemInfo>> {
        let resolved = self.resolve_key(virtual_key, status)?;
        let path = RepoPath::new(virtual_key, relative_path);
        Ok(resolved
            .repos()
            .iter()
            .find_map(|repo| store.item(&path.with_repo_key(repo.key()))))
    }
}

fn push_local(walk: &mut Walk, local: &Arc<LocalRepo>) {
    if local.is_blacked_out() {
        return;
    }
    if walk.seen_repos.insert(local.key().to_string()) {
        walk.repos.push(Arc::clone(local));
    }
}
