//! Aggregated metadata recalculation
//!
//! Creating a descriptor file (`*.pom`) in a local, non-cache repository
//! recalculates the parent folder's metadata right away. Deleting one only
//! queues the parent folder on the current unit of work; the queue is
//! flushed once on commit, so many deletions under one folder cost a single
//! recalculation.

use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use binrepo_core::{ItemInfo, RepoPath, SnapshotVersionBehavior};

use crate::error::Result;
use crate::graph::RepositoryGraph;
use crate::pipeline::{
    AfterCreate, AfterDelete, HookContext, HookResult, Interceptor, InterceptorRegistry,
};
use crate::unit_of_work::{SaveHook, SessionId};

/// Extension of descriptor files whose parent folder carries metadata
pub const DESCRIPTOR_EXTENSION: &str = ".pom";

/// Performs the actual recalculation of a folder's metadata
pub trait MetadataRecalculator: Send + Sync {
    fn recalculate(&self, folder: &RepoPath) -> Result<()>;
}

/// Session-keyed queue of folders awaiting recalculation
pub struct MetadataCalculator {
    recalculator: Arc<dyn MetadataRecalculator>,
    queued: Mutex<HashMap<SessionId, IndexSet<RepoPath>>>,
}

impl MetadataCalculator {
    pub fn new(recalculator: Arc<dyn MetadataRecalculator>) -> Self {
        Self {
            recalculator,
            queued: Mutex::new(HashMap::new()),
        }
    }

    fn queued(&self) -> MutexGuard<'_, HashMap<SessionId, IndexSet<RepoPath>>> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recalculate a folder now
    pub fn recalculate_now(&self, folder: &RepoPath) -> Result<()> {
        tracing::debug!(folder = %folder, "recalculating metadata");
        self.recalculator.recalculate(folder)
    }

    /// Queue a folder for recalculation when `session` commits
    pub fn queue(&self, session: SessionId, folder: RepoPath) {
        let added = self.queued().entry(session).or_default().insert(folder.clone());
        if added {
            tracing::debug!(session, folder = %folder, "metadata recalculation queued");
        }
    }

    /// Folders queued for a session, in queue order
    pub fn pending_folders(&self, session: SessionId) -> Vec<RepoPath> {
        self.queued()
            .get(&session)
            .map(|folders| folders.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl SaveHook for MetadataCalculator {
    fn name(&self) -> &str {
        "metadata-calculator"
    }

    fn has_pending_changes(&self, session: SessionId) -> bool {
        self.queued().get(&session).is_some_and(|f| !f.is_empty())
    }

    fn on_save(&self, session: SessionId) -> Result<()> {
        let folders = self.queued().remove(&session).unwrap_or_default();
        for folder in &folders {
            self.recalculate_now(folder)?;
        }
        Ok(())
    }

    fn on_discard(&self, session: SessionId) {
        self.queued().remove(&session);
    }
}

/// Interceptor scheduling metadata recalculation for descriptor files
pub struct MetadataInterceptor {
    graph: Arc<RepositoryGraph>,
    calculator: Arc<MetadataCalculator>,
}

impl MetadataInterceptor {
    pub fn new(graph: Arc<RepositoryGraph>, calculator: Arc<MetadataCalculator>) -> Self {
        Self { graph, calculator }
    }

    /// Descriptor file in a local non-cache repository whose metadata is
    /// not managed by the deployer
    fn applies_to(&self, item: &ItemInfo) -> bool {
        if item.is_folder() || !item.name().ends_with(DESCRIPTOR_EXTENSION) {
            return false;
        }
        let graph = self.graph.snapshot();
        graph.local(item.repo_key()).is_some_and(|repo| {
            !repo.is_cache()
                && repo.descriptor().policy.snapshot_version_behavior
                    != SnapshotVersionBehavior::Deployer
        })
    }
}

impl AfterCreate for MetadataInterceptor {
    fn after_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
        if !self.applies_to(ctx.item()) {
            return Ok(());
        }
        if let Some(folder) = ctx.item().repo_path.parent() {
            self.calculator.recalculate_now(&folder)?;
        }
        Ok(())
    }
}

impl AfterDelete for MetadataInterceptor {
    fn after_delete(&self, ctx: &mut HookContext<'_>) -> HookResult {
        if !self.applies_to(ctx.item()) {
            return Ok(());
        }
        if let Some(folder) = ctx.item().repo_path.parent() {
            self.calculator.queue(ctx.session(), folder);
        }
        Ok(())
    }
}

impl Interceptor for MetadataInterceptor {
    fn name(&self) -> &str {
        "metadata"
    }

    fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
        registry.after_create(Arc::clone(&self));
        registry.after_delete(self);
    }
}
