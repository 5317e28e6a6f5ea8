//! Units of work
//!
//! A [`UnitOfWork`] is a session that owns path locks and accumulates
//! deferred side effects. Committing runs every [`SaveHook`] with pending
//! changes for the session, then releases all locks. Dropping an
//! uncommitted unit discards the pending changes and releases all locks,
//! so locks never outlive their session.

use std::sync::Arc;

use binrepo_core::RepoPath;

use crate::error::{RepoError, Result};
use crate::lock::{LockManager, LockMode, LockToken, OwnerId};

/// Session identity; equal to the lock owner id of the unit of work
pub type SessionId = OwnerId;

/// Deferred work flushed when a unit of work commits
pub trait SaveHook: Send + Sync {
    fn name(&self) -> &str;

    fn has_pending_changes(&self, session: SessionId) -> bool;

    /// Flush the session's pending changes
    fn on_save(&self, session: SessionId) -> Result<()>;

    /// Drop the session's pending changes without applying them
    fn on_discard(&self, session: SessionId);
}

/// Save hooks fixed at startup and shared by every unit of work
pub type SaveHooks = Arc<Vec<Arc<dyn SaveHook>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Committed,
    Discarded,
}

/// Lock-owning session
pub struct UnitOfWork {
    id: SessionId,
    user: String,
    locks: Arc<LockManager>,
    save_hooks: SaveHooks,
    tokens: Vec<LockToken>,
    state: State,
}

impl UnitOfWork {
    pub fn new(locks: Arc<LockManager>, save_hooks: SaveHooks, user: impl Into<String>) -> Self {
        let id = locks.next_owner_id();
        let user = user.into();
        tracing::debug!(session = id, user = %user, "unit of work started");
        Self {
            id,
            user,
            locks,
            save_hooks,
            tokens: Vec::new(),
            state: State::Active,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Lock a resolved path for the rest of the session
    pub fn lock(&mut self, path: &RepoPath, mode: LockMode) -> Result<()> {
        if !self.is_active() {
            return Err(RepoError::UnitOfWorkClosed);
        }
        if self.holds(path, mode) {
            return Ok(());
        }
        let token = self.locks.acquire(path, mode, self.id, &self.user)?;
        self.tokens.push(token);
        Ok(())
    }

    /// Lock several paths in a deterministic (sorted, deduplicated) order
    pub fn lock_all(&mut self, paths: &[RepoPath], mode: LockMode) -> Result<()> {
        let mut ordered: Vec<&RepoPath> = paths.iter().collect();
        ordered.sort();
        ordered.dedup();
        for path in ordered {
            self.lock(path, mode)?;
        }
        Ok(())
    }

    /// Whether this session already holds a lock at least as strong as `mode`
    pub fn holds(&self, path: &RepoPath, mode: LockMode) -> bool {
        self.tokens.iter().any(|t| {
            t.path() == path && (t.mode() == mode || t.mode() == LockMode::Write)
        })
    }

    pub fn locked_paths(&self) -> Vec<&RepoPath> {
        self.tokens.iter().map(LockToken::path).collect()
    }

    /// Whether any save hook has deferred work for this session
    pub fn has_pending_changes(&self) -> bool {
        self.save_hooks
            .iter()
            .any(|hook| hook.has_pending_changes(self.id))
    }

    /// Flush deferred work, then release every lock.
    ///
    /// When a save hook fails, the remaining hooks discard their changes and
    /// the locks are still released.
    pub fn commit(mut self) -> Result<()> {
        if !self.is_active() {
            return Err(RepoError::UnitOfWorkClosed);
        }

        let mut outcome = Ok(());
        for hook in self.save_hooks.iter() {
            if outcome.is_err() {
                hook.on_discard(self.id);
                continue;
            }
            if hook.has_pending_changes(self.id) {
                tracing::debug!(session = self.id, hook = hook.name(), "flushing save hook");
                outcome = hook.on_save(self.id);
            }
        }

        self.state = if outcome.is_ok() {
            State::Committed
        } else {
            State::Discarded
        };
        self.release_all();
        tracing::debug!(session = self.id, ok = outcome.is_ok(), "unit of work committed");
        outcome
    }

    /// Discard deferred work and release every lock
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if !self.is_active() {
            return;
        }
        for hook in self.save_hooks.iter() {
            hook.on_discard(self.id);
        }
        self.state = State::Discarded;
        self.release_all();
        tracing::debug!(session = self.id, "unit of work discarded");
    }

    fn release_all(&mut self) {
        for token in self.tokens.drain(..).rev() {
            self.locks.release(token);
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("locks", &self.tokens.len())
            .field("state", &self.state)
            .finish()
    }
}
