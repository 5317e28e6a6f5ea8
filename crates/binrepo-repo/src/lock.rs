//! Per-path read/write locks
//!
//! Locks are keyed by the resolved (storing) [`RepoPath`]. A lock is
//! reentrant for its owner, which is a unit-of-work session. Contention is
//! handled according to the configured [`LockPolicy`]: fail immediately
//! with a retryable error, or wait for a bounded time.
//!
//! The lock table never grows unbounded: an entry is removed as soon as its
//! last holder releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use binrepo_core::{LockPolicy, RepoPath};

use crate::error::{RepoError, Result};

/// Identity of a lock owner (one per unit of work)
pub type OwnerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

/// Proof of an acquired lock; hand it back to [`LockManager::release`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a lock token must be released"]
pub struct LockToken {
    path: RepoPath,
    mode: LockMode,
    owner: OwnerId,
}

impl LockToken {
    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

#[derive(Debug)]
struct WriteHold {
    owner: OwnerId,
    user: String,
    count: usize,
}

#[derive(Debug, Default)]
struct LockEntry {
    readers: HashMap<OwnerId, usize>,
    writer: Option<WriteHold>,
}

impl LockEntry {
    /// Grant the lock or describe the conflicting holder
    fn try_grant(&mut self, mode: LockMode, owner: OwnerId, user: &str) -> std::result::Result<(), String> {
        if let Some(writer) = &self.writer
            && writer.owner != owner
        {
            return Err(format!("write lock held by {}", writer.user));
        }

        match mode {
            LockMode::Read => {
                *self.readers.entry(owner).or_insert(0) += 1;
            }
            LockMode::Write => {
                let other_readers = self.readers.keys().filter(|r| **r != owner).count();
                if other_readers > 0 {
                    return Err(format!("read lock held by {} other session(s)", other_readers));
                }
                match &mut self.writer {
                    Some(writer) => writer.count += 1,
                    None => {
                        self.writer = Some(WriteHold {
                            owner,
                            user: user.to_string(),
                            count: 1,
                        })
                    }
                }
            }
        }
        Ok(())
    }

    fn release(&mut self, mode: LockMode, owner: OwnerId) {
        match mode {
            LockMode::Read => {
                if let Some(count) = self.readers.get_mut(&owner) {
                    *count -= 1;
                    if *count == 0 {
                        self.readers.remove(&owner);
                    }
                }
            }
            LockMode::Write => {
                if let Some(writer) = &mut self.writer
                    && writer.owner == owner
                {
                    writer.count -= 1;
                    if writer.count == 0 {
                        self.writer = None;
                    }
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    entries: HashMap<RepoPath, LockEntry>,
    policy: LockPolicy,
}

/// Process-wide lock table
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    next_owner: AtomicU64,
}

impl LockManager {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            table: Mutex::new(LockTable {
                entries: HashMap::new(),
                policy,
            }),
            released: Condvar::new(),
            next_owner: AtomicU64::new(0),
        }
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> LockPolicy {
        self.table().policy
    }

    /// Change the contention policy (effective for new acquisitions)
    pub fn set_policy(&self, policy: LockPolicy) {
        self.table().policy = policy;
    }

    /// Allocate a fresh owner identity
    pub fn next_owner_id(&self) -> OwnerId {
        self.next_owner.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Acquire a lock on a resolved path
    pub fn acquire(
        &self,
        path: &RepoPath,
        mode: LockMode,
        owner: OwnerId,
        user: &str,
    ) -> Result<LockToken> {
        let mut table = self.table();
        let started = Instant::now();
        let deadline = match table.policy {
            LockPolicy::FailFast => None,
            LockPolicy::Wait { timeout_ms } => Some(started + Duration::from_millis(timeout_ms)),
        };

        loop {
            let entry = table.entries.entry(path.clone()).or_default();
            let holder = match entry.try_grant(mode, owner, user) {
                Ok(()) => {
                    tracing::trace!(path = %path, ?mode, owner, "lock acquired");
                    return Ok(LockToken {
                        path: path.clone(),
                        mode,
                        owner,
                    });
                }
                Err(holder) => holder,
            };

            let Some(deadline) = deadline else {
                return Err(RepoError::Locked {
                    path: path.to_string(),
                    holder,
                });
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(RepoError::LockTimeout {
                    path: path.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            let (guard, _) = self
                .released
                .wait_timeout(table, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            table = guard;
        }
    }

    /// Release a previously acquired lock
    pub fn release(&self, token: LockToken) {
        let mut table = self.table();
        if let Some(entry) = table.entries.get_mut(&token.path) {
            entry.release(token.mode, token.owner);
            if entry.is_empty() {
                table.entries.remove(&token.path);
            }
        }
        drop(table);
        self.released.notify_all();
        tracing::trace!(path = %token.path, mode = ?token.mode, owner = token.owner, "lock released");
    }

    pub fn is_write_locked(&self, path: &RepoPath) -> bool {
        self.table()
            .entries
            .get(path)
            .is_some_and(|e| e.writer.is_some())
    }

    /// User holding the write lock on `path`
    pub fn write_lock_holder(&self, path: &RepoPath) -> Option<String> {
        self.table()
            .entries
            .get(path)
            .and_then(|e| e.writer.as_ref())
            .map(|w| w.user.clone())
    }

    /// Number of paths with at least one holder
    pub fn locked_path_count(&self) -> usize {
        self.table().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn path(p: &str) -> RepoPath {
        RepoPath::new("libs", p)
    }

    #[test]
    fn test_write_excludes_other_owners() {
        let locks = LockManager::new(LockPolicy::FailFast);
        let token = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();

        let err = locks.acquire(&path("a"), LockMode::Write, 2, "bob").unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("alice"));
        assert!(locks.acquire(&path("a"), LockMode::Read, 2, "bob").is_err());

        assert_eq!(locks.write_lock_holder(&path("a")).as_deref(), Some("alice"));
        locks.release(token);
        assert!(!locks.is_write_locked(&path("a")));
        assert_eq!(locks.locked_path_count(), 0);
    }

    #[test]
    fn test_reentrant_for_owner() {
        let locks = LockManager::new(LockPolicy::FailFast);
        let first = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();
        let second = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();
        let read = locks.acquire(&path("a"), LockMode::Read, 1, "alice").unwrap();

        locks.release(second);
        assert!(locks.is_write_locked(&path("a")));
        locks.release(read);
        locks.release(first);
        assert_eq!(locks.locked_path_count(), 0);
    }

    #[test]
    fn test_shared_readers_block_writer() {
        let locks = LockManager::new(LockPolicy::FailFast);
        let r1 = locks.acquire(&path("a"), LockMode::Read, 1, "alice").unwrap();
        let r2 = locks.acquire(&path("a"), LockMode::Read, 2, "bob").unwrap();

        assert!(matches!(
            locks.acquire(&path("a"), LockMode::Write, 3, "carol"),
            Err(RepoError::Locked { .. })
        ));

        locks.release(r1);
        locks.release(r2);
        let w = locks.acquire(&path("a"), LockMode::Write, 3, "carol").unwrap();
        locks.release(w);
    }

    #[test]
    fn test_upgrade_when_sole_reader() {
        let locks = LockManager::new(LockPolicy::FailFast);
        let r = locks.acquire(&path("a"), LockMode::Read, 1, "alice").unwrap();
        let w = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();
        locks.release(w);
        locks.release(r);
        assert_eq!(locks.locked_path_count(), 0);
    }

    #[test]
    fn test_different_paths_do_not_conflict() {
        let locks = LockManager::new(LockPolicy::FailFast);
        let a = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();
        let b = locks.acquire(&path("b"), LockMode::Write, 2, "bob").unwrap();
        assert_eq!(locks.locked_path_count(), 2);
        locks.release(a);
        locks.release(b);
    }

    #[test]
    fn test_wait_policy_times_out() {
        let locks = LockManager::new(LockPolicy::Wait { timeout_ms: 20 });
        let token = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();
        let err = locks.acquire(&path("a"), LockMode::Write, 2, "bob").unwrap_err();
        assert!(matches!(err, RepoError::LockTimeout { .. }));
        assert!(err.is_retryable());
        locks.release(token);
    }

    #[test]
    fn test_wait_policy_acquires_after_release() {
        let locks = Arc::new(LockManager::new(LockPolicy::Wait { timeout_ms: 5_000 }));
        let token = locks.acquire(&path("a"), LockMode::Write, 1, "alice").unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let token = locks.acquire(&path("a"), LockMode::Write, 2, "bob")?;
                let holder = locks.write_lock_holder(&path("a"));
                locks.release(token);
                Ok::<_, RepoError>(holder)
            })
        };

        thread::sleep(Duration::from_millis(30));
        locks.release(token);
        let holder = waiter.join().unwrap().unwrap();
        assert_eq!(holder.as_deref(), Some("bob"));
    }

    #[test]
    fn test_policy_can_change() {
        let locks = LockManager::new(LockPolicy::FailFast);
        locks.set_policy(LockPolicy::Wait { timeout_ms: 10 });
        assert_eq!(locks.policy(), LockPolicy::Wait { timeout_ms: 10 });
        assert_ne!(locks.next_owner_id(), locks.next_owner_id());
    }
}
