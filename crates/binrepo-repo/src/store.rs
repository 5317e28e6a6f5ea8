//! Item storage seam
//!
//! [`ItemStore`] is the physical store the service mutates once the
//! interceptor pipeline lets an operation through. [`MemoryItemStore`]
//! keeps files in memory and synthesizes folders from file paths.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use binrepo_core::{ItemInfo, RepoPath};

use crate::error::{RepoError, Result};

/// Physical item storage
pub trait ItemStore: Send + Sync {
    /// File or folder at `path`
    fn item(&self, path: &RepoPath) -> Option<ItemInfo>;

    fn exists(&self, path: &RepoPath) -> bool {
        self.item(path).is_some()
    }

    /// Immediate children of a folder
    fn children(&self, folder: &RepoPath) -> Vec<ItemInfo>;

    /// Store a file, replacing any previous file at the same path
    fn create(&self, item: ItemInfo) -> Result<()>;

    /// Remove a file or a folder with everything below it
    fn delete(&self, path: &RepoPath) -> Result<ItemInfo>;

    /// Relocate a file or folder; relocated files are stamped with `user`
    fn move_item(&self, from: &RepoPath, to: &RepoPath, user: &str) -> Result<ItemInfo>;

    /// Duplicate a file or folder; the copies are stamped with `user`
    fn copy_item(&self, from: &RepoPath, to: &RepoPath, user: &str) -> Result<ItemInfo>;
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub creates: usize,
    pub deletes: usize,
    pub moves: usize,
    pub copies: usize,
}

/// In-memory item store
#[derive(Clone, Default)]
pub struct MemoryItemStore {
    /// Files only; folders exist implicitly
    files: Arc<RwLock<BTreeMap<RepoPath, ItemInfo>>>,
    operations: Arc<RwLock<OperationCounts>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with files
    pub fn with_items(items: impl IntoIterator<Item = ItemInfo>) -> Self {
        let store = Self::new();
        {
            let mut files = store.write_files();
            for item in items {
                files.insert(item.repo_path.clone(), item);
            }
        }
        store
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn file_count(&self) -> usize {
        self.read_files().len()
    }

    fn read_files(&self) -> RwLockReadGuard<'_, BTreeMap<RepoPath, ItemInfo>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_files(&self) -> RwLockWriteGuard<'_, BTreeMap<RepoPath, ItemInfo>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, update: impl FnOnce(&mut OperationCounts)) {
        update(&mut *self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Files at or below `path`
    fn files_under(files: &BTreeMap<RepoPath, ItemInfo>, path: &RepoPath) -> Vec<ItemInfo> {
        files
            .values()
            .filter(|f| f.repo_path.is_descendant_of(path))
            .cloned()
            .collect()
    }

    /// Re-root `path` from `from` onto `to`
    fn rebase(path: &RepoPath, from: &RepoPath, to: &RepoPath) -> RepoPath {
        let rest = path
            .path()
            .strip_prefix(from.path())
            .unwrap_or_default()
            .trim_start_matches('/');
        if rest.is_empty() {
            to.clone()
        } else {
            to.child(rest)
        }
    }

    fn lookup(files: &BTreeMap<RepoPath, ItemInfo>, path: &RepoPath) -> Option<ItemInfo> {
        if let Some(file) = files.get(path) {
            return Some(file.clone());
        }
        let mut below = files.values().filter(|f| f.repo_path.is_descendant_of(path));
        let first = below.next()?;
        let mut folder = ItemInfo::folder(path.clone());
        folder.created = first.created;
        folder.last_modified = first.last_modified;
        for file in below {
            folder.created = folder.created.min(file.created);
            folder.last_modified = folder.last_modified.max(file.last_modified);
        }
        Some(folder)
    }

    fn relocate(
        &self,
        from: &RepoPath,
        to: &RepoPath,
        user: &str,
        keep_source: bool,
    ) -> Result<ItemInfo> {
        let mut files = self.write_files();
        let source = Self::lookup(&files, from).ok_or_else(|| RepoError::ItemNotFound {
            path: from.to_string(),
        })?;
        if to.is_descendant_of(from) {
            return Err(RepoError::storage(format!(
                "cannot relocate {} into itself ({})",
                from, to
            )));
        }
        if files.contains_key(to) {
            return Err(RepoError::ItemExists {
                path: to.to_string(),
            });
        }

        let now = Utc::now();
        for file in Self::files_under(&files, from) {
            let target = Self::rebase(&file.repo_path, from, to);
            if !keep_source {
                files.remove(&file.repo_path);
            }
            let mut relocated = file.relocated(target.clone());
            relocated.last_modified = now;
            relocated.modified_by = Some(user.to_string());
            files.insert(target, relocated);
        }
        let mut result = source.relocated(to.clone());
        result.last_modified = now;
        result.modified_by = Some(user.to_string());
        Ok(result)
    }
}

impl ItemStore for MemoryItemStore {
    fn item(&self, path: &RepoPath) -> Option<ItemInfo> {
        Self::lookup(&self.read_files(), path)
    }

    fn children(&self, folder: &RepoPath) -> Vec<ItemInfo> {
        let files = self.read_files();
        let mut children: BTreeMap<String, ItemInfo> = BTreeMap::new();

        for file in files.values() {
            if file.repo_path == *folder || !file.repo_path.is_descendant_of(folder) {
                continue;
            }
            let rest = Self::rebase(&file.repo_path, folder, &RepoPath::root(""));
            let (name, nested) = match rest.path().split_once('/') {
                Some((name, _)) => (name.to_string(), true),
                None => (rest.path().to_string(), false),
            };
            if children.contains_key(&name) {
                continue;
            }
            let child = folder.child(&name);
            let info = if nested {
                match Self::lookup(&files, &child) {
                    Some(info) => info,
                    None => continue,
                }
            } else {
                file.clone()
            };
            children.insert(name, info);
        }

        children.into_values().collect()
    }

    fn create(&self, item: ItemInfo) -> Result<()> {
        if item.is_folder() {
            return Err(RepoError::storage(format!(
                "folders are implicit, cannot create {}",
                item.repo_path
            )));
        }
        self.count(|ops| ops.creates += 1);
        let mut files = self.write_files();
        if let Some(parent) = item.repo_path.parent()
            && files.contains_key(&parent)
        {
            return Err(RepoError::ItemExists {
                path: parent.to_string(),
            });
        }
        files.insert(item.repo_path.clone(), item);
        Ok(())
    }

    fn delete(&self, path: &RepoPath) -> Result<ItemInfo> {
        self.count(|ops| ops.deletes += 1);
        let mut files = self.write_files();
        let item = Self::lookup(&files, path).ok_or_else(|| RepoError::ItemNotFound {
            path: path.to_string(),
        })?;
        files.retain(|key, _| !key.is_descendant_of(path));
        Ok(item)
    }

    fn move_item(&self, from: &RepoPath, to: &RepoPath, user: &str) -> Result<ItemInfo> {
        self.count(|ops| ops.moves += 1);
        self.relocate(from, to, user, false)
    }

    fn copy_item(&self, from: &RepoPath, to: &RepoPath, user: &str) -> Result<ItemInfo> {
        self.count(|ops| ops.copies += 1);
        self.relocate(from, to, user, true)
    }
}
