//! In-memory folder store.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::types::{FolderId, OwnerId};
use drive_entity::folder::FolderRecord;

use crate::stores::FolderStore;

/// In-memory [`FolderStore`].
///
/// Reads scan the map; structural writes (insert, path rewrites) take a
/// single writer lock so path-uniqueness checks cannot race.
#[derive(Debug, Default)]
pub struct MemoryFolderStore {
    folders: DashMap<FolderId, FolderRecord>,
    writer: Mutex<()>,
}

impl MemoryFolderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn live_path_taken(&self, owner_id: OwnerId, path: &str, excluding: Option<FolderId>) -> bool {
        self.folders.iter().any(|e| {
            let f = e.value();
            f.owner_id == owner_id
                && f.is_active()
                && f.path == path
                && Some(f.id) != excluding
        })
    }
}

#[async_trait]
impl FolderStore for MemoryFolderStore {
    async fn insert(&self, folder: &FolderRecord) -> AppResult<()> {
        let _guard = self.writer.lock().unwrap();
        if self.live_path_taken(folder.owner_id, &folder.path, None) {
            return Err(AppError::conflict(format!(
                "A folder at path '{}' already exists",
                folder.path
            )));
        }
        self.folders.insert(folder.id, folder.clone());
        Ok(())
    }

    async fn find(&self, id: FolderId) -> AppResult<Option<FolderRecord>> {
        Ok(self.folders.get(&id).map(|e| e.value().clone()))
    }

    async fn find_by_path(
        &self,
        owner_id: OwnerId,
        path: &str,
    ) -> AppResult<Option<FolderRecord>> {
        Ok(self
            .folders
            .iter()
            .find(|e| {
                let f = e.value();
                f.owner_id == owner_id && f.is_active() && f.path == path
            })
            .map(|e| e.value().clone()))
    }

    async fn list_children(&self, parent_id: FolderId) -> AppResult<Vec<FolderRecord>> {
        let mut children: Vec<FolderRecord> = self
            .folders
            .iter()
            .filter(|e| {
                let f = e.value();
                f.parent_id == Some(parent_id) && f.is_active()
            })
            .map(|e| e.value().clone())
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn list_roots(&self, owner_id: OwnerId) -> AppResult<Vec<FolderRecord>> {
        let mut roots: Vec<FolderRecord> = self
            .folders
            .iter()
            .filter(|e| {
                let f = e.value();
                f.owner_id == owner_id && f.parent_id.is_none() && f.is_active()
            })
            .map(|e| e.value().clone())
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roots)
    }

    async fn list_subtree(
        &self,
        owner_id: OwnerId,
        path_prefix: &str,
    ) -> AppResult<Vec<FolderRecord>> {
        let mut folders: Vec<FolderRecord> = self
            .folders
            .iter()
            .filter(|e| {
                let f = e.value();
                f.owner_id == owner_id && f.is_active() && f.path.starts_with(path_prefix)
            })
            .map(|e| e.value().clone())
            .collect();
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(folders)
    }

    async fn update(&self, folder: &FolderRecord) -> AppResult<()> {
        let _guard = self.writer.lock().unwrap();
        if !self.folders.contains_key(&folder.id) {
            return Err(AppError::not_found(format!(
                "Folder {} not found",
                folder.id
            )));
        }
        if self.live_path_taken(folder.owner_id, &folder.path, Some(folder.id)) {
            return Err(AppError::conflict(format!(
                "A folder at path '{}' already exists",
                folder.path
            )));
        }
        self.folders.insert(folder.id, folder.clone());
        Ok(())
    }

    async fn rewrite_subtree_paths(
        &self,
        owner_id: OwnerId,
        old_prefix: &str,
        new_prefix: &str,
    ) -> AppResult<u64> {
        let _guard = self.writer.lock().unwrap();
        let mut changed = 0u64;
        for mut entry in self.folders.iter_mut() {
            let f = entry.value_mut();
            if f.owner_id == owner_id && f.is_active() && f.path.starts_with(old_prefix) {
                f.path = format!("{new_prefix}{}", &f.path[old_prefix.len()..]);
                f.updated_at = Utc::now();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn soft_delete(&self, ids: &[FolderId], at: DateTime<Utc>) -> AppResult<u64> {
        let mut changed = 0u64;
        for id in ids {
            if let Some(mut entry) = self.folders.get_mut(id) {
                let f = entry.value_mut();
                if f.is_active() {
                    f.deleted_at = Some(at);
                    f.updated_at = at;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}
