//! File directory — the folder tree, materialized paths, and cascading
//! soft-delete.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use drive_core::error::AppError;
use drive_core::events::StorageEvent;
use drive_core::result::AppResult;
use drive_core::traits::events::EventPublisher;
use drive_core::types::{FolderId, OwnerId};
use drive_database::stores::{FileStore, FolderStore};
use drive_entity::file::FileRecord;
use drive_entity::folder::{FolderRecord, NewFolder, PATH_SEPARATOR};

/// Direct children of a folder: subfolders and files.
#[derive(Debug, Clone)]
pub struct FolderListing {
    /// Live subfolders, by name.
    pub folders: Vec<FolderRecord>,
    /// Live files, by name.
    pub files: Vec<FileRecord>,
}

/// Owns the folder metadata tree.
///
/// Moves and deletes are batch operations over an arena of affected ids
/// computed first, applied idempotently, so a partial failure is retried
/// without re-scanning from the root.
#[derive(Clone)]
pub struct FileDirectory {
    /// Folder store.
    folders: Arc<dyn FolderStore>,
    /// File store, for folder contents and cascading deletes.
    files: Arc<dyn FileStore>,
    /// Event publisher.
    publisher: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for FileDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDirectory").finish()
    }
}

impl FileDirectory {
    /// Creates a new file directory.
    pub fn new(
        folders: Arc<dyn FolderStore>,
        files: Arc<dyn FileStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            folders,
            files,
            publisher,
        }
    }

    fn validate_name(name: &str) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::validation("Folder name cannot be empty"));
        }
        if name.contains(PATH_SEPARATOR) {
            return Err(AppError::validation(format!(
                "Folder name cannot contain '{PATH_SEPARATOR}'"
            )));
        }
        Ok(())
    }

    /// A live folder by id.
    pub async fn get_folder(&self, folder_id: FolderId) -> AppResult<FolderRecord> {
        self.folders
            .find(folder_id)
            .await?
            .filter(|f| f.is_active())
            .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))
    }

    /// Creates a new folder under the given parent (root when `None`).
    pub async fn create_folder(&self, new_folder: NewFolder) -> AppResult<FolderRecord> {
        Self::validate_name(&new_folder.name)?;

        let path = match new_folder.parent_id {
            Some(parent_id) => {
                let parent = self.get_folder(parent_id).await?;
                if parent.owner_id != new_folder.owner_id {
                    return Err(AppError::not_found(format!(
                        "Folder {parent_id} not found"
                    )));
                }
                parent.child_path(&new_folder.name)
            }
            None => format!("{PATH_SEPARATOR}{}", new_folder.name),
        };

        let now = Utc::now();
        let folder = FolderRecord {
            id: FolderId::new(),
            owner_id: new_folder.owner_id,
            name: new_folder.name,
            parent_id: new_folder.parent_id,
            path,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        self.folders.insert(&folder).await?;

        info!(
            owner_id = %folder.owner_id,
            folder_id = %folder.id,
            path = %folder.path,
            "Folder created"
        );
        Ok(folder)
    }

    /// Renames a folder, rewriting the materialized paths of the whole
    /// subtree.
    pub async fn rename_folder(
        &self,
        folder_id: FolderId,
        new_name: &str,
    ) -> AppResult<FolderRecord> {
        Self::validate_name(new_name)?;
        let mut folder = self.get_folder(folder_id).await?;

        let old_prefix = folder.subtree_prefix();
        folder.name = new_name.to_string();
        folder.path = match folder.path.rfind(PATH_SEPARATOR) {
            Some(last) => format!("{}{PATH_SEPARATOR}{new_name}", &folder.path[..last]),
            None => format!("{PATH_SEPARATOR}{new_name}"),
        };
        folder.updated_at = Utc::now();

        self.folders.update(&folder).await?;
        self.rewrite_descendants(&folder, &old_prefix).await?;

        info!(folder_id = %folder_id, new_name, "Folder renamed");
        Ok(folder)
    }

    /// Moves a folder under a new parent (root when `None`), rewriting
    /// the materialized paths of the whole subtree.
    pub async fn move_folder(
        &self,
        folder_id: FolderId,
        new_parent_id: Option<FolderId>,
    ) -> AppResult<FolderRecord> {
        let mut folder = self.get_folder(folder_id).await?;

        let new_path = match new_parent_id {
            Some(parent_id) => {
                if parent_id == folder_id {
                    return Err(AppError::validation("Cannot move a folder into itself"));
                }
                let target = self.get_folder(parent_id).await?;
                if target.owner_id != folder.owner_id {
                    return Err(AppError::not_found(format!(
                        "Folder {parent_id} not found"
                    )));
                }
                if target.path.starts_with(&folder.subtree_prefix()) {
                    return Err(AppError::validation(
                        "Cannot move a folder into one of its descendants",
                    ));
                }
                target.child_path(&folder.name)
            }
            None => format!("{PATH_SEPARATOR}{}", folder.name),
        };

        let old_prefix = folder.subtree_prefix();
        folder.parent_id = new_parent_id;
        folder.path = new_path;
        folder.updated_at = Utc::now();

        self.folders.update(&folder).await?;
        self.rewrite_descendants(&folder, &old_prefix).await?;

        info!(
            folder_id = %folder_id,
            new_parent = ?new_parent_id,
            path = %folder.path,
            "Folder moved"
        );
        Ok(folder)
    }

    /// Soft-deletes a folder, all descendant folders, and all contained
    /// files as one logical operation.
    ///
    /// The affected ids are computed first, then applied in idempotent
    /// batches: a crash mid-way leaves already-deleted rows deleted, and
    /// a retry finishes the remainder.
    pub async fn soft_delete_folder(&self, folder_id: FolderId) -> AppResult<u64> {
        let folder = self.get_folder(folder_id).await?;
        let now = Utc::now();

        // Arena first: the folder plus every live descendant.
        let descendants = self
            .folders
            .list_subtree(folder.owner_id, &folder.subtree_prefix())
            .await?;
        let mut ids: Vec<FolderId> = Vec::with_capacity(descendants.len() + 1);
        ids.push(folder.id);
        ids.extend(descendants.iter().map(|f| f.id));

        let folders_deleted = self.folders.soft_delete(&ids, now).await?;
        let affected_files = self.files.soft_delete_in_folders(&ids, now).await?;

        info!(
            folder_id = %folder_id,
            folders = folders_deleted,
            files = affected_files.len(),
            "Folder subtree soft-deleted"
        );

        self.publish_deleted(StorageEvent::FolderDeleted {
            folder_id,
            owner_id: folder.owner_id,
        })
        .await;
        for (file_id, owner_id) in &affected_files {
            self.publish_deleted(StorageEvent::FileDeleted {
                file_id: *file_id,
                owner_id: *owner_id,
            })
            .await;
        }

        Ok(folders_deleted + affected_files.len() as u64)
    }

    /// Direct children only, via the parent-reference index.
    pub async fn list_children(&self, folder_id: FolderId) -> AppResult<FolderListing> {
        self.get_folder(folder_id).await?;
        let folders = self.folders.list_children(folder_id).await?;
        let files = self.files.list_in_folder(folder_id).await?;
        Ok(FolderListing { folders, files })
    }

    /// Every live folder under the given one, via the path-prefix index.
    pub async fn list_subtree(&self, folder_id: FolderId) -> AppResult<Vec<FolderRecord>> {
        let folder = self.get_folder(folder_id).await?;
        self.folders
            .list_subtree(folder.owner_id, &folder.subtree_prefix())
            .await
    }

    /// An owner's live root folders.
    pub async fn list_roots(&self, owner_id: OwnerId) -> AppResult<Vec<FolderRecord>> {
        self.folders.list_roots(owner_id).await
    }

    async fn rewrite_descendants(
        &self,
        folder: &FolderRecord,
        old_prefix: &str,
    ) -> AppResult<()> {
        let changed = self
            .folders
            .rewrite_subtree_paths(folder.owner_id, old_prefix, &folder.subtree_prefix())
            .await?;
        if changed > 0 {
            info!(folder_id = %folder.id, descendants = changed, "Descendant paths rewritten");
        }
        Ok(())
    }

    async fn publish_deleted(&self, event: StorageEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "Failed to publish deletion event");
        }
    }
}
