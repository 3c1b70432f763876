//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drive_core::types::{FolderId, OwnerId};

/// Separator used in materialized folder paths.
pub const PATH_SEPARATOR: char = '/';

/// A folder in the file hierarchy.
///
/// `path` is the materialized concatenation of ancestor names and is kept
/// consistent with `parent_id` on every rename and move.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FolderRecord {
    /// Unique folder identifier.
    pub id: FolderId,
    /// The folder owner.
    pub owner_id: OwnerId,
    /// Folder name.
    pub name: String,
    /// Parent folder (None for root folders).
    pub parent_id: Option<FolderId>,
    /// Full materialized path (e.g., `/documents/reports`).
    pub path: String,
    /// Soft-delete timestamp (None = live).
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
    /// When the folder was last updated.
    pub updated_at: DateTime<Utc>,
}

impl FolderRecord {
    /// Check if this is a root folder (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether the folder is live (not soft-deleted).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Depth in the tree, derived from the materialized path (0 = root).
    pub fn depth(&self) -> usize {
        self.path
            .trim_matches(PATH_SEPARATOR)
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
            .count()
            .saturating_sub(1)
    }

    /// Materialized path of a child with the given name.
    pub fn child_path(&self, name: &str) -> String {
        format!("{}{PATH_SEPARATOR}{name}", self.path)
    }

    /// Path prefix that matches this folder's entire subtree (the folder
    /// path followed by the separator, so `/ab` does not match `/abc`).
    pub fn subtree_prefix(&self) -> String {
        format!("{}{PATH_SEPARATOR}", self.path)
    }
}

/// Data required to create a new folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFolder {
    /// The folder owner.
    pub owner_id: OwnerId,
    /// Folder name.
    pub name: String,
    /// Parent folder (None for root).
    pub parent_id: Option<FolderId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(path: &str, parent: Option<FolderId>) -> FolderRecord {
        FolderRecord {
            id: FolderId::new(),
            owner_id: OwnerId::new(),
            name: path.rsplit(PATH_SEPARATOR).next().unwrap().to_string(),
            parent_id: parent,
            path: path.to_string(),
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_depth() {
        assert_eq!(folder("/docs", None).depth(), 0);
        assert_eq!(folder("/docs/reports", Some(FolderId::new())).depth(), 1);
        assert_eq!(
            folder("/docs/reports/2025", Some(FolderId::new())).depth(),
            2
        );
    }

    #[test]
    fn test_subtree_prefix_does_not_match_siblings() {
        let f = folder("/ab", None);
        assert!("/ab/c".starts_with(&f.subtree_prefix()));
        assert!(!"/abc".starts_with(&f.subtree_prefix()));
    }
}
