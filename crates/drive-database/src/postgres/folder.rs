//! PostgreSQL folder store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use drive_core::error::{AppError, ErrorKind};
use drive_core::result::AppResult;
use drive_core::types::{FolderId, OwnerId};
use drive_entity::folder::FolderRecord;

use crate::stores::FolderStore;

/// [`FolderStore`] backed by the `folders` table. Uses the parent index
/// for direct listings and the path-prefix index for subtree queries.
#[derive(Debug, Clone)]
pub struct PgFolderStore {
    pool: PgPool,
}

impl PgFolderStore {
    /// Create a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape `LIKE` metacharacters so a path prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

#[async_trait]
impl FolderStore for PgFolderStore {
    async fn insert(&self, folder: &FolderRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO folders (id, owner_id, name, parent_id, path, deleted_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(folder.id)
        .bind(folder.owner_id)
        .bind(&folder.name)
        .bind(folder.parent_id)
        .bind(&folder.path)
        .bind(folder.deleted_at)
        .bind(folder.created_at)
        .bind(folder.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("folders_owner_path_key") =>
            {
                AppError::conflict(format!("A folder at path '{}' already exists", folder.path))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to insert folder", e),
        })?;
        Ok(())
    }

    async fn find(&self, id: FolderId) -> AppResult<Option<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>("SELECT * FROM folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find folder", e))
    }

    async fn find_by_path(
        &self,
        owner_id: OwnerId,
        path: &str,
    ) -> AppResult<Option<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE owner_id = $1 AND path = $2 AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find folder by path", e)
        })
    }

    async fn list_children(&self, parent_id: FolderId) -> AppResult<Vec<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE parent_id = $1 AND deleted_at IS NULL ORDER BY name ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    async fn list_roots(&self, owner_id: OwnerId) -> AppResult<Vec<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders \
             WHERE owner_id = $1 AND parent_id IS NULL AND deleted_at IS NULL ORDER BY name ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list roots", e))
    }

    async fn list_subtree(
        &self,
        owner_id: OwnerId,
        path_prefix: &str,
    ) -> AppResult<Vec<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders \
             WHERE owner_id = $1 AND deleted_at IS NULL AND path LIKE $2 ORDER BY path ASC",
        )
        .bind(owner_id)
        .bind(like_prefix(path_prefix))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list subtree", e))
    }

    async fn update(&self, folder: &FolderRecord) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET name = $2, parent_id = $3, path = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(folder.id)
        .bind(&folder.name)
        .bind(folder.parent_id)
        .bind(&folder.path)
        .bind(folder.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("folders_owner_path_key") =>
            {
                AppError::conflict(format!("A folder at path '{}' already exists", folder.path))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to update folder", e),
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Folder {} not found",
                folder.id
            )));
        }
        Ok(())
    }

    async fn rewrite_subtree_paths(
        &self,
        owner_id: OwnerId,
        old_prefix: &str,
        new_prefix: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE folders \
             SET path = $3 || substr(path, length($2) + 1), updated_at = now() \
             WHERE owner_id = $1 AND deleted_at IS NULL AND path LIKE $4",
        )
        .bind(owner_id)
        .bind(old_prefix)
        .bind(new_prefix)
        .bind(like_prefix(old_prefix))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to rewrite subtree paths", e)
        })?;
        Ok(result.rows_affected())
    }

    async fn soft_delete(&self, ids: &[FolderId], at: DateTime<Utc>) -> AppResult<u64> {
        let ids: Vec<Uuid> = ids.iter().map(|f| f.into_uuid()).collect();
        let result = sqlx::query(
            "UPDATE folders SET deleted_at = $2, updated_at = $2 \
             WHERE id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&ids)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to soft-delete folders", e)
        })?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_escapes_metacharacters() {
        assert_eq!(like_prefix("/docs/"), "/docs/%");
        assert_eq!(like_prefix("/100%_done/"), "/100\\%\\_done/%");
    }
}
