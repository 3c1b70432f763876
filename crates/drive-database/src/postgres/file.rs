//! PostgreSQL file store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use drive_core::error::{AppError, ErrorKind};
use drive_core::result::AppResult;
use drive_core::types::{BlobLocation, ContentHash, FileId, FolderId, OwnerId};
use drive_entity::file::{FileRecord, FileVersionRecord};

use crate::stores::FileStore;

/// [`FileStore`] backed by the `file_records` and `file_versions` tables.
#[derive(Debug, Clone)]
pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    /// Create a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_RECORD: &str = "INSERT INTO file_records \
     (id, file_id, owner_id, name, folder_id, bucket, key, size_bytes, content_type, \
      content_hash, version, is_current, parent_version, processing_status, metadata, \
      deleted_at, last_accessed_at, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)";

const INSERT_VERSION: &str = "INSERT INTO file_versions \
     (id, file_id, version_number, bucket, key, size_bytes, content_hash, description, \
      created_by, created_at, restored_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    record: &'q FileRecord,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(record.id)
        .bind(record.file_id)
        .bind(record.owner_id)
        .bind(&record.name)
        .bind(record.folder_id)
        .bind(&record.bucket)
        .bind(&record.key)
        .bind(record.size_bytes)
        .bind(&record.content_type)
        .bind(&record.content_hash)
        .bind(record.version)
        .bind(record.is_current)
        .bind(record.parent_version)
        .bind(record.processing_status)
        .bind(&record.metadata)
        .bind(record.deleted_at)
        .bind(record.last_accessed_at)
        .bind(record.created_at)
        .bind(record.updated_at)
}

fn bind_version<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    version: &'q FileVersionRecord,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(version.id)
        .bind(version.file_id)
        .bind(version.version_number)
        .bind(&version.bucket)
        .bind(&version.key)
        .bind(version.size_bytes)
        .bind(&version.content_hash)
        .bind(&version.description)
        .bind(version.created_by)
        .bind(version.created_at)
        .bind(version.restored_at)
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn insert_initial(
        &self,
        record: &FileRecord,
        version: &FileVersionRecord,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        bind_record(sqlx::query(INSERT_RECORD), record)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err)
                    if db_err.constraint() == Some("file_records_initial_key") =>
                {
                    AppError::conflict(format!(
                        "A file already exists at storage key {}/{}",
                        record.bucket, record.key
                    ))
                }
                _ => AppError::with_source(ErrorKind::Database, "Failed to insert file record", e),
            })?;

        bind_version(sqlx::query(INSERT_VERSION), version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to insert version row", e)
            })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit file insert", e)
        })?;
        Ok(())
    }

    async fn find_current(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM file_records WHERE file_id = $1 AND is_current",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find file", e))
    }

    async fn transition_version(
        &self,
        file_id: FileId,
        expected_version: i32,
        next: &FileRecord,
        version_row: &FileVersionRecord,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        // Optimistic demotion: zero rows means a concurrent writer moved
        // the chain first, and the whole transition rolls back.
        let demoted = sqlx::query(
            "UPDATE file_records SET is_current = FALSE, updated_at = $3 \
             WHERE file_id = $1 AND is_current AND version = $2",
        )
        .bind(file_id)
        .bind(expected_version)
        .bind(next.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to demote current record", e)
        })?;

        if demoted.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "File {file_id} is no longer at version {expected_version}"
            )));
        }

        bind_record(sqlx::query(INSERT_RECORD), next)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to insert successor record", e)
            })?;

        bind_version(sqlx::query(INSERT_VERSION), version_row)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to insert version row", e)
            })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit version transition", e)
        })?;
        Ok(())
    }

    async fn list_versions(&self, file_id: FileId) -> AppResult<Vec<FileVersionRecord>> {
        sqlx::query_as::<_, FileVersionRecord>(
            "SELECT * FROM file_versions WHERE file_id = $1 ORDER BY version_number ASC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list versions", e))
    }

    async fn find_version(
        &self,
        file_id: FileId,
        version_number: i32,
    ) -> AppResult<Option<FileVersionRecord>> {
        sqlx::query_as::<_, FileVersionRecord>(
            "SELECT * FROM file_versions WHERE file_id = $1 AND version_number = $2",
        )
        .bind(file_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find version", e))
    }

    async fn mark_version_restored(
        &self,
        file_id: FileId,
        version_number: i32,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE file_versions SET restored_at = $3 \
             WHERE file_id = $1 AND version_number = $2",
        )
        .bind(file_id)
        .bind(version_number)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark version restored", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Version {version_number} of file {file_id} not found"
            )));
        }
        Ok(())
    }

    async fn delete_versions(&self, file_id: FileId, version_numbers: &[i32]) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM file_versions WHERE file_id = $1 AND version_number = ANY($2)",
        )
        .bind(file_id)
        .bind(version_numbers)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete versions", e))?;
        Ok(result.rows_affected())
    }

    async fn find_location_by_hash(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<Option<BlobLocation>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT bucket, key FROM ( \
                 SELECT v.bucket, v.key FROM file_versions v \
                 JOIN file_records r ON r.file_id = v.file_id AND r.is_current \
                 WHERE r.owner_id = $1 AND v.content_hash = $2 \
                 UNION ALL \
                 SELECT r.bucket, r.key FROM file_records r \
                 WHERE r.owner_id = $1 AND r.content_hash = $2 \
             ) candidates LIMIT 1",
        )
        .bind(owner_id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed dedup lookup by hash", e)
        })?;
        Ok(row.map(|(bucket, key)| BlobLocation::new(bucket, key)))
    }

    async fn count_hash_references(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT \
                 (SELECT COUNT(*) FROM file_records r \
                  WHERE r.owner_id = $1 AND r.is_current AND r.content_hash = $2) + \
                 (SELECT COUNT(*) FROM file_versions v \
                  JOIN file_records r ON r.file_id = v.file_id AND r.is_current \
                  WHERE r.owner_id = $1 AND v.content_hash = $2)",
        )
        .bind(owner_id)
        .bind(hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count hash references", e)
        })?;
        Ok(count as u64)
    }

    async fn list_in_folder(&self, folder_id: FolderId) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM file_records \
             WHERE folder_id = $1 AND is_current AND deleted_at IS NULL \
             ORDER BY name ASC",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list folder files", e))
    }

    async fn soft_delete_file(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "UPDATE file_records SET deleted_at = $2, updated_at = $2 \
             WHERE file_id = $1 AND is_current AND deleted_at IS NULL RETURNING *",
        )
        .bind(file_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to soft-delete file", e))?
        .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))
    }

    async fn soft_delete_in_folders(
        &self,
        folder_ids: &[FolderId],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<(FileId, OwnerId)>> {
        let ids: Vec<Uuid> = folder_ids.iter().map(|f| f.into_uuid()).collect();
        let rows = sqlx::query_as::<_, (FileId, OwnerId)>(
            "UPDATE file_records SET deleted_at = $2, updated_at = $2 \
             WHERE folder_id = ANY($1) AND is_current AND deleted_at IS NULL \
             RETURNING file_id, owner_id",
        )
        .bind(&ids)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed cascading file soft-delete", e)
        })?;
        Ok(rows)
    }

    async fn touch_last_accessed(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE file_records SET last_accessed_at = $2 WHERE file_id = $1 AND is_current",
        )
        .bind(file_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to touch last access", e)
        })?;
        Ok(())
    }
}
