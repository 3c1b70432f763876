//! PostgreSQL upload session store.
//!
//! Session state transitions take a row lock (`SELECT ... FOR UPDATE`) so
//! that chunk recording and completion/abort claims serialize per session
//! while different sessions proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use drive_core::error::{AppError, ErrorKind};
use drive_core::result::AppResult;
use drive_core::types::{FileId, UploadId};
use drive_entity::file::{ChunkDescriptor, UploadSession, UploadStatus};

use crate::stores::{ChunkRecordOutcome, CompletionClaim, UploadStore};

/// [`UploadStore`] backed by the `upload_sessions` table.
#[derive(Debug, Clone)]
pub struct PgUploadStore {
    pool: PgPool,
}

impl PgUploadStore {
    /// Create a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })
    }

    async fn lock_session(
        tx: &mut Transaction<'_, Postgres>,
        id: UploadId,
    ) -> AppResult<Option<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock session", e))
    }

    async fn store_session(
        tx: &mut Transaction<'_, Postgres>,
        session: &UploadSession,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE upload_sessions SET chunks = $2, status = $3, result_file_id = $4, \
             last_activity_at = $5 WHERE id = $1",
        )
        .bind(session.id)
        .bind(&session.chunks)
        .bind(session.status)
        .bind(session.result_file_id)
        .bind(session.last_activity_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update session", e))?;
        Ok(())
    }

    async fn commit(tx: Transaction<'_, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit session update", e)
        })
    }
}

#[async_trait]
impl UploadStore for PgUploadStore {
    async fn insert(&self, session: &UploadSession) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO upload_sessions \
             (id, owner_id, file_id, file_name, folder_id, content_type, declared_size, \
              expected_chunks, expected_hash, bucket, key, multipart_id, chunks, \
              reservation_id, status, result_file_id, created_at, expires_at, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(session.id)
        .bind(session.owner_id)
        .bind(session.file_id)
        .bind(&session.file_name)
        .bind(session.folder_id)
        .bind(&session.content_type)
        .bind(session.declared_size)
        .bind(session.expected_chunks)
        .bind(&session.expected_hash)
        .bind(&session.bucket)
        .bind(&session.key)
        .bind(&session.multipart_id)
        .bind(&session.chunks)
        .bind(session.reservation_id)
        .bind(session.status)
        .bind(session.result_file_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert session", e))?;
        Ok(())
    }

    async fn find(&self, id: UploadId) -> AppResult<Option<UploadSession>> {
        sqlx::query_as::<_, UploadSession>("SELECT * FROM upload_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find session", e))
    }

    async fn record_chunk(
        &self,
        id: UploadId,
        chunk: &ChunkDescriptor,
    ) -> AppResult<ChunkRecordOutcome> {
        let mut tx = self.begin().await?;
        let mut session = Self::lock_session(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {id} not found")))?;

        match session.status {
            UploadStatus::Initiated | UploadStatus::InProgress => {}
            other => {
                return Err(AppError::invalid_state(format!(
                    "Upload session {id} is {other}, not accepting chunks"
                )));
            }
        }

        if let Some(existing) = session.chunk_at(chunk.index) {
            if existing.etag == chunk.etag {
                return Ok(ChunkRecordOutcome::Duplicate(session));
            }
            return Err(AppError::conflict(format!(
                "Chunk {} was already uploaded with different content",
                chunk.index
            )));
        }

        session.push_chunk(chunk);
        session.status = UploadStatus::InProgress;
        session.last_activity_at = chunk.received_at;

        Self::store_session(&mut tx, &session).await?;
        Self::commit(tx).await?;
        Ok(ChunkRecordOutcome::Recorded(session))
    }

    async fn claim_completion(&self, id: UploadId) -> AppResult<CompletionClaim> {
        let mut tx = self.begin().await?;
        let mut session = Self::lock_session(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {id} not found")))?;

        match session.status {
            UploadStatus::Completed => return Ok(CompletionClaim::AlreadyCompleted(session)),
            UploadStatus::Aborted => {
                return Err(AppError::invalid_state(format!(
                    "Upload session {id} was aborted"
                )));
            }
            UploadStatus::Completing => {
                return Err(AppError::conflict(format!(
                    "Upload session {id} completion already in progress"
                )));
            }
            UploadStatus::Initiated | UploadStatus::InProgress => {}
        }

        let missing = session.missing_indices();
        if !missing.is_empty() {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is missing chunks {missing:?}"
            )));
        }

        session.status = UploadStatus::Completing;
        Self::store_session(&mut tx, &session).await?;
        Self::commit(tx).await?;
        Ok(CompletionClaim::Claimed(session))
    }

    async fn finish_completion(&self, id: UploadId, file_id: FileId) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = 'completed', result_file_id = $2 \
             WHERE id = $1 AND status = 'completing'",
        )
        .bind(id)
        .bind(file_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to finish session", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is not completing"
            )));
        }
        Ok(())
    }

    async fn yield_completion(&self, id: UploadId) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = 'in_progress' \
             WHERE id = $1 AND status = 'completing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to yield session", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is not completing"
            )));
        }
        Ok(())
    }

    async fn abort_from_completion(&self, id: UploadId) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = 'aborted' \
             WHERE id = $1 AND status = 'completing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to abort session", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is not completing"
            )));
        }
        Ok(())
    }

    async fn claim_abort(&self, id: UploadId) -> AppResult<Option<UploadSession>> {
        let mut tx = self.begin().await?;
        let Some(mut session) = Self::lock_session(&mut tx, id).await? else {
            return Ok(None);
        };

        match session.status {
            UploadStatus::Aborted => Ok(None),
            UploadStatus::Completed => Err(AppError::invalid_state(format!(
                "Upload session {id} already completed"
            ))),
            UploadStatus::Completing => Err(AppError::conflict(format!(
                "Upload session {id} completion in progress"
            ))),
            UploadStatus::Initiated | UploadStatus::InProgress => {
                session.status = UploadStatus::Aborted;
                Self::store_session(&mut tx, &session).await?;
                Self::commit(tx).await?;
                Ok(Some(session))
            }
        }
    }

    async fn delete(&self, id: UploadId) -> AppResult<()> {
        sqlx::query("DELETE FROM upload_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete session", e)
            })?;
        Ok(())
    }

    async fn find_sweepable(
        &self,
        now: DateTime<Utc>,
        idle_window: Duration,
    ) -> AppResult<Vec<UploadSession>> {
        let idle_cutoff = now - idle_window;
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE \
                 (status IN ('initiated', 'in_progress') \
                  AND (expires_at <= $1 OR last_activity_at <= $2)) \
                 OR (status IN ('completed', 'aborted') AND expires_at <= $1)",
        )
        .bind(now)
        .bind(idle_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find sweepable sessions", e)
        })
    }
}
