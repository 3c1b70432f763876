//! In-memory upload session store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::types::{FileId, UploadId};
use drive_entity::file::{ChunkDescriptor, UploadSession, UploadStatus};

use crate::stores::{ChunkRecordOutcome, CompletionClaim, UploadStore};

/// In-memory [`UploadStore`] with one lock per session, so chunk uploads
/// for different sessions never contend and state transitions per session
/// are serialized.
#[derive(Debug, Default)]
pub struct MemoryUploadStore {
    sessions: DashMap<UploadId, Arc<Mutex<UploadSession>>>,
}

impl MemoryUploadStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: UploadId) -> AppResult<Arc<Mutex<UploadSession>>> {
        self.sessions
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AppError::not_found(format!("Upload session {id} not found")))
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn insert(&self, session: &UploadSession) -> AppResult<()> {
        self.sessions
            .insert(session.id, Arc::new(Mutex::new(session.clone())));
        Ok(())
    }

    async fn find(&self, id: UploadId) -> AppResult<Option<UploadSession>> {
        Ok(self
            .sessions
            .get(&id)
            .map(|e| e.value().lock().unwrap().clone()))
    }

    async fn record_chunk(
        &self,
        id: UploadId,
        chunk: &ChunkDescriptor,
    ) -> AppResult<ChunkRecordOutcome> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().unwrap();

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
                return Ok(ChunkRecordOutcome::Duplicate(session.clone()));
            }
            return Err(AppError::conflict(format!(
                "Chunk {} was already uploaded with different content",
                chunk.index
            )));
        }

        session.push_chunk(chunk);
        session.status = UploadStatus::InProgress;
        session.last_activity_at = chunk.received_at;
        Ok(ChunkRecordOutcome::Recorded(session.clone()))
    }

    async fn claim_completion(&self, id: UploadId) -> AppResult<CompletionClaim> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().unwrap();

        match session.status {
            UploadStatus::Completed => {
                return Ok(CompletionClaim::AlreadyCompleted(session.clone()));
            }
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
        Ok(CompletionClaim::Claimed(session.clone()))
    }

    async fn finish_completion(&self, id: UploadId, file_id: FileId) -> AppResult<()> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().unwrap();
        if session.status != UploadStatus::Completing {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is {}, expected completing",
                session.status
            )));
        }
        session.status = UploadStatus::Completed;
        session.result_file_id = Some(file_id);
        Ok(())
    }

    async fn yield_completion(&self, id: UploadId) -> AppResult<()> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().unwrap();
        if session.status != UploadStatus::Completing {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is {}, expected completing",
                session.status
            )));
        }
        session.status = UploadStatus::InProgress;
        Ok(())
    }

    async fn abort_from_completion(&self, id: UploadId) -> AppResult<()> {
        let entry = self.entry(id)?;
        let mut session = entry.lock().unwrap();
        if session.status != UploadStatus::Completing {
            return Err(AppError::invalid_state(format!(
                "Upload session {id} is {}, expected completing",
                session.status
            )));
        }
        session.status = UploadStatus::Aborted;
        Ok(())
    }

    async fn claim_abort(&self, id: UploadId) -> AppResult<Option<UploadSession>> {
        let Some(entry) = self.sessions.get(&id).map(|e| Arc::clone(e.value())) else {
            return Ok(None);
        };
        let mut session = entry.lock().unwrap();

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
                Ok(Some(session.clone()))
            }
        }
    }

    async fn delete(&self, id: UploadId) -> AppResult<()> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn find_sweepable(
        &self,
        now: DateTime<Utc>,
        idle_window: Duration,
    ) -> AppResult<Vec<UploadSession>> {
        Ok(self
            .sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value().lock().unwrap();
                let sweepable = if session.status.is_terminal() {
                    session.is_expired(now)
                } else {
                    session.is_expired(now) || session.is_idle(now, idle_window)
                };
                sweepable.then(|| session.clone())
            })
            .collect())
    }
}
