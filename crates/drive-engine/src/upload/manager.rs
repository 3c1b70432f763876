//! Upload session manager — owns the chunked upload state machine.
//!
//! Chunk uploads within one session run in parallel; the transition into
//! completion is claimed exactly once per session through the store's
//! compare-and-swap, and an abort racing a completion resolves to a
//! single winner with the loser observing a terminal-state error.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use drive_blob::hasher::ContentHasher;
use drive_core::config::upload::UploadConfig;
use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::traits::blob::BlobStore;
use drive_core::types::{BlobLocation, ContentHash, FileId, FolderId, OwnerId, UploadId};
use drive_database::stores::{ChunkRecordOutcome, CompletionClaim, UploadStore};
use drive_entity::file::{
    ChunkDescriptor, ContentMetadata, FileRecord, NewFile, UploadSession, UploadStatus,
};

use crate::directory::FileDirectory;
use crate::quota::QuotaLedger;
use crate::version::VersionStore;

/// Request to begin a chunked upload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InitiateUploadRequest {
    /// The uploading owner.
    pub owner_id: OwnerId,
    /// Existing file to version (None = this upload creates a file).
    pub file_id: Option<FileId>,
    /// File name.
    pub file_name: String,
    /// Target folder (None = root).
    pub folder_id: Option<FolderId>,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Declared total size in bytes.
    pub declared_size: i64,
    /// Client-computed content hash, cross-checked at finalize.
    pub expected_hash: Option<ContentHash>,
}

/// Owns the chunked/multipart upload lifecycle.
pub struct UploadSessionManager {
    /// Session store.
    sessions: Arc<dyn UploadStore>,
    /// Blob store receiving the parts.
    blobs: Arc<dyn BlobStore>,
    /// Quota ledger for reservations.
    ledger: Arc<QuotaLedger>,
    /// Version store receiving completed uploads.
    versions: Arc<VersionStore>,
    /// Directory for target-folder validation.
    directory: Arc<FileDirectory>,
    /// Upload configuration.
    config: UploadConfig,
    /// Bucket new objects land in.
    bucket: String,
}

impl std::fmt::Debug for UploadSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSessionManager").finish()
    }
}

impl UploadSessionManager {
    /// Creates a new upload session manager.
    pub fn new(
        sessions: Arc<dyn UploadStore>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<QuotaLedger>,
        versions: Arc<VersionStore>,
        directory: Arc<FileDirectory>,
        config: UploadConfig,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            blobs,
            ledger,
            versions,
            directory,
            config,
            bucket: bucket.into(),
        }
    }

    /// Validate the request shape and the upload target (folder for new
    /// files, live lineage for updates).
    async fn validate_target(&self, req: &InitiateUploadRequest, size: i64) -> AppResult<()> {
        if req.file_name.trim().is_empty() {
            return Err(AppError::validation("File name cannot be empty"));
        }
        if req.file_name.contains('/') || req.file_name.contains('\\') {
            return Err(AppError::validation(
                "File name cannot contain path separators",
            ));
        }
        if size < 0 {
            return Err(AppError::validation(format!(
                "Declared size cannot be negative ({size})"
            )));
        }
        if size as u64 > self.config.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "File exceeds maximum upload size of {} bytes",
                self.config.max_upload_size_bytes
            )));
        }

        if let Some(folder_id) = req.folder_id {
            let folder = self.directory.get_folder(folder_id).await?;
            if folder.owner_id != req.owner_id {
                return Err(AppError::not_found(format!("Folder {folder_id} not found")));
            }
        }
        if let Some(file_id) = req.file_id {
            let current = self.versions.current(file_id).await?;
            if current.owner_id != req.owner_id {
                return Err(AppError::not_found(format!("File {file_id} not found")));
            }
        }
        Ok(())
    }

    /// Declare intent to upload: reserves quota for the declared size,
    /// allocates a multipart handle, and persists the session.
    ///
    /// Fails with `QuotaExceeded` when the declared size does not fit the
    /// owner's remaining quota; a failed initiation holds nothing.
    pub async fn initiate(&self, req: InitiateUploadRequest) -> AppResult<UploadSession> {
        self.validate_target(&req, req.declared_size).await?;

        let chunk_size = self.config.chunk_size_bytes as i64;
        let chunk_size = chunk_size.max(1);
        let expected_chunks =
            (((req.declared_size + chunk_size - 1) / chunk_size).max(1)) as i32;

        let reservation = self.ledger.reserve(req.owner_id, req.declared_size).await?;

        let upload_id = UploadId::new();
        let location = BlobLocation::new(
            self.bucket.clone(),
            format!("objects/{}/{}/{}", req.owner_id, upload_id, req.file_name),
        );

        let multipart = match self.blobs.initiate_multipart(&location).await {
            Ok(m) => m,
            Err(e) => {
                self.ledger.release(req.owner_id, reservation.id).await?;
                return Err(e);
            }
        };

        let now = Utc::now();
        let session = UploadSession {
            id: upload_id,
            owner_id: req.owner_id,
            file_id: req.file_id,
            file_name: req.file_name,
            folder_id: req.folder_id,
            content_type: req.content_type,
            declared_size: req.declared_size,
            expected_chunks,
            expected_hash: req.expected_hash,
            bucket: location.bucket,
            key: location.key,
            multipart_id: multipart.upload_id.clone(),
            chunks: serde_json::json!([]),
            reservation_id: reservation.id,
            status: UploadStatus::Initiated,
            result_file_id: None,
            created_at: now,
            expires_at: now + Duration::seconds(self.config.session_ttl_seconds as i64),
            last_activity_at: now,
        };

        if let Err(e) = self.sessions.insert(&session).await {
            let _ = self.blobs.abort_multipart(&multipart).await;
            self.ledger.release(req.owner_id, reservation.id).await?;
            return Err(e);
        }

        info!(
            owner_id = %session.owner_id,
            upload_id = %session.id,
            declared_size = session.declared_size,
            expected_chunks = session.expected_chunks,
            "Chunked upload initiated"
        );
        Ok(session)
    }

    /// Single-request upload for content small enough to arrive in one
    /// body: no session, one `put_object`, same quota and versioning
    /// semantics as the chunked path.
    pub async fn simple_upload(
        &self,
        req: InitiateUploadRequest,
        data: Bytes,
    ) -> AppResult<FileRecord> {
        let size_bytes = data.len() as i64;
        self.validate_target(&req, size_bytes).await?;

        let reservation = self.ledger.reserve(req.owner_id, size_bytes).await?;

        let upload_id = UploadId::new();
        let location = BlobLocation::new(
            self.bucket.clone(),
            format!("objects/{}/{}/{}", req.owner_id, upload_id, req.file_name),
        );
        let hash = ContentHasher::hash_bytes(&data);

        if let Some(expected) = &req.expected_hash {
            if expected != &hash {
                self.ledger.release(req.owner_id, reservation.id).await?;
                return Err(AppError::integrity_failure(format!(
                    "Upload hash mismatch: expected {expected}, computed {hash}"
                )));
            }
        }

        if let Err(e) = self.blobs.put_object(&location, data).await {
            self.ledger.release(req.owner_id, reservation.id).await?;
            return Err(e);
        }

        if let Err(e) = self
            .ledger
            .commit(req.owner_id, reservation.id, size_bytes)
            .await
        {
            let _ = self.blobs.delete_object(&location).await;
            return Err(e);
        }

        let new_file = NewFile {
            owner_id: req.owner_id,
            name: req.file_name,
            folder_id: req.folder_id,
            metadata: ContentMetadata::for_content_type(req.content_type.as_deref()),
            content_type: req.content_type,
        };
        let record = match self
            .record_version(req.file_id, new_file, location.clone(), hash, size_bytes)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                let _ = self.ledger.credit(req.owner_id, size_bytes).await;
                let _ = self.blobs.delete_object(&location).await;
                return Err(e);
            }
        };

        info!(
            owner_id = %record.owner_id,
            file_id = %record.file_id,
            version = record.version,
            size = size_bytes,
            "Simple upload completed"
        );
        Ok(record)
    }

    /// Upload one chunk. Chunks may arrive out of order and in parallel.
    ///
    /// Re-submitting an index with identical content is accepted silently
    /// (same content tag); re-submitting with different content is a
    /// `Conflict`. Backend failures are retryable by the client with the
    /// same chunk index.
    pub async fn upload_chunk(
        &self,
        upload_id: UploadId,
        index: i32,
        data: Bytes,
    ) -> AppResult<ChunkDescriptor> {
        let session = self
            .sessions
            .find(upload_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {upload_id} not found")))?;

        match session.status {
            UploadStatus::Initiated | UploadStatus::InProgress => {}
            other => {
                return Err(AppError::invalid_state(format!(
                    "Upload session {upload_id} is {other}, not accepting chunks"
                )));
            }
        }
        if index < 1 || index > session.expected_chunks {
            return Err(AppError::validation(format!(
                "Chunk index {index} out of range [1, {}]",
                session.expected_chunks
            )));
        }

        let size_bytes = data.len() as i64;
        let etag = self
            .blobs
            .upload_part(&session.multipart(), index, data)
            .await?;

        let descriptor = ChunkDescriptor {
            index,
            etag,
            size_bytes,
            received_at: Utc::now(),
        };

        match self.sessions.record_chunk(upload_id, &descriptor).await? {
            ChunkRecordOutcome::Recorded(_) => {
                debug!(upload_id = %upload_id, chunk = index, bytes = size_bytes, "Chunk uploaded");
            }
            ChunkRecordOutcome::Duplicate(_) => {
                debug!(upload_id = %upload_id, chunk = index, "Duplicate chunk accepted");
            }
        }
        Ok(descriptor)
    }

    /// Complete the upload: exactly one completion attempt proceeds per
    /// session; a concurrent or repeated attempt on a completed session
    /// idempotently returns the prior result.
    ///
    /// Finalize errors from the blob store are surfaced without internal
    /// retries (multipart completion is not safely idempotent); the
    /// caller decides between another attempt and abort.
    pub async fn complete(&self, upload_id: UploadId) -> AppResult<FileRecord> {
        let session = match self.sessions.claim_completion(upload_id).await? {
            CompletionClaim::AlreadyCompleted(session) => {
                let file_id = session.result_file_id.ok_or_else(|| {
                    AppError::internal(format!(
                        "Completed session {upload_id} lost its result file"
                    ))
                })?;
                debug!(upload_id = %upload_id, file_id = %file_id, "Replaying completed upload");
                return self.versions.current(file_id).await;
            }
            CompletionClaim::Claimed(session) => session,
        };

        // The blob store cannot self-validate chunk sizes, so accumulated
        // sizes are cross-checked against the declaration before finalize.
        let received = session.received_bytes();
        if received != session.declared_size {
            self.abort_completing(&session).await?;
            return Err(AppError::integrity_failure(format!(
                "Upload {upload_id} size mismatch: declared {} bytes, received {received}",
                session.declared_size
            )));
        }

        let multipart = session.multipart();
        let final_size = match self
            .blobs
            .complete_multipart(&multipart, &session.ordered_part_tags())
            .await
        {
            Ok(size) => size as i64,
            Err(e) => {
                // Leave the session recoverable; the caller chooses
                // between another completion attempt and abort.
                self.sessions.yield_completion(upload_id).await?;
                return Err(e);
            }
        };

        let location = multipart.location.clone();
        let hash = match self.hash_assembled(&location).await {
            Ok(hash) => hash,
            Err(e) => {
                let _ = self.blobs.delete_object(&location).await;
                self.abort_completing(&session).await?;
                return Err(e);
            }
        };

        if let Some(expected) = &session.expected_hash {
            if expected != &hash {
                let _ = self.blobs.delete_object(&location).await;
                self.abort_completing(&session).await?;
                return Err(AppError::integrity_failure(format!(
                    "Upload {upload_id} hash mismatch: expected {expected}, computed {hash}"
                )));
            }
        }

        // The blob store is the source of truth for size: a drift from
        // the declaration adjusts the ledger and warns, never fails.
        if final_size != session.declared_size {
            warn!(
                upload_id = %upload_id,
                declared = session.declared_size,
                actual = final_size,
                "Assembled size differs from declaration; committing actual size"
            );
        }
        if let Err(e) = self
            .ledger
            .commit(session.owner_id, session.reservation_id, final_size)
            .await
        {
            let _ = self.blobs.delete_object(&location).await;
            self.abort_completing(&session).await?;
            return Err(e);
        }

        let new_file = NewFile {
            owner_id: session.owner_id,
            name: session.file_name.clone(),
            folder_id: session.folder_id,
            content_type: session.content_type.clone(),
            metadata: ContentMetadata::for_content_type(session.content_type.as_deref()),
        };
        let record = match self
            .record_version(session.file_id, new_file, location.clone(), hash, final_size)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                // Compensate the committed usage before tearing down.
                let _ = self.ledger.credit(session.owner_id, final_size).await;
                let _ = self.blobs.delete_object(&location).await;
                self.abort_completing(&session).await?;
                return Err(e);
            }
        };

        self.sessions
            .finish_completion(upload_id, record.file_id)
            .await?;

        info!(
            upload_id = %upload_id,
            file_id = %record.file_id,
            version = record.version,
            size = final_size,
            chunks = session.expected_chunks,
            "Chunked upload completed"
        );
        Ok(record)
    }

    /// Abort an upload: releases the quota reservation, discards staged
    /// parts, and removes the session. Idempotent — aborting an unknown
    /// or already-aborted session succeeds; aborting a completed session
    /// is `InvalidState`, and one racing a completion observes `Conflict`.
    pub async fn abort(&self, upload_id: UploadId) -> AppResult<()> {
        let Some(session) = self.sessions.claim_abort(upload_id).await? else {
            return Ok(());
        };
        self.cleanup_session(&session).await?;
        info!(upload_id = %upload_id, "Upload aborted");
        Ok(())
    }

    /// Tear down a terminal session left behind by a crashed cleanup or
    /// past its retention: release, discard parts, drop the record.
    pub(crate) async fn cleanup_terminal(&self, session: &UploadSession) -> AppResult<()> {
        self.cleanup_session(session).await?;
        debug!(upload_id = %session.id, status = %session.status, "Terminal session removed");
        Ok(())
    }

    async fn cleanup_session(&self, session: &UploadSession) -> AppResult<()> {
        self.ledger
            .release(session.owner_id, session.reservation_id)
            .await?;
        // A failed part discard leaves the record in place so a later
        // sweep retries the cleanup.
        self.blobs.abort_multipart(&session.multipart()).await?;
        self.sessions.delete(session.id).await?;
        Ok(())
    }

    /// Abort from within a held completion claim.
    async fn abort_completing(&self, session: &UploadSession) -> AppResult<()> {
        self.sessions.abort_from_completion(session.id).await?;
        self.cleanup_session(session).await?;
        Ok(())
    }

    /// Stream the assembled object back through the content addresser.
    /// Hashing happens over the final byte order, never per chunk.
    async fn hash_assembled(&self, location: &BlobLocation) -> AppResult<ContentHash> {
        let stream = self.blobs.get_object(location).await?;
        let (hash, _) = ContentHasher::hash_stream(stream).await?;
        Ok(hash)
    }

    /// Hand the stored object to the version store: version 1 for a new
    /// file, the next version for an update.
    async fn record_version(
        &self,
        file_id: Option<FileId>,
        new_file: NewFile,
        location: BlobLocation,
        hash: ContentHash,
        size_bytes: i64,
    ) -> AppResult<FileRecord> {
        match file_id {
            Some(file_id) => {
                self.versions
                    .create_next_version(
                        file_id,
                        location,
                        hash,
                        size_bytes,
                        None,
                        new_file.owner_id,
                    )
                    .await
            }
            None => {
                self.versions
                    .create_initial_version(new_file, location, hash, size_bytes)
                    .await
            }
        }
    }
}
