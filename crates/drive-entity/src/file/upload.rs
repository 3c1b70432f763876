//! Upload session entity: transient state of a chunked upload.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drive_core::traits::blob::{MultipartUpload, PartTag};
use drive_core::types::{
    BlobLocation, ContentHash, FileId, FolderId, OwnerId, ReservationId, UploadId,
};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "upload_status", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Session created, quota reserved, no chunks yet.
    Initiated,
    /// At least one chunk received.
    InProgress,
    /// A completion attempt holds the session; no other completion or
    /// abort may proceed.
    Completing,
    /// Terminal: the upload produced a file version.
    Completed,
    /// Terminal: cancelled, expired, or failed.
    Aborted,
}

impl UploadStatus {
    /// Return the status as a string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A received chunk: index, backend content tag, size, and arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// 1-based chunk index.
    pub index: i32,
    /// Content tag the blob store returned for this part.
    pub etag: String,
    /// Chunk size in bytes.
    pub size_bytes: i64,
    /// When the chunk arrived.
    pub received_at: DateTime<Utc>,
}

/// An in-progress chunked upload session.
///
/// Chunk indices are unique within a session and fall in
/// `[1, expected_chunks]`. The session completes only when the received
/// index set exactly equals that range.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// The uploading owner.
    pub owner_id: OwnerId,
    /// Existing lineage to version (None = this upload creates a file).
    pub file_id: Option<FileId>,
    /// Intended file name.
    pub file_name: String,
    /// Target folder (None = root).
    pub folder_id: Option<FolderId>,
    /// MIME type, if declared.
    pub content_type: Option<String>,
    /// Declared total size in bytes.
    pub declared_size: i64,
    /// Number of chunks the client will upload.
    pub expected_chunks: i32,
    /// Client-declared content hash, cross-checked at finalize.
    pub expected_hash: Option<ContentHash>,
    /// Staging bucket for the assembled object.
    pub bucket: String,
    /// Staging key for the assembled object.
    pub key: String,
    /// Backend multipart upload identifier.
    pub multipart_id: String,
    /// Received chunk descriptors (JSON array of [`ChunkDescriptor`]).
    pub chunks: serde_json::Value,
    /// The quota reservation backing this session.
    pub reservation_id: ReservationId,
    /// Current lifecycle state.
    pub status: UploadStatus,
    /// Lineage produced by completion (replayed to idempotent retries).
    pub result_file_id: Option<FileId>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Hard expiry; the sweeper aborts sessions past this point.
    pub expires_at: DateTime<Utc>,
    /// Last chunk activity, used for idle-abort.
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    /// Parse the received chunk descriptors, sorted by index.
    pub fn chunk_descriptors(&self) -> Vec<ChunkDescriptor> {
        let mut chunks: Vec<ChunkDescriptor> =
            serde_json::from_value(self.chunks.clone()).unwrap_or_default();
        chunks.sort_by_key(|c| c.index);
        chunks
    }

    /// Find the descriptor recorded for a chunk index.
    pub fn chunk_at(&self, index: i32) -> Option<ChunkDescriptor> {
        self.chunk_descriptors().into_iter().find(|c| c.index == index)
    }

    /// Append a chunk descriptor to the JSON array.
    pub fn push_chunk(&mut self, descriptor: &ChunkDescriptor) {
        let mut chunks = self.chunk_descriptors();
        chunks.push(descriptor.clone());
        self.chunks = serde_json::to_value(chunks).unwrap_or_default();
    }

    /// The set of received chunk indices.
    pub fn received_indices(&self) -> BTreeSet<i32> {
        self.chunk_descriptors().iter().map(|c| c.index).collect()
    }

    /// Whether the received index set exactly equals `{1..expected}`.
    ///
    /// A count comparison is not enough: duplicate indices could mask a
    /// gap, so the index set itself is checked.
    pub fn has_all_chunks(&self) -> bool {
        self.missing_indices().is_empty()
    }

    /// Expected indices that have not been received yet.
    pub fn missing_indices(&self) -> Vec<i32> {
        let received = self.received_indices();
        (1..=self.expected_chunks)
            .filter(|i| !received.contains(i))
            .collect()
    }

    /// Sum of received chunk sizes.
    pub fn received_bytes(&self) -> i64 {
        self.chunk_descriptors().iter().map(|c| c.size_bytes).sum()
    }

    /// Part tags in ascending index order, for multipart completion.
    pub fn ordered_part_tags(&self) -> Vec<PartTag> {
        self.chunk_descriptors()
            .into_iter()
            .map(|c| PartTag {
                part_number: c.index,
                etag: c.etag,
            })
            .collect()
    }

    /// The backend multipart handle for this session.
    pub fn multipart(&self) -> MultipartUpload {
        MultipartUpload {
            location: BlobLocation::new(self.bucket.clone(), self.key.clone()),
            upload_id: self.multipart_id.clone(),
        }
    }

    /// Whether the session is past its hard expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the session has seen no chunk activity for `idle_window`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_window: Duration) -> bool {
        now - self.last_activity_at >= idle_window
    }
}
