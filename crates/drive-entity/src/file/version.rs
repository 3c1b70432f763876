//! File version entity: an immutable snapshot of a past file state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drive_core::types::{BlobLocation, ContentHash, FileId, FileVersionId, OwnerId};

/// A historical version of a file.
///
/// Version numbers within a file form a gapless ascending sequence from 1.
/// Two versions with the same content hash may share a blob location
/// (deduplication) but never share mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileVersionRecord {
    /// Unique version identifier.
    pub id: FileVersionId,
    /// The logical file this version belongs to.
    pub file_id: FileId,
    /// Sequential version number, unique within the file.
    pub version_number: i32,
    /// Bucket holding this version's content.
    pub bucket: String,
    /// Object key of this version's content.
    pub key: String,
    /// Content size in bytes.
    pub size_bytes: i64,
    /// SHA-256 content hash.
    pub content_hash: ContentHash,
    /// Optional human description of the change.
    pub description: Option<String>,
    /// Who created this version.
    pub created_by: OwnerId,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// Set when this version was later promoted back to current.
    pub restored_at: Option<DateTime<Utc>>,
}

impl FileVersionRecord {
    /// The blob store location of this version's content.
    pub fn location(&self) -> BlobLocation {
        BlobLocation::new(self.bucket.clone(), self.key.clone())
    }

    /// Whether this version was ever restored back to current.
    pub fn was_restored(&self) -> bool {
        self.restored_at.is_some()
    }

    /// Whether this version carries the same content as another.
    pub fn shares_content(&self, other: &FileVersionRecord) -> bool {
        self.content_hash == other.content_hash
    }
}
