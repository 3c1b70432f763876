//! File record entity: the addressable state of one logical file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drive_core::types::{BlobLocation, ContentHash, FileId, FileRecordId, FolderId, OwnerId};

use super::metadata::ContentMetadata;

/// Post-upload processing state of a file (thumbnailing, indexing, etc.
/// happen in downstream services; the engine only tracks the flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "processing_status", rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Waiting to be processed.
    Pending,
    /// Currently being processed.
    Processing,
    /// Processing finished.
    Completed,
    /// Processing failed.
    Failed,
}

/// One row of a logical file's lineage.
///
/// A lineage is identified by `file_id`; each version transition demotes
/// the current row (`is_current = false`) and inserts a successor. At most
/// one live row per lineage is current.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Row identity (distinct per version transition).
    pub id: FileRecordId,
    /// The logical file lineage this row belongs to.
    pub file_id: FileId,
    /// The file owner.
    pub owner_id: OwnerId,
    /// Display name (including extension).
    pub name: String,
    /// Containing folder (None = root).
    pub folder_id: Option<FolderId>,
    /// Bucket holding this row's content.
    pub bucket: String,
    /// Object key of this row's content.
    pub key: String,
    /// Content size in bytes.
    pub size_bytes: i64,
    /// MIME type of the content.
    pub content_type: Option<String>,
    /// SHA-256 content hash.
    pub content_hash: ContentHash,
    /// Version number, monotonic from 1.
    pub version: i32,
    /// Whether this row is the lineage's current state.
    pub is_current: bool,
    /// The version this row was derived from (None at v1).
    pub parent_version: Option<i32>,
    /// Downstream processing state.
    pub processing_status: ProcessingStatus,
    /// Content-category metadata (JSON form of [`ContentMetadata`]).
    pub metadata: serde_json::Value,
    /// Soft-delete timestamp (None = live).
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the content was last read.
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether the record is live (not soft-deleted).
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The blob store location of this row's content.
    pub fn location(&self) -> BlobLocation {
        BlobLocation::new(self.bucket.clone(), self.key.clone())
    }

    /// Typed view of the metadata JSON.
    pub fn content_metadata(&self) -> ContentMetadata {
        ContentMetadata::from_json_value(&self.metadata)
    }

    /// Get the file extension (lowercase), if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit('.')
            .next()
            .filter(|ext| *ext != self.name)
            .map(|ext| ext.to_lowercase())
    }
}

/// Data required to create the first version of a new file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFile {
    /// The file owner.
    pub owner_id: OwnerId,
    /// Display name.
    pub name: String,
    /// Containing folder (None = root).
    pub folder_id: Option<FolderId>,
    /// MIME type.
    pub content_type: Option<String>,
    /// Content-category metadata.
    pub metadata: ContentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> FileRecord {
        FileRecord {
            id: FileRecordId::new(),
            file_id: FileId::new(),
            owner_id: OwnerId::new(),
            name: name.to_string(),
            folder_id: None,
            bucket: "drive".into(),
            key: "objects/x".into(),
            size_bytes: 10,
            content_type: None,
            content_hash: "0".repeat(64).parse().unwrap(),
            version: 1,
            is_current: true,
            parent_version: None,
            processing_status: ProcessingStatus::Pending,
            metadata: serde_json::json!({}),
            deleted_at: None,
            last_accessed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(record("report.PDF").extension(), Some("pdf".into()));
        assert_eq!(record("noext").extension(), None);
    }

    #[test]
    fn test_active_until_deleted() {
        let mut rec = record("a.txt");
        assert!(rec.is_active());
        rec.deleted_at = Some(Utc::now());
        assert!(!rec.is_active());
    }
}
