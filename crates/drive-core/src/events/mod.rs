//! Domain events emitted by the storage engine.
//!
//! Delivery is at-least-once: the same event may be observed more than
//! once, and consumers deduplicate on `(file_id, version_number)`.

use serde::{Deserialize, Serialize};

use crate::types::{ContentHash, FileId, FolderId, OwnerId};

/// Events produced by the storage engine for external consumers
/// (processing, notification).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StorageEvent {
    /// A new file version was committed (upload, update, or restore).
    #[serde(rename = "version.created")]
    VersionCreated {
        /// The logical file the version belongs to.
        file_id: FileId,
        /// The committed version number.
        version_number: i32,
        /// The file owner.
        owner_id: OwnerId,
        /// Size of the version's content in bytes.
        size_bytes: i64,
        /// Content hash of the version.
        content_hash: ContentHash,
    },
    /// A file was soft-deleted.
    #[serde(rename = "deleted")]
    FileDeleted {
        /// The deleted file.
        file_id: FileId,
        /// The file owner.
        owner_id: OwnerId,
    },
    /// A folder (and its subtree) was soft-deleted.
    #[serde(rename = "folder.deleted")]
    FolderDeleted {
        /// The deleted folder.
        folder_id: FolderId,
        /// The folder owner.
        owner_id: OwnerId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_version_created_wire_shape() {
        let event = StorageEvent::VersionCreated {
            file_id: FileId::new(),
            version_number: 3,
            owner_id: OwnerId::new(),
            size_bytes: 1024,
            content_hash: ContentHash::from_str(&"ab".repeat(32)).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "version.created");
        assert_eq!(json["version_number"], 3);
    }
}
