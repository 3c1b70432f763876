//! Shared domain types: typed identifiers, content hashes, and blob
//! locations.

pub mod hash;
pub mod id;
pub mod location;

pub use hash::ContentHash;
pub use id::{FileId, FileRecordId, FileVersionId, FolderId, OwnerId, ReservationId, UploadId};
pub use location::BlobLocation;
