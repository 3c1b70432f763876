//! File entities: current records, immutable versions, upload sessions,
//! and content metadata.

pub mod metadata;
pub mod model;
pub mod upload;
pub mod version;

pub use metadata::ContentMetadata;
pub use model::{FileRecord, NewFile, ProcessingStatus};
pub use upload::{ChunkDescriptor, UploadSession, UploadStatus};
pub use version::FileVersionRecord;
