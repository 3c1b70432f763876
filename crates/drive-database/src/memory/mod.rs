//! In-memory store implementations for tests and single-node development.
//!
//! Atomicity is provided by per-entity locks: every compound store
//! operation runs under the lock of the one lineage, session, or account
//! it touches, so independent entities never contend.

pub mod file;
pub mod folder;
pub mod quota;
pub mod upload;

pub use file::MemoryFileStore;
pub use folder::MemoryFolderStore;
pub use quota::MemoryQuotaStore;
pub use upload::MemoryUploadStore;
