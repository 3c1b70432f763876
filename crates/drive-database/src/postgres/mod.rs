//! PostgreSQL store implementations.
//!
//! Compound operations run in a transaction; per-entity serialization
//! comes from row locks (`SELECT ... FOR UPDATE`) or guarded `UPDATE`
//! predicates, never a process-wide lock.

pub mod file;
pub mod folder;
pub mod quota;
pub mod upload;

pub use file::PgFileStore;
pub use folder::PgFolderStore;
pub use quota::PgQuotaStore;
pub use upload::PgUploadStore;
