//! # drive-engine
//!
//! The Altus Drive storage engine: chunked upload sessions, append-only
//! version chains with per-owner deduplication, the folder tree, and
//! per-owner quota accounting.
//!
//! Concurrency model: independent owners and independent files proceed
//! fully in parallel. Serialization happens at exactly three points —
//! per-session completion, per-file version-chain mutation, and per-owner
//! quota updates — each scoped to the one entity involved, never
//! process-wide.

pub mod directory;
pub mod events;
pub mod quota;
pub mod upload;
pub mod version;

pub use directory::FileDirectory;
pub use events::BroadcastPublisher;
pub use quota::QuotaLedger;
pub use upload::{UploadSessionManager, UploadSweeper};
pub use version::VersionStore;
