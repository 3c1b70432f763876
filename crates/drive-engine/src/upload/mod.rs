//! Chunked upload lifecycle.

pub mod manager;
pub mod sweeper;

pub use manager::{InitiateUploadRequest, UploadSessionManager};
pub use sweeper::UploadSweeper;
