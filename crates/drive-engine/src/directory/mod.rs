//! Folder hierarchy and path consistency.

pub mod service;

pub use service::{FileDirectory, FolderListing};
