//! # drive-blob
//!
//! Blob store backends for Altus Drive and the streaming content
//! addresser. The [`drive_core::traits::blob::BlobStore`] trait is defined
//! in `drive-core`; this crate provides the memory, local-filesystem, and
//! (feature-gated) S3 implementations.

pub mod hasher;
pub mod providers;

pub use hasher::ContentHasher;
pub use providers::build_blob_store;
