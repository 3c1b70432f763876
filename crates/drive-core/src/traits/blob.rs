//! Blob store trait for pluggable object storage backends.
//!
//! The engine treats object storage as an opaque collaborator with this
//! contract. The trait is defined here in `drive-core` and implemented in
//! `drive-blob` (memory, local filesystem, S3).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;
use crate::types::BlobLocation;

/// A byte stream type used for reading object contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Handle for an in-progress multipart upload, bound to its target
/// location for the lifetime of the upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MultipartUpload {
    /// The destination the parts will be assembled into.
    pub location: BlobLocation,
    /// Backend-assigned upload identifier.
    pub upload_id: String,
}

/// A completed part: its ordinal and the content tag the backend returned.
///
/// Tags are opaque; the engine only compares them for equality when
/// detecting duplicate chunk submissions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartTag {
    /// 1-based part number.
    pub part_number: i32,
    /// Backend content tag (etag) for the uploaded part.
    pub etag: String,
}

/// Trait for object storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "memory", "s3").
    fn provider_type(&self) -> &str;

    /// Begin a multipart upload targeting the given location.
    async fn initiate_multipart(&self, location: &BlobLocation) -> AppResult<MultipartUpload>;

    /// Upload one part. Parts may arrive in any order and in parallel;
    /// re-uploading a part number overwrites the previous part. Returns
    /// the part's content tag.
    async fn upload_part(
        &self,
        upload: &MultipartUpload,
        part_number: i32,
        data: Bytes,
    ) -> AppResult<String>;

    /// Assemble the uploaded parts, in the order given, into the final
    /// object. Returns the assembled object's size in bytes. Not safely
    /// idempotent: callers must not retry a failed completion.
    async fn complete_multipart(
        &self,
        upload: &MultipartUpload,
        parts: &[PartTag],
    ) -> AppResult<u64>;

    /// Abort a multipart upload and discard its staged parts. Safe to
    /// call on an already-aborted or unknown upload.
    async fn abort_multipart(&self, upload: &MultipartUpload) -> AppResult<()>;

    /// Store a complete object in a single call (small, non-chunked
    /// path). Returns the object's content tag.
    async fn put_object(&self, location: &BlobLocation, data: Bytes) -> AppResult<String>;

    /// Read an object as a byte stream.
    async fn get_object(&self, location: &BlobLocation) -> AppResult<ByteStream>;

    /// Read an object fully into memory.
    async fn get_object_bytes(&self, location: &BlobLocation) -> AppResult<Bytes>;

    /// Copy an object to a new location within the store.
    async fn copy_object(&self, from: &BlobLocation, to: &BlobLocation) -> AppResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_object(&self, location: &BlobLocation) -> AppResult<()>;

    /// Produce a presigned upload URL for the given location.
    async fn presign_upload(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String>;

    /// Produce a presigned download URL for the given location.
    async fn presign_download(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String>;
}
