//! In-memory blob store for tests and single-node development.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::traits::blob::{BlobStore, ByteStream, MultipartUpload, PartTag};
use drive_core::types::BlobLocation;

use super::{content_etag, presign_token};

/// In-memory blob store backed by concurrent maps.
///
/// Objects and staged multipart parts live entirely in process memory;
/// everything is lost on restart. Matches the real backends' contract,
/// including non-idempotent multipart completion (completing consumes the
/// staged parts).
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    /// `bucket/key` → object bytes.
    objects: DashMap<String, Bytes>,
    /// upload id → (part number → part bytes).
    staged: DashMap<String, BTreeMap<i32, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct objects currently stored. Used by tests to
    /// verify deduplication keeps physical storage flat.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|e| e.value().len() as u64).sum()
    }

    fn object_key(location: &BlobLocation) -> String {
        format!("{}/{}", location.bucket, location.key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn initiate_multipart(&self, location: &BlobLocation) -> AppResult<MultipartUpload> {
        let upload_id = Uuid::new_v4().to_string();
        self.staged.insert(upload_id.clone(), BTreeMap::new());
        debug!(location = %location, upload_id, "Initiated multipart upload");
        Ok(MultipartUpload {
            location: location.clone(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        upload: &MultipartUpload,
        part_number: i32,
        data: Bytes,
    ) -> AppResult<String> {
        let mut parts = self.staged.get_mut(&upload.upload_id).ok_or_else(|| {
            AppError::not_found(format!("Multipart upload {} not found", upload.upload_id))
        })?;
        let etag = content_etag(&data);
        parts.insert(part_number, data);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        upload: &MultipartUpload,
        parts: &[PartTag],
    ) -> AppResult<u64> {
        // Completion consumes the staged parts; a second completion of the
        // same handle fails, as it would on a real backend.
        let (_, staged) = self.staged.remove(&upload.upload_id).ok_or_else(|| {
            AppError::not_found(format!("Multipart upload {} not found", upload.upload_id))
        })?;

        let mut assembled = Vec::new();
        for tag in parts {
            let data = staged.get(&tag.part_number).ok_or_else(|| {
                AppError::validation(format!("Part {} was never uploaded", tag.part_number))
            })?;
            if content_etag(data) != tag.etag {
                return Err(AppError::validation(format!(
                    "Part {} etag mismatch",
                    tag.part_number
                )));
            }
            assembled.extend_from_slice(data);
        }

        let size = assembled.len() as u64;
        self.objects
            .insert(Self::object_key(&upload.location), Bytes::from(assembled));
        debug!(location = %upload.location, bytes = size, "Completed multipart upload");
        Ok(size)
    }

    async fn abort_multipart(&self, upload: &MultipartUpload) -> AppResult<()> {
        self.staged.remove(&upload.upload_id);
        Ok(())
    }

    async fn put_object(&self, location: &BlobLocation, data: Bytes) -> AppResult<String> {
        let etag = content_etag(&data);
        self.objects.insert(Self::object_key(location), data);
        Ok(etag)
    }

    async fn get_object(&self, location: &BlobLocation) -> AppResult<ByteStream> {
        let data = self.get_object_bytes(location).await?;
        let stream = futures::stream::once(async move { Ok(data) });
        Ok(Box::pin(stream))
    }

    async fn get_object_bytes(&self, location: &BlobLocation) -> AppResult<Bytes> {
        self.objects
            .get(&Self::object_key(location))
            .map(|e| e.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Object not found: {location}")))
    }

    async fn copy_object(&self, from: &BlobLocation, to: &BlobLocation) -> AppResult<()> {
        let data = self.get_object_bytes(from).await?;
        self.objects.insert(Self::object_key(to), data);
        Ok(())
    }

    async fn delete_object(&self, location: &BlobLocation) -> AppResult<()> {
        self.objects.remove(&Self::object_key(location));
        Ok(())
    }

    async fn presign_upload(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String> {
        Ok(format!(
            "memory://{}?upload&token={}",
            location,
            presign_token(ttl)
        ))
    }

    async fn presign_download(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String> {
        Ok(format!("memory://{}?token={}", location, presign_token(ttl)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(key: &str) -> BlobLocation {
        BlobLocation::new("test", key)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryBlobStore::new();
        store.put_object(&loc("a"), Bytes::from("hello")).await.unwrap();
        assert_eq!(store.get_object_bytes(&loc("a")).await.unwrap(), "hello");

        store.delete_object(&loc("a")).await.unwrap();
        assert!(store.get_object_bytes(&loc("a")).await.is_err());
        // Deleting again is fine.
        store.delete_object(&loc("a")).await.unwrap();
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_given_order() {
        let store = MemoryBlobStore::new();
        let upload = store.initiate_multipart(&loc("obj")).await.unwrap();

        let tag2 = store
            .upload_part(&upload, 2, Bytes::from("world"))
            .await
            .unwrap();
        let tag1 = store
            .upload_part(&upload, 1, Bytes::from("hello "))
            .await
            .unwrap();

        let size = store
            .complete_multipart(
                &upload,
                &[
                    PartTag { part_number: 1, etag: tag1 },
                    PartTag { part_number: 2, etag: tag2 },
                ],
            )
            .await
            .unwrap();

        assert_eq!(size, 11);
        assert_eq!(
            store.get_object_bytes(&loc("obj")).await.unwrap(),
            "hello world"
        );
    }

    #[tokio::test]
    async fn test_completion_is_not_idempotent() {
        let store = MemoryBlobStore::new();
        let upload = store.initiate_multipart(&loc("obj")).await.unwrap();
        let tag = store
            .upload_part(&upload, 1, Bytes::from("x"))
            .await
            .unwrap();
        let parts = vec![PartTag { part_number: 1, etag: tag }];

        store.complete_multipart(&upload, &parts).await.unwrap();
        assert!(store.complete_multipart(&upload, &parts).await.is_err());
    }

    #[tokio::test]
    async fn test_identical_parts_share_etag() {
        let store = MemoryBlobStore::new();
        let upload = store.initiate_multipart(&loc("obj")).await.unwrap();
        let tag_a = store
            .upload_part(&upload, 1, Bytes::from("same"))
            .await
            .unwrap();
        let tag_b = store
            .upload_part(&upload, 1, Bytes::from("same"))
            .await
            .unwrap();
        assert_eq!(tag_a, tag_b);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let store = MemoryBlobStore::new();
        let upload = store.initiate_multipart(&loc("obj")).await.unwrap();
        store.abort_multipart(&upload).await.unwrap();
        store.abort_multipart(&upload).await.unwrap();
        assert!(
            store
                .upload_part(&upload, 1, Bytes::from("x"))
                .await
                .is_err()
        );
    }
}
