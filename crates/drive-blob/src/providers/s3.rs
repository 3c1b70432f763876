//! S3-compatible blob store (stub — requires `s3` feature).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::traits::blob::{BlobStore, ByteStream, MultipartUpload, PartTag};
use drive_core::types::BlobLocation;

/// S3-compatible blob store.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    endpoint: String,
    region: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store.
    pub async fn new(
        endpoint: &str,
        region: &str,
        _access_key: &str,
        _secret_key: &str,
    ) -> AppResult<Self> {
        tracing::info!(endpoint, region, "Initializing S3 blob store");
        Ok(Self {
            endpoint: endpoint.to_string(),
            region: region.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn provider_type(&self) -> &str {
        "s3"
    }

    async fn initiate_multipart(&self, _location: &BlobLocation) -> AppResult<MultipartUpload> {
        Err(AppError::internal(
            "S3 initiate_multipart not yet implemented",
        ))
    }

    async fn upload_part(
        &self,
        _upload: &MultipartUpload,
        _part_number: i32,
        _data: Bytes,
    ) -> AppResult<String> {
        Err(AppError::internal("S3 upload_part not yet implemented"))
    }

    async fn complete_multipart(
        &self,
        _upload: &MultipartUpload,
        _parts: &[PartTag],
    ) -> AppResult<u64> {
        Err(AppError::internal(
            "S3 complete_multipart not yet implemented",
        ))
    }

    async fn abort_multipart(&self, _upload: &MultipartUpload) -> AppResult<()> {
        Err(AppError::internal("S3 abort_multipart not yet implemented"))
    }

    async fn put_object(&self, _location: &BlobLocation, _data: Bytes) -> AppResult<String> {
        Err(AppError::internal("S3 put_object not yet implemented"))
    }

    async fn get_object(&self, _location: &BlobLocation) -> AppResult<ByteStream> {
        Err(AppError::internal("S3 get_object not yet implemented"))
    }

    async fn get_object_bytes(&self, _location: &BlobLocation) -> AppResult<Bytes> {
        Err(AppError::internal(
            "S3 get_object_bytes not yet implemented",
        ))
    }

    async fn copy_object(&self, _from: &BlobLocation, _to: &BlobLocation) -> AppResult<()> {
        Err(AppError::internal("S3 copy_object not yet implemented"))
    }

    async fn delete_object(&self, _location: &BlobLocation) -> AppResult<()> {
        Err(AppError::internal("S3 delete_object not yet implemented"))
    }

    async fn presign_upload(&self, _location: &BlobLocation, _ttl: Duration) -> AppResult<String> {
        Err(AppError::internal("S3 presign_upload not yet implemented"))
    }

    async fn presign_download(
        &self,
        _location: &BlobLocation,
        _ttl: Duration,
    ) -> AppResult<String> {
        Err(AppError::internal(
            "S3 presign_download not yet implemented",
        ))
    }
}
