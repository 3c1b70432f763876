//! Blob store provider implementations.

pub mod memory;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use drive_core::config::blob::BlobConfig;
use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::traits::blob::BlobStore;

/// Build the blob store named by the configuration.
pub async fn build_blob_store(config: &BlobConfig) -> AppResult<Arc<dyn BlobStore>> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(memory::MemoryBlobStore::new())),
        #[cfg(feature = "local")]
        "local" => Ok(Arc::new(
            local::LocalBlobStore::new(&config.local.root_path).await?,
        )),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(
            s3::S3BlobStore::new(
                &config.s3.endpoint,
                &config.s3.region,
                &config.s3.access_key,
                &config.s3.secret_key,
            )
            .await?,
        )),
        other => Err(AppError::configuration(format!(
            "Unknown blob provider '{other}'"
        ))),
    }
}

/// Deterministic content tag for an uploaded part or object: the hex
/// SHA-256 of its bytes. Re-uploading identical bytes yields the same tag,
/// which is what makes duplicate chunk submissions detectable.
pub(crate) fn content_etag(data: &[u8]) -> String {
    crate::hasher::ContentHasher::hash_bytes(data).as_str().to_string()
}

/// Build an opaque presign token: random nonce plus expiry, base64url.
pub(crate) fn presign_token(ttl: std::time::Duration) -> String {
    use base64::Engine;
    use rand::Rng;

    let mut nonce = [0u8; 18];
    rand::rng().fill_bytes(&mut nonce);
    let expires = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
    let payload = format!("{}:{}", hex::encode(nonce), expires.timestamp());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload)
}
