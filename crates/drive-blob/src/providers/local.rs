//! Local filesystem blob store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use drive_core::error::{AppError, ErrorKind};
use drive_core::result::AppResult;
use drive_core::traits::blob::{BlobStore, ByteStream, MultipartUpload, PartTag};
use drive_core::types::BlobLocation;

use super::{content_etag, presign_token};

/// Read buffer size for part assembly.
const ASSEMBLY_BUF: usize = 64 * 1024;

/// Local filesystem blob store.
///
/// Objects live at `<root>/<bucket>/<key>`; multipart parts are staged
/// under `<root>/_multipart/<upload_id>/` until completion concatenates
/// them into the final object and removes the staging directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new local blob store rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::BackendUnavailable,
                format!("Failed to create blob root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Resolve an object location to an absolute path within the root.
    fn resolve(&self, location: &BlobLocation) -> PathBuf {
        let key = location.key.trim_start_matches('/');
        self.root.join(&location.bucket).join(key)
    }

    /// Staging directory for a multipart upload.
    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join("_multipart").join(upload_id)
    }

    /// Staged path for one part.
    fn part_path(&self, upload_id: &str, part_number: i32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("part_{part_number:06}"))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn initiate_multipart(&self, location: &BlobLocation) -> AppResult<MultipartUpload> {
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.staging_dir(&upload_id);
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::BackendUnavailable,
                format!("Failed to create staging dir: {}", dir.display()),
                e,
            )
        })?;
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
        let dir = self.staging_dir(&upload.upload_id);
        if !dir.exists() {
            return Err(AppError::not_found(format!(
                "Multipart upload {} not found",
                upload.upload_id
            )));
        }

        let etag = content_etag(&data);
        let path = self.part_path(&upload.upload_id, part_number);
        fs::write(&path, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::BackendUnavailable,
                format!("Failed to write part {part_number}"),
                e,
            )
        })?;
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        upload: &MultipartUpload,
        parts: &[PartTag],
    ) -> AppResult<u64> {
        let dir = self.staging_dir(&upload.upload_id);
        if !dir.exists() {
            return Err(AppError::not_found(format!(
                "Multipart upload {} not found",
                upload.upload_id
            )));
        }

        let target = self.resolve(&upload.location);
        self.ensure_parent(&target).await?;

        let mut out = fs::File::create(&target).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::BackendUnavailable,
                format!("Failed to create object: {}", upload.location),
                e,
            )
        })?;

        let mut total = 0u64;
        for tag in parts {
            let path = self.part_path(&upload.upload_id, tag.part_number);
            let mut part = fs::File::open(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AppError::validation(format!("Part {} was never uploaded", tag.part_number))
                } else {
                    AppError::with_source(
                        ErrorKind::BackendUnavailable,
                        format!("Failed to open part {}", tag.part_number),
                        e,
                    )
                }
            })?;

            let mut buf = vec![0u8; ASSEMBLY_BUF];
            loop {
                let n = part.read(&mut buf).await.map_err(|e| {
                    AppError::with_source(ErrorKind::BackendUnavailable, "Part read error", e)
                })?;
                if n == 0 {
                    break;
                }
                total += n as u64;
                out.write_all(&buf[..n]).await.map_err(|e| {
                    AppError::with_source(ErrorKind::BackendUnavailable, "Assembly write error", e)
                })?;
            }
        }

        out.flush().await.map_err(|e| {
            AppError::with_source(ErrorKind::BackendUnavailable, "Failed to flush object", e)
        })?;
        drop(out);

        // Completion consumes the staged parts.
        let _ = fs::remove_dir_all(&dir).await;

        debug!(location = %upload.location, bytes = total, "Completed multipart upload");
        Ok(total)
    }

    async fn abort_multipart(&self, upload: &MultipartUpload) -> AppResult<()> {
        let dir = self.staging_dir(&upload.upload_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to abort multipart upload {}", upload.upload_id),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn put_object(&self, location: &BlobLocation, data: Bytes) -> AppResult<String> {
        let path = self.resolve(location);
        self.ensure_parent(&path).await?;

        let etag = content_etag(&data);
        fs::write(&path, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::BackendUnavailable,
                format!("Failed to write object: {location}"),
                e,
            )
        })?;

        debug!(location = %location, bytes = data.len(), "Wrote object");
        Ok(etag)
    }

    async fn get_object(&self, location: &BlobLocation) -> AppResult<ByteStream> {
        let path = self.resolve(location);
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {location}"))
            } else {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to open object: {location}"),
                    e,
                )
            }
        })?;

        let stream = ReaderStream::new(file);
        Ok(Box::pin(stream.map(|r| r.map(|b| b.into()))))
    }

    async fn get_object_bytes(&self, location: &BlobLocation) -> AppResult<Bytes> {
        let path = self.resolve(location);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {location}"))
            } else {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to read object: {location}"),
                    e,
                )
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn copy_object(&self, from: &BlobLocation, to: &BlobLocation) -> AppResult<()> {
        let from_path = self.resolve(from);
        let to_path = self.resolve(to);
        self.ensure_parent(&to_path).await?;

        fs::copy(&from_path, &to_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {from}"))
            } else {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to copy {from} -> {to}"),
                    e,
                )
            }
        })?;
        Ok(())
    }

    async fn delete_object(&self, location: &BlobLocation) -> AppResult<()> {
        let path = self.resolve(location);
        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::BackendUnavailable,
                    format!("Failed to delete object: {location}"),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn presign_upload(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String> {
        Ok(format!(
            "file://{}?upload&token={}",
            self.resolve(location).display(),
            presign_token(ttl)
        ))
    }

    async fn presign_download(&self, location: &BlobLocation, ttl: Duration) -> AppResult<String> {
        Ok(format!(
            "file://{}?token={}",
            self.resolve(location).display(),
            presign_token(ttl)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, LocalBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    fn loc(key: &str) -> BlobLocation {
        BlobLocation::new("b1", key)
    }

    #[tokio::test]
    async fn test_put_get_copy_delete() {
        let (_dir, store) = store().await;

        store
            .put_object(&loc("a/orig.bin"), Bytes::from("content"))
            .await
            .unwrap();
        assert_eq!(
            store.get_object_bytes(&loc("a/orig.bin")).await.unwrap(),
            "content"
        );

        store
            .copy_object(&loc("a/orig.bin"), &loc("a/copy.bin"))
            .await
            .unwrap();
        assert_eq!(
            store.get_object_bytes(&loc("a/copy.bin")).await.unwrap(),
            "content"
        );

        store.delete_object(&loc("a/orig.bin")).await.unwrap();
        assert!(store.get_object_bytes(&loc("a/orig.bin")).await.is_err());
    }

    #[tokio::test]
    async fn test_multipart_roundtrip() {
        let (_dir, store) = store().await;
        let upload = store.initiate_multipart(&loc("big.bin")).await.unwrap();

        let tag1 = store
            .upload_part(&upload, 1, Bytes::from("hello "))
            .await
            .unwrap();
        let tag2 = store
            .upload_part(&upload, 2, Bytes::from("world"))
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
            store.get_object_bytes(&loc("big.bin")).await.unwrap(),
            "hello world"
        );
        // Staging was consumed.
        assert!(
            store
                .upload_part(&upload, 3, Bytes::from("x"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_abort_discards_parts() {
        let (_dir, store) = store().await;
        let upload = store.initiate_multipart(&loc("gone.bin")).await.unwrap();
        store
            .upload_part(&upload, 1, Bytes::from("x"))
            .await
            .unwrap();
        store.abort_multipart(&upload).await.unwrap();
        store.abort_multipart(&upload).await.unwrap();
        assert!(store.get_object_bytes(&loc("gone.bin")).await.is_err());
    }

    #[tokio::test]
    async fn test_get_object_streams() {
        let (_dir, store) = store().await;
        store
            .put_object(&loc("s.bin"), Bytes::from("streamed"))
            .await
            .unwrap();
        let stream = store.get_object(&loc("s.bin")).await.unwrap();
        let (hash, len) = crate::hasher::ContentHasher::hash_stream(stream)
            .await
            .unwrap();
        assert_eq!(len, 8);
        assert_eq!(hash, crate::hasher::ContentHasher::hash_bytes(b"streamed"));
    }
}
