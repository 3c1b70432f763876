//! Streaming SHA-256 content addresser.

use futures::StreamExt;
use sha2::{Digest, Sha256};

use drive_core::result::AppResult;
use drive_core::traits::blob::ByteStream;
use drive_core::types::ContentHash;

/// Incremental SHA-256 hasher over an ordered byte stream.
///
/// Bytes must be fed in their final reassembled order; chunked uploads are
/// hashed over the assembled object, never per chunk. Dropping the hasher
/// without calling [`ContentHasher::finalize`] discards the partial state,
/// so an interrupted stream can never yield a usable digest.
#[derive(Debug, Default)]
pub struct ContentHasher {
    hasher: Sha256,
    bytes_seen: u64,
}

impl ContentHasher {
    /// Create a fresh hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next in-order slice of content.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_seen += data.len() as u64;
    }

    /// Total bytes fed so far.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Consume the hasher and produce the content hash.
    pub fn finalize(self) -> ContentHash {
        ContentHash::from_digest_bytes(&self.hasher.finalize())
    }

    /// Hash a complete in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> ContentHash {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Drain a byte stream and produce its hash and total length.
    ///
    /// A stream error propagates and the partial digest is discarded with
    /// the hasher.
    pub async fn hash_stream(mut stream: ByteStream) -> AppResult<(ContentHash, u64)> {
        let mut hasher = Self::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
        }
        let len = hasher.bytes_seen();
        Ok((hasher.finalize(), len))
    }
}
