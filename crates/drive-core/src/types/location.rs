//! Blob store addressing types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of an object in the blob store: bucket plus key.
///
/// Two version records may point at the same location when their content
/// deduplicates; locations are never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobLocation {
    /// The bucket (or top-level namespace) holding the object.
    pub bucket: String,
    /// The object key within the bucket.
    pub key: String,
}

impl BlobLocation {
    /// Create a new blob location.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}
