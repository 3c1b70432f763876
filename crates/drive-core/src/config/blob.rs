//! Blob store configuration.

use serde::{Deserialize, Serialize};

/// Top-level blob store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Blob provider to use: `"local"`, `"memory"`, or `"s3"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Default bucket used for newly stored objects.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Presigned URL time-to-live in seconds.
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
    /// Local filesystem blob store configuration.
    #[serde(default)]
    pub local: LocalBlobConfig,
    /// S3-compatible blob store configuration.
    #[serde(default)]
    pub s3: S3BlobConfig,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            bucket: default_bucket(),
            presign_ttl_seconds: default_presign_ttl(),
            local: LocalBlobConfig::default(),
            s3: S3BlobConfig::default(),
        }
    }
}

/// Local filesystem blob store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBlobConfig {
    /// Root path for local object storage.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalBlobConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3BlobConfig {
    /// Whether the S3 backend is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// S3 endpoint URL (for non-AWS services like MinIO).
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_bucket() -> String {
    "drive".to_string()
}

fn default_presign_ttl() -> u64 {
    900
}

fn default_local_root() -> String {
    "./data/blobs".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
