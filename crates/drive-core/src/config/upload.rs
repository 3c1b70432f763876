//! Upload session configuration.

use serde::{Deserialize, Serialize};

/// Chunked upload session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum upload size in bytes (default 5 GB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
    /// Chunk size in bytes for chunked uploads (default 5 MB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,
    /// Hard lifetime of an upload session in seconds; expired sessions
    /// are aborted by the sweeper (default 24 h).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Idle window in seconds: a session with no chunk activity for this
    /// long is eligible for automatic abort (default 1 h).
    #[serde(default = "default_idle_window")]
    pub idle_window_seconds: u64,
    /// How often the background sweeper scans for expired/idle sessions.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: default_max_upload(),
            chunk_size_bytes: default_chunk_size(),
            session_ttl_seconds: default_session_ttl(),
            idle_window_seconds: default_idle_window(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_max_upload() -> u64 {
    5_368_709_120 // 5 GB
}

fn default_chunk_size() -> u64 {
    5_242_880 // 5 MB
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_idle_window() -> u64 {
    3_600
}

fn default_sweep_interval() -> u64 {
    300
}
