//! Quota accounting configuration.

use serde::{Deserialize, Serialize};

/// Per-owner storage quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Default quota limit in bytes for owners without an explicit limit
    /// (default 10 GB).
    #[serde(default = "default_limit")]
    pub default_limit_bytes: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_limit_bytes: default_limit(),
        }
    }
}

fn default_limit() -> u64 {
    10_737_418_240 // 10 GB
}
