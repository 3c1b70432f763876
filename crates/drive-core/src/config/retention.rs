//! Version retention configuration.

use serde::{Deserialize, Serialize};

/// Retention policy applied when pruning old file versions.
///
/// A version is prunable when it exceeds `max_versions_per_file` counted
/// from the newest, or is older than `max_age_days` when set. The current
/// version and any version whose content is still referenced survive
/// regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Number of most recent versions always kept per file.
    #[serde(default = "default_max_versions")]
    pub max_versions_per_file: u32,
    /// Optional age cutoff in days; `None` disables age-based pruning.
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_versions_per_file: default_max_versions(),
            max_age_days: None,
        }
    }
}

fn default_max_versions() -> u32 {
    10
}
