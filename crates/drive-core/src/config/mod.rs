//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod blob;
pub mod logging;
pub mod quota;
pub mod retention;
pub mod upload;

use serde::{Deserialize, Serialize};

use self::blob::BlobConfig;
use self::logging::LoggingConfig;
use self::quota::QuotaConfig;
use self::retention::RetentionConfig;
use self::upload::UploadConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata database connection settings.
    pub database: DatabaseConfig,
    /// Blob store settings.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Upload session settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Version retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Quota accounting settings.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata database configuration.
///
/// Every metadata mutation runs inside a short transaction and no
/// connection is held across a chunk upload, so a small pool goes a long
/// way; size it for concurrent completions, not concurrent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL for the metadata store.
    pub url: String,
    /// Number of pooled connections (default 16).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Seconds to wait for a pooled connection before treating the
    /// metadata store as unreachable (default 5).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    /// Seconds an idle connection is kept before being dropped
    /// (default 600).
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Reject configurations that could never connect.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.url.trim().is_empty() {
            return Err(AppError::configuration("database.url is not set"));
        }
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(AppError::configuration(format!(
                "database.url must be a postgres:// URL, got '{}'",
                self.url
            )));
        }
        if self.pool_size == 0 {
            return Err(AppError::configuration("database.pool_size must be at least 1"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `DRIVE_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DRIVE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.database.validate()?;
        Ok(config)
    }
}

fn default_pool_size() -> u32 {
    16
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            pool_size: default_pool_size(),
            acquire_timeout_seconds: default_acquire_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }

    #[test]
    fn test_validate_accepts_postgres_urls() {
        assert!(db("postgres://drive@localhost/drive").validate().is_ok());
        assert!(db("postgresql://drive@localhost/drive").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(db("").validate().is_err());
        assert!(db("mysql://drive@localhost/drive").validate().is_err());

        let mut config = db("postgres://drive@localhost/drive");
        config.pool_size = 0;
        assert!(config.validate().is_err());
    }
}
