//! Content hash newtype used for integrity checks and deduplication.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Hex length of a SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A lowercase hexadecimal SHA-256 digest of file content.
///
/// Identical bytes always produce an identical `ContentHash`; the engine
/// relies on this both as the deduplication key and as the integrity check
/// at upload finalize. A hash is only ever produced from a complete byte
/// stream — partial streams are discarded without finalizing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct ContentHash(String);

impl ContentHash {
    /// Build a hash from raw digest bytes, as produced by a finalized
    /// hasher or a blob backend returning a checksum.
    pub fn from_digest_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Return the hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::validation(format!(
                "invalid content hash '{s}': expected {DIGEST_HEX_LEN} hex characters"
            )));
        }
        Ok(Self(s.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let hex = "a".repeat(64);
        let hash: ContentHash = hex.parse().expect("valid hash");
        assert_eq!(hash.as_str(), hex);
    }

    #[test]
    fn test_parse_normalizes_case() {
        let hash: ContentHash = "A".repeat(64).parse().expect("valid hash");
        assert_eq!(hash.as_str(), "a".repeat(64));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("xyz".parse::<ContentHash>().is_err());
        assert!("g".repeat(64).parse::<ContentHash>().is_err());
    }
}
