//! Quota account and reservation entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use drive_core::types::{OwnerId, ReservationId};

/// Per-owner storage accounting.
///
/// Mutated only through the quota ledger's reserve/commit/release
/// operations. `used_bytes + reserved_bytes` never exceeds `limit_bytes`
/// after a successful reservation, and `used_bytes` never goes negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuotaAccount {
    /// The account owner.
    pub owner_id: OwnerId,
    /// Quota limit in bytes.
    pub limit_bytes: i64,
    /// Committed usage in bytes.
    pub used_bytes: i64,
    /// Outstanding (uncommitted) reservations in bytes.
    pub reserved_bytes: i64,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl QuotaAccount {
    /// Bytes still available for new reservations.
    pub fn available_bytes(&self) -> i64 {
        (self.limit_bytes - self.used_bytes - self.reserved_bytes).max(0)
    }

    /// Whether reserving `additional_bytes` would exceed the limit.
    pub fn would_exceed(&self, additional_bytes: i64) -> bool {
        self.used_bytes + self.reserved_bytes + additional_bytes > self.limit_bytes
    }

    /// Committed usage as a percentage of the limit (0.0 - 100.0).
    pub fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.limit_bytes as f64) * 100.0
    }
}

/// A provisional quota hold made before an upload's final size is known,
/// later committed or released.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    /// Unique reservation identifier.
    pub id: ReservationId,
    /// The account owner.
    pub owner_id: OwnerId,
    /// Reserved bytes (the declared upload size).
    pub bytes: i64,
    /// When the reservation was made.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(limit: i64, used: i64, reserved: i64) -> QuotaAccount {
        QuotaAccount {
            owner_id: OwnerId::new(),
            limit_bytes: limit,
            used_bytes: used,
            reserved_bytes: reserved,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_would_exceed_counts_reservations() {
        let acct = account(1000, 600, 300);
        assert!(!acct.would_exceed(100));
        assert!(acct.would_exceed(101));
        assert_eq!(acct.available_bytes(), 100);
    }

    #[test]
    fn test_usage_percent() {
        assert_eq!(account(1000, 250, 0).usage_percent(), 25.0);
        assert_eq!(account(0, 0, 0).usage_percent(), 0.0);
    }
}
