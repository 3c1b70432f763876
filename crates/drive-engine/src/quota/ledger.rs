//! Quota ledger — reservation, commit, and release of owner storage.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use drive_core::config::quota::QuotaConfig;
use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::types::{OwnerId, ReservationId};
use drive_database::stores::QuotaStore;
use drive_entity::quota::{QuotaAccount, Reservation};

/// Owns per-owner storage accounting.
///
/// All size-changing operations consult the ledger before committing:
/// a reservation holds the declared size, and completion converts it to
/// committed usage at the actual size. The underlying store serializes
/// concurrent reserve/commit/release per owner, so two uploads can never
/// both pass a check that together they would fail.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    /// Quota account store.
    store: Arc<dyn QuotaStore>,
    /// Quota configuration.
    config: QuotaConfig,
}

impl QuotaLedger {
    /// Creates a new quota ledger.
    pub fn new(store: Arc<dyn QuotaStore>, config: QuotaConfig) -> Self {
        Self { store, config }
    }

    fn default_limit(&self) -> i64 {
        self.config.default_limit_bytes as i64
    }

    /// Reserve `bytes` against the owner's quota. Fails with
    /// `QuotaExceeded` (carrying usage and limit) when the hold would not
    /// fit; a failed reservation holds nothing.
    pub async fn reserve(&self, owner_id: OwnerId, bytes: i64) -> AppResult<Reservation> {
        if bytes < 0 {
            return Err(AppError::validation(format!(
                "Cannot reserve a negative byte count ({bytes})"
            )));
        }

        let reservation = Reservation {
            id: ReservationId::new(),
            owner_id,
            bytes,
            created_at: Utc::now(),
        };
        let account = self
            .store
            .reserve(&reservation, self.default_limit())
            .await?;

        debug!(
            owner_id = %owner_id,
            reservation_id = %reservation.id,
            bytes,
            available = account.available_bytes(),
            "Quota reserved"
        );
        Ok(reservation)
    }

    /// Convert a reservation into committed usage of `actual_bytes`.
    /// The blob store is the source of truth for size, so the committed
    /// amount may differ from the reserved amount.
    pub async fn commit(
        &self,
        owner_id: OwnerId,
        reservation_id: ReservationId,
        actual_bytes: i64,
    ) -> AppResult<QuotaAccount> {
        let account = self
            .store
            .commit(owner_id, reservation_id, actual_bytes)
            .await?;
        debug!(
            owner_id = %owner_id,
            reservation_id = %reservation_id,
            actual_bytes,
            used = account.used_bytes,
            "Quota committed"
        );
        Ok(account)
    }

    /// Cancel a reservation without affecting committed usage. Releasing
    /// an unknown reservation is a no-op, so abort paths stay idempotent.
    pub async fn release(&self, owner_id: OwnerId, reservation_id: ReservationId) -> AppResult<()> {
        self.store.release(owner_id, reservation_id).await?;
        debug!(
            owner_id = %owner_id,
            reservation_id = %reservation_id,
            "Quota reservation released"
        );
        Ok(())
    }

    /// Return committed usage (version pruning), clamped at zero.
    pub async fn credit(&self, owner_id: OwnerId, bytes: i64) -> AppResult<QuotaAccount> {
        self.store.credit_usage(owner_id, bytes).await
    }

    /// Current account state, creating the account with the default
    /// limit on first use.
    pub async fn usage(&self, owner_id: OwnerId) -> AppResult<QuotaAccount> {
        self.store
            .get_or_create(owner_id, self.default_limit())
            .await
    }

    /// Replace the owner's quota limit.
    pub async fn set_limit(&self, owner_id: OwnerId, limit_bytes: i64) -> AppResult<QuotaAccount> {
        if limit_bytes < 0 {
            return Err(AppError::validation(format!(
                "Quota limit cannot be negative ({limit_bytes})"
            )));
        }
        self.store.set_limit(owner_id, limit_bytes).await
    }
}
