//! In-memory quota store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::types::{OwnerId, ReservationId};
use drive_entity::quota::{QuotaAccount, Reservation};

use crate::stores::QuotaStore;

/// One owner's account plus outstanding reservations, guarded together so
/// reserve/commit/release are serialized per owner.
#[derive(Debug)]
struct AccountState {
    account: QuotaAccount,
    reservations: HashMap<ReservationId, Reservation>,
}

/// In-memory [`QuotaStore`] with one lock per owner.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    accounts: DashMap<OwnerId, Arc<Mutex<AccountState>>>,
}

impl MemoryQuotaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, owner_id: OwnerId, default_limit: i64) -> Arc<Mutex<AccountState>> {
        Arc::clone(
            self.accounts
                .entry(owner_id)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(AccountState {
                        account: QuotaAccount {
                            owner_id,
                            limit_bytes: default_limit,
                            used_bytes: 0,
                            reserved_bytes: 0,
                            updated_at: Utc::now(),
                        },
                        reservations: HashMap::new(),
                    }))
                })
                .value(),
        )
    }

    fn existing(&self, owner_id: OwnerId) -> AppResult<Arc<Mutex<AccountState>>> {
        self.accounts
            .get(&owner_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AppError::not_found(format!("Quota account for {owner_id} not found")))
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn get_or_create(
        &self,
        owner_id: OwnerId,
        default_limit: i64,
    ) -> AppResult<QuotaAccount> {
        let state = self.state(owner_id, default_limit);
        let state = state.lock().unwrap();
        Ok(state.account.clone())
    }

    async fn set_limit(&self, owner_id: OwnerId, limit_bytes: i64) -> AppResult<QuotaAccount> {
        let state = self.state(owner_id, limit_bytes);
        let mut state = state.lock().unwrap();
        state.account.limit_bytes = limit_bytes;
        state.account.updated_at = Utc::now();
        Ok(state.account.clone())
    }

    async fn reserve(
        &self,
        reservation: &Reservation,
        default_limit: i64,
    ) -> AppResult<QuotaAccount> {
        let state = self.state(reservation.owner_id, default_limit);
        let mut state = state.lock().unwrap();

        if state.account.would_exceed(reservation.bytes) {
            return Err(AppError::quota_exceeded(format!(
                "Reserving {} bytes would exceed quota: {} used + {} reserved of {} limit",
                reservation.bytes,
                state.account.used_bytes,
                state.account.reserved_bytes,
                state.account.limit_bytes
            )));
        }

        state.account.reserved_bytes += reservation.bytes;
        state.account.updated_at = Utc::now();
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(state.account.clone())
    }

    async fn commit(
        &self,
        owner_id: OwnerId,
        reservation_id: ReservationId,
        actual_bytes: i64,
    ) -> AppResult<QuotaAccount> {
        let state = self.existing(owner_id)?;
        let mut state = state.lock().unwrap();

        let reservation = state.reservations.remove(&reservation_id).ok_or_else(|| {
            AppError::not_found(format!(
                "Reservation {reservation_id} for {owner_id} not found"
            ))
        })?;

        state.account.reserved_bytes =
            (state.account.reserved_bytes - reservation.bytes).max(0);
        state.account.used_bytes = (state.account.used_bytes + actual_bytes.max(0)).max(0);
        state.account.updated_at = Utc::now();
        Ok(state.account.clone())
    }

    async fn release(&self, owner_id: OwnerId, reservation_id: ReservationId) -> AppResult<()> {
        let Ok(state) = self.existing(owner_id) else {
            return Ok(());
        };
        let mut state = state.lock().unwrap();
        if let Some(reservation) = state.reservations.remove(&reservation_id) {
            state.account.reserved_bytes =
                (state.account.reserved_bytes - reservation.bytes).max(0);
            state.account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn credit_usage(&self, owner_id: OwnerId, bytes: i64) -> AppResult<QuotaAccount> {
        let state = self.existing(owner_id)?;
        let mut state = state.lock().unwrap();
        state.account.used_bytes = (state.account.used_bytes - bytes.max(0)).max(0);
        state.account.updated_at = Utc::now();
        Ok(state.account.clone())
    }
}
