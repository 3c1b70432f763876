//! PostgreSQL quota store.

use async_trait::async_trait;
use sqlx::PgPool;

use drive_core::error::{AppError, ErrorKind};
use drive_core::result::AppResult;
use drive_core::types::{OwnerId, ReservationId};
use drive_entity::quota::{QuotaAccount, Reservation};

use crate::stores::QuotaStore;

/// [`QuotaStore`] backed by the `quota_accounts` and `quota_reservations`
/// tables. Per-owner serialization comes from guarded single-row updates;
/// the reservation check and increment are one statement, so two
/// concurrent reservations can never both pass a check they jointly fail.
#[derive(Debug, Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    /// Create a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_account(&self, owner_id: OwnerId, default_limit: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO quota_accounts (owner_id, limit_bytes) VALUES ($1, $2) \
             ON CONFLICT (owner_id) DO NOTHING",
        )
        .bind(owner_id)
        .bind(default_limit)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to ensure account", e))?;
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn get_or_create(
        &self,
        owner_id: OwnerId,
        default_limit: i64,
    ) -> AppResult<QuotaAccount> {
        self.ensure_account(owner_id, default_limit).await?;
        sqlx::query_as::<_, QuotaAccount>("SELECT * FROM quota_accounts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fetch account", e))
    }

    async fn set_limit(&self, owner_id: OwnerId, limit_bytes: i64) -> AppResult<QuotaAccount> {
        self.ensure_account(owner_id, limit_bytes).await?;
        sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts SET limit_bytes = $2, updated_at = now() \
             WHERE owner_id = $1 RETURNING *",
        )
        .bind(owner_id)
        .bind(limit_bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set limit", e))
    }

    async fn reserve(
        &self,
        reservation: &Reservation,
        default_limit: i64,
    ) -> AppResult<QuotaAccount> {
        self.ensure_account(reservation.owner_id, default_limit)
            .await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let account = sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts \
             SET reserved_bytes = reserved_bytes + $2, updated_at = now() \
             WHERE owner_id = $1 \
               AND used_bytes + reserved_bytes + $2 <= limit_bytes \
             RETURNING *",
        )
        .bind(reservation.owner_id)
        .bind(reservation.bytes)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to reserve quota", e))?;

        let Some(account) = account else {
            // The guarded update matched nothing: over quota. Report the
            // current numbers so the caller can act on them.
            let current = sqlx::query_as::<_, QuotaAccount>(
                "SELECT * FROM quota_accounts WHERE owner_id = $1",
            )
            .bind(reservation.owner_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to fetch account", e)
            })?;
            return Err(AppError::quota_exceeded(format!(
                "Reserving {} bytes would exceed quota: {} used + {} reserved of {} limit",
                reservation.bytes,
                current.used_bytes,
                current.reserved_bytes,
                current.limit_bytes
            )));
        };

        sqlx::query(
            "INSERT INTO quota_reservations (id, owner_id, bytes, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(reservation.id)
        .bind(reservation.owner_id)
        .bind(reservation.bytes)
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record reservation", e)
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit reservation", e)
        })?;
        Ok(account)
    }

    async fn commit(
        &self,
        owner_id: OwnerId,
        reservation_id: ReservationId,
        actual_bytes: i64,
    ) -> AppResult<QuotaAccount> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let reservation = sqlx::query_as::<_, Reservation>(
            "DELETE FROM quota_reservations WHERE id = $1 AND owner_id = $2 RETURNING *",
        )
        .bind(reservation_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to consume reservation", e)
        })?
        .ok_or_else(|| {
            AppError::not_found(format!(
                "Reservation {reservation_id} for {owner_id} not found"
            ))
        })?;

        let account = sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts \
             SET reserved_bytes = GREATEST(reserved_bytes - $2, 0), \
                 used_bytes = GREATEST(used_bytes + GREATEST($3, 0), 0), \
                 updated_at = now() \
             WHERE owner_id = $1 RETURNING *",
        )
        .bind(owner_id)
        .bind(reservation.bytes)
        .bind(actual_bytes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit usage", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit quota update", e)
        })?;
        Ok(account)
    }

    async fn release(&self, owner_id: OwnerId, reservation_id: ReservationId) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let reservation = sqlx::query_as::<_, Reservation>(
            "DELETE FROM quota_reservations WHERE id = $1 AND owner_id = $2 RETURNING *",
        )
        .bind(reservation_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to remove reservation", e)
        })?;

        // Releasing a missing reservation is a no-op, keeping abort paths
        // idempotent.
        if let Some(reservation) = reservation {
            sqlx::query(
                "UPDATE quota_accounts \
                 SET reserved_bytes = GREATEST(reserved_bytes - $2, 0), updated_at = now() \
                 WHERE owner_id = $1",
            )
            .bind(owner_id)
            .bind(reservation.bytes)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to release reservation", e)
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit release", e)
        })?;
        Ok(())
    }

    async fn credit_usage(&self, owner_id: OwnerId, bytes: i64) -> AppResult<QuotaAccount> {
        sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts \
             SET used_bytes = GREATEST(used_bytes - GREATEST($2, 0), 0), updated_at = now() \
             WHERE owner_id = $1 RETURNING *",
        )
        .bind(owner_id)
        .bind(bytes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to credit usage", e))?
        .ok_or_else(|| AppError::not_found(format!("Quota account for {owner_id} not found")))
    }
}
