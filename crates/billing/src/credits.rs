//! Prepaid credit ledger
//!
//! One row per (user, period). Expiry is lazy: a row past `expires_at` keeps
//! its stored counter but is worth nothing.

use habitpay_shared::{credit_pack, from_unix, to_unix};
use serde::Serialize;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::error::{BillingError, BillingResult};

/// Stored balance for a user and period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
    pub period: String,
    pub credits: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl CreditBalance {
    fn empty(period: &str) -> Self {
        Self {
            period: period.to_string(),
            credits: 0,
            expires_at: None,
        }
    }

    /// Credits that can actually be spent at `now`
    pub fn effective_at(&self, now: OffsetDateTime) -> i64 {
        match self.expires_at {
            Some(expires_at) if expires_at <= now => 0,
            _ => self.credits,
        }
    }
}

/// Result of granting a pack
#[derive(Debug, Clone, Serialize)]
pub struct CreditGrant {
    pub credits_granted: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct CreditRow {
    credits: i64,
    expires_at: Option<i64>,
}

pub struct CreditLedger {
    pool: SqlitePool,
}

impl CreditLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Balance for (user, period). Missing rows read as zero with no expiry.
    pub async fn get_balance(&self, user_id: &str, period: &str) -> BillingResult<CreditBalance> {
        let row: Option<CreditRow> = sqlx::query_as(
            "SELECT credits, expires_at FROM user_credits WHERE user_id = ? AND period = ?",
        )
        .bind(user_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => CreditBalance {
                period: period.to_string(),
                credits: row.credits,
                expires_at: row.expires_at.map(from_unix),
            },
            None => CreditBalance::empty(period),
        })
    }

    /// Whether a consume at `now` would currently succeed. Reads only.
    pub async fn has_credit_at(
        &self,
        user_id: &str,
        period: &str,
        now: OffsetDateTime,
    ) -> BillingResult<bool> {
        let balance = self.get_balance(user_id, period).await?;
        Ok(balance.effective_at(now) > 0)
    }

    pub async fn grant(
        &self,
        user_id: &str,
        period: &str,
        amount: i64,
        expires_at: OffsetDateTime,
    ) -> BillingResult<()> {
        self.grant_at(user_id, period, amount, expires_at, OffsetDateTime::now_utc())
            .await
    }

    /// Set the balance to `amount` and replace the expiry.
    ///
    /// Packs are a flat entitlement: a new grant never stacks on top of an
    /// unspent balance or extends the previous expiry.
    pub async fn grant_at(
        &self,
        user_id: &str,
        period: &str,
        amount: i64,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> BillingResult<()> {
        if amount < 0 {
            return Err(BillingError::InvalidAmount(amount));
        }

        sqlx::query(
            r#"
            INSERT INTO user_credits (user_id, period, credits, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, period) DO UPDATE SET
                credits = excluded.credits,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(period)
        .bind(amount)
        .bind(to_unix(expires_at))
        .bind(to_unix(now))
        .bind(to_unix(now))
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            period = %period,
            credits = amount,
            expires_at = %expires_at,
            "Granted credits"
        );

        Ok(())
    }

    /// Grant a named pack into the ledger period of the same name
    pub async fn grant_pack_at(
        &self,
        user_id: &str,
        pack_name: &str,
        now: OffsetDateTime,
    ) -> BillingResult<CreditGrant> {
        let pack =
            credit_pack(pack_name).ok_or_else(|| BillingError::UnknownPack(pack_name.to_string()))?;
        let expires_at = now + Duration::days(pack.days);

        self.grant_at(user_id, pack.name, pack.credits, expires_at, now)
            .await?;

        Ok(CreditGrant {
            credits_granted: pack.credits,
            expires_at,
        })
    }

    pub async fn consume(&self, user_id: &str, period: &str) -> BillingResult<bool> {
        self.consume_at(user_id, period, OffsetDateTime::now_utc())
            .await
    }

    /// Spend one credit if one is available and unexpired at `now`.
    ///
    /// A single conditional UPDATE: concurrent callers can never take the
    /// counter below zero or both spend the last credit.
    pub async fn consume_at(
        &self,
        user_id: &str,
        period: &str,
        now: OffsetDateTime,
    ) -> BillingResult<bool> {
        let now = to_unix(now);
        let result = sqlx::query(
            r#"
            UPDATE user_credits
            SET credits = credits - 1, updated_at = ?
            WHERE user_id = ? AND period = ?
              AND credits > 0
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(period)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let consumed = result.rows_affected() == 1;
        tracing::debug!(user_id = %user_id, period = %period, consumed, "Credit consume");
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitpay_shared::create_memory_pool;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    async fn ledger() -> CreditLedger {
        CreditLedger::new(create_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_missing_row_reads_as_zero() {
        let ledger = ledger().await;
        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 0);
        assert!(balance.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_consume_decrements_until_empty() {
        let ledger = ledger().await;
        ledger
            .grant_at("u1", "pro-monthly", 2, NOW + Duration::days(1), NOW)
            .await
            .unwrap();

        assert!(ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());
        assert!(ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());
        assert!(!ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());

        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 0);
    }

    #[tokio::test]
    async fn test_grant_sets_instead_of_stacking() {
        let ledger = ledger().await;
        ledger
            .grant_at("u1", "pro-monthly", 3, NOW + Duration::days(5), NOW)
            .await
            .unwrap();

        let grant = ledger.grant_pack_at("u1", "pro-monthly", NOW).await.unwrap();
        assert_eq!(grant.credits_granted, 12);

        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 12);
        assert_eq!(balance.expires_at, Some(NOW + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_expired_balance_cannot_be_spent() {
        let ledger = ledger().await;
        ledger
            .grant_at("u1", "pro-monthly", 5, NOW, NOW - Duration::days(30))
            .await
            .unwrap();

        // expires_at == now is already expired
        assert!(!ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());
        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 5, "expiry is lazy, the row is untouched");
        assert_eq!(balance.effective_at(NOW), 0);
        assert!(!ledger.has_credit_at("u1", "pro-monthly", NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_grant_rejected() {
        let ledger = ledger().await;
        let err = ledger
            .grant_at("u1", "pro-monthly", -1, NOW, NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(-1)));
    }

    #[tokio::test]
    async fn test_unknown_pack() {
        let ledger = ledger().await;
        let err = ledger.grant_pack_at("u1", "lifetime", NOW).await.unwrap_err();
        assert!(matches!(err, BillingError::UnknownPack(_)));
    }
}
