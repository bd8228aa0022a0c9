//! Paid event log
//!
//! Append-only record of every resolved paid access. Credit-funded events
//! carry a zero amount and `used_credit`; the balance view prices them back
//! at list price to report what credits saved.

use habitpay_shared::{cents_to_usd, from_unix, list_price_cents, to_unix};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Status written for every resolved access
pub const STATUS_SETTLED: &str = "settled";

/// History page bounds
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Debug, Clone)]
pub struct NewPaidEvent<'a> {
    pub user_id: &'a str,
    pub endpoint: &'a str,
    pub amount_cents: i64,
    pub used_credit: bool,
    pub meta: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaidEvent {
    pub id: String,
    pub endpoint: String,
    pub amount_cents: i64,
    pub amount_usd: f64,
    pub status: String,
    pub used_credit: bool,
    pub meta: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct PaidEventRow {
    id: String,
    endpoint: String,
    amount_cents: i64,
    status: String,
    used_credit: bool,
    meta: String,
    created_at: i64,
}

impl TryFrom<PaidEventRow> for PaidEvent {
    type Error = BillingError;

    fn try_from(row: PaidEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            endpoint: row.endpoint,
            amount_cents: row.amount_cents,
            amount_usd: cents_to_usd(row.amount_cents),
            status: row.status,
            used_credit: row.used_credit,
            meta: serde_json::from_str(&row.meta)?,
            created_at: from_unix(row.created_at),
        })
    }
}

/// What credit-funded access would have cost at list price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditSavings {
    pub total_saved_cents: i64,
    pub credits_used_count: i64,
}

pub struct PaidEventLog {
    pool: SqlitePool,
}

impl PaidEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append_at(&self, event: &NewPaidEvent<'_>, now: OffsetDateTime) -> BillingResult<Uuid> {
        if event.amount_cents < 0 {
            return Err(BillingError::InvalidAmount(event.amount_cents));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO paid_events (id, user_id, endpoint, amount_cents, status, used_credit, meta, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(event.user_id)
        .bind(event.endpoint)
        .bind(event.amount_cents)
        .bind(STATUS_SETTLED)
        .bind(event.used_credit)
        .bind(serde_json::to_string(&event.meta)?)
        .bind(to_unix(now))
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %event.user_id,
            endpoint = %event.endpoint,
            amount_cents = event.amount_cents,
            used_credit = event.used_credit,
            "Paid event recorded"
        );

        Ok(id)
    }

    /// Newest first. `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
    pub async fn list_for_user(&self, user_id: &str, limit: Option<i64>) -> BillingResult<Vec<PaidEvent>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let rows: Vec<PaidEventRow> = sqlx::query_as(
            r#"
            SELECT id, endpoint, amount_cents, status, used_credit, meta, created_at
            FROM paid_events
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaidEvent::try_from).collect()
    }

    pub async fn credit_savings(&self, user_id: &str) -> BillingResult<CreditSavings> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT endpoint, COUNT(*)
            FROM paid_events
            WHERE user_id = ? AND used_credit = 1
            GROUP BY endpoint
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut savings = CreditSavings {
            total_saved_cents: 0,
            credits_used_count: 0,
        };
        for (endpoint, count) in rows {
            savings.credits_used_count += count;
            savings.total_saved_cents += list_price_cents(&endpoint).unwrap_or(0) * count;
        }
        Ok(savings)
    }
}
