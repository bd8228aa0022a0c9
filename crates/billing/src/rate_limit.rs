//! Generation rate limiting
//!
//! At most one successful generation per (user, report kind) in a rolling
//! 24 hour window, counted from the insight audit log. Cache hits never
//! write an audit row and so never use up the window.
//!
//! Two concurrent first requests can both pass the count before either
//! audit row lands. That window is accepted.

use habitpay_shared::to_unix;
use serde::Serialize;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::error::BillingResult;

/// Rolling window length
pub const GENERATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Set when denied
    pub retry_after_hours: Option<i64>,
}

impl RateLimitResult {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_hours: None,
        }
    }

    fn denied() -> Self {
        Self {
            allowed: false,
            retry_after_hours: Some(GENERATION_WINDOW_HOURS),
        }
    }
}

pub struct GenerationRateLimiter {
    pool: SqlitePool,
}

impl GenerationRateLimiter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn allow(&self, user_id: &str, endpoint: &str) -> BillingResult<RateLimitResult> {
        self.allow_at(user_id, endpoint, OffsetDateTime::now_utc())
            .await
    }

    pub async fn allow_at(
        &self,
        user_id: &str,
        endpoint: &str,
        now: OffsetDateTime,
    ) -> BillingResult<RateLimitResult> {
        let since = now - Duration::hours(GENERATION_WINDOW_HOURS);

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM insights_audit
            WHERE user_id = ? AND endpoint = ? AND created_at >= ?
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(to_unix(since))
        .fetch_one(&self.pool)
        .await?;

        if count == 0 {
            Ok(RateLimitResult::allowed())
        } else {
            tracing::info!(
                user_id = %user_id,
                endpoint = %endpoint,
                generations = count,
                "Generation rate limited"
            );
            Ok(RateLimitResult::denied())
        }
    }
}
