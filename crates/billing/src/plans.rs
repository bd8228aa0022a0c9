//! Flat-rate plans

use habitpay_shared::{from_unix, to_unix, PlanTier};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::error::BillingResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPlan {
    pub plan: PlanTier,
    #[serde(with = "time::serde::rfc3339::option")]
    pub plan_until: Option<OffsetDateTime>,
}

impl UserPlan {
    pub fn free() -> Self {
        Self {
            plan: PlanTier::Free,
            plan_until: None,
        }
    }

    /// A plan grants access only when paid and `plan_until` is still ahead.
    /// A paid plan with no end date is treated as inactive.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.plan.is_paid() && self.plan_until.is_some_and(|until| until > now)
    }
}

pub struct PlanService {
    pool: SqlitePool,
}

impl PlanService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Users without a row are on the free plan
    pub async fn get(&self, user_id: &str) -> BillingResult<UserPlan> {
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT plan, plan_until FROM user_plans WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((plan, plan_until)) => UserPlan {
                plan: plan.parse().unwrap_or_default(),
                plan_until: plan_until.map(from_unix),
            },
            None => UserPlan::free(),
        })
    }

    pub async fn is_active_at(&self, user_id: &str, now: OffsetDateTime) -> BillingResult<bool> {
        Ok(self.get(user_id).await?.is_active_at(now))
    }

    pub async fn set_at(
        &self,
        user_id: &str,
        plan: PlanTier,
        plan_until: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> BillingResult<UserPlan> {
        sqlx::query(
            r#"
            INSERT INTO user_plans (user_id, plan, plan_until, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                plan = excluded.plan,
                plan_until = excluded.plan_until,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(plan_until.map(to_unix))
        .bind(to_unix(now))
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, plan = %plan, "Plan updated");

        Ok(UserPlan { plan, plan_until })
    }
}
