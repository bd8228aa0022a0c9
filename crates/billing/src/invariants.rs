//! Billing Invariants Module
//!
//! Runnable consistency checks over the ledger and the billing logs.
//! Checks only read, never write.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::audit::PREVIEW_MAX_CHARS;
use crate::error::BillingResult;

/// One row that breaks an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant: String,
    pub user_ids: Vec<String>,
    pub description: String,
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Critical means money or credits are wrong; the rest is bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Critical,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct CreditRow {
    user_id: String,
    period: String,
    credits: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CreditEventRow {
    id: String,
    user_id: String,
    endpoint: String,
    amount_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LongPreviewRow {
    id: String,
    user_id: String,
    preview_len: i64,
}

const CHECKS: &[&str] = &[
    "credits_non_negative",
    "credit_events_zero_amount",
    "credits_have_expiry",
    "audit_preview_bounded",
];

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: SqlitePool,
}

impl InvariantChecker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        for name in CHECKS {
            violations.extend(self.run_check(name).await?);
        }

        let checks_run = CHECKS.len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        if !violations.is_empty() {
            tracing::warn!(
                checks_failed,
                violations = violations.len(),
                "Billing invariant violations found"
            );
        }

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: No balance is ever below zero
    async fn check_credits_non_negative(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CreditRow> = sqlx::query_as(
            "SELECT user_id, period, credits FROM user_credits WHERE credits < 0",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "credits_non_negative".to_string(),
                description: format!("Balance for period '{}' is {}", row.period, row.credits),
                context: serde_json::json!({
                    "period": row.period,
                    "credits": row.credits,
                }),
                user_ids: vec![row.user_id],
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Credit-funded access is logged at zero amount
    ///
    /// A nonzero amount on a credit event means the user paid twice.
    async fn check_credit_events_zero_amount(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CreditEventRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, endpoint, amount_cents
            FROM paid_events
            WHERE used_credit = 1 AND amount_cents <> 0
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "credit_events_zero_amount".to_string(),
                description: format!(
                    "Credit-funded event on '{}' recorded ${:.2}",
                    row.endpoint,
                    row.amount_cents as f64 / 100.0
                ),
                context: serde_json::json!({
                    "event_id": row.id,
                    "endpoint": row.endpoint,
                    "amount_cents": row.amount_cents,
                }),
                user_ids: vec![row.user_id],
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 3: Granted credits always carry an expiry
    async fn check_credits_have_expiry(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CreditRow> = sqlx::query_as(
            r#"
            SELECT user_id, period, credits
            FROM user_credits
            WHERE credits > 0 AND expires_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "credits_have_expiry".to_string(),
                description: format!(
                    "{} credits in period '{}' never expire",
                    row.credits, row.period
                ),
                context: serde_json::json!({
                    "period": row.period,
                    "credits": row.credits,
                }),
                user_ids: vec![row.user_id],
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 4: Audit previews stay within the preview bound
    async fn check_audit_preview_bounded(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<LongPreviewRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, length(output_preview) AS preview_len
            FROM insights_audit
            WHERE length(output_preview) > ?
            "#,
        )
        .bind(PREVIEW_MAX_CHARS as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "audit_preview_bounded".to_string(),
                description: format!("Audit preview is {} characters", row.preview_len),
                context: serde_json::json!({
                    "audit_id": row.id,
                    "preview_len": row.preview_len,
                }),
                user_ids: vec![row.user_id],
                severity: ViolationSeverity::Low,
            })
            .collect())
    }

    /// Unknown names report nothing
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "credits_non_negative" => self.check_credits_non_negative().await,
            "credit_events_zero_amount" => self.check_credit_events_zero_amount().await,
            "credits_have_expiry" => self.check_credits_have_expiry().await,
            "audit_preview_bounded" => self.check_audit_preview_bounded().await,
            _ => Ok(vec![]),
        }
    }

    pub fn available_checks() -> Vec<&'static str> {
        CHECKS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitpay_shared::create_memory_pool;

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ViolationSeverity::Critical).unwrap(),
            "\"critical\""
        );
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"credit_events_zero_amount"));
    }

    #[tokio::test]
    async fn test_empty_store_is_healthy() {
        let checker = InvariantChecker::new(create_memory_pool().await.unwrap());
        let summary = checker.run_all_checks().await.unwrap();
        assert!(summary.healthy);
        assert_eq!(summary.checks_run, 4);
        assert_eq!(summary.checks_passed, 4);
    }

    #[tokio::test]
    async fn test_detects_billed_credit_event_and_open_ended_credits() {
        let pool = create_memory_pool().await.unwrap();
        sqlx::query(
            "INSERT INTO paid_events (id, user_id, endpoint, amount_cents, status, used_credit, created_at) VALUES ('e1', 'u1', 'insight/habit', 15, 'settled', 1, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO user_credits (user_id, period, credits, expires_at, created_at, updated_at) VALUES ('u2', 'pro-monthly', 4, NULL, 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let summary = InvariantChecker::new(pool).run_all_checks().await.unwrap();
        assert!(!summary.healthy);
        assert_eq!(summary.checks_failed, 2);

        let names: Vec<&str> = summary.violations.iter().map(|v| v.invariant.as_str()).collect();
        assert!(names.contains(&"credit_events_zero_amount"));
        assert!(names.contains(&"credits_have_expiry"));
    }
}
