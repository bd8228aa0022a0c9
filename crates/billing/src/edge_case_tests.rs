// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing
//!
//! Boundary conditions and races in:
//! - Credit consumption under concurrency
//! - Credit expiry boundaries
//! - Generation rate limit window
//! - Cache expiry against the rate limit

#[cfg(test)]
mod credit_tests {
    use crate::credits::CreditLedger;
    use habitpay_shared::create_memory_pool;
    use std::sync::Arc;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};
    use tokio::sync::Barrier;

    const NOW: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    // =========================================================================
    // 20 concurrent consumers against 5 credits - exactly 5 succeed
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_consume_never_overspends() {
        let pool = create_memory_pool().await.unwrap();
        let ledger = Arc::new(CreditLedger::new(pool));
        ledger
            .grant_at("u1", "pro-monthly", 5, NOW + Duration::days(30), NOW)
            .await
            .unwrap();

        let barrier = Arc::new(Barrier::new(20));
        let mut handles = vec![];
        for _ in 0..20 {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 5, "Only the granted credits can be spent");
        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 0);
    }

    // =========================================================================
    // Last credit, one second before expiry - spendable
    // =========================================================================
    #[tokio::test]
    async fn test_consume_one_second_before_expiry() {
        let ledger = CreditLedger::new(create_memory_pool().await.unwrap());
        let expires_at = NOW + Duration::days(1);
        ledger
            .grant_at("u1", "pro-monthly", 1, expires_at, NOW)
            .await
            .unwrap();

        assert!(ledger
            .consume_at("u1", "pro-monthly", expires_at - Duration::seconds(1))
            .await
            .unwrap());
    }

    // =========================================================================
    // Periods are independent balances
    // =========================================================================
    #[tokio::test]
    async fn test_periods_do_not_share_credits() {
        let ledger = CreditLedger::new(create_memory_pool().await.unwrap());
        ledger
            .grant_at("u1", "pro-monthly", 1, NOW + Duration::days(1), NOW)
            .await
            .unwrap();

        assert!(!ledger.consume_at("u1", "other", NOW).await.unwrap());
        assert!(!ledger.consume_at("u2", "pro-monthly", NOW).await.unwrap());
        assert!(ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());
    }

    // =========================================================================
    // Re-grant after expiry revives the balance with a fresh expiry
    // =========================================================================
    #[tokio::test]
    async fn test_regrant_after_expiry() {
        let ledger = CreditLedger::new(create_memory_pool().await.unwrap());
        ledger
            .grant_at("u1", "pro-monthly", 3, NOW - Duration::days(1), NOW - Duration::days(31))
            .await
            .unwrap();
        assert!(!ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());

        ledger.grant_pack_at("u1", "pro-monthly", NOW).await.unwrap();
        assert!(ledger.consume_at("u1", "pro-monthly", NOW).await.unwrap());

        let balance = ledger.get_balance("u1", "pro-monthly").await.unwrap();
        assert_eq!(balance.credits, 11);
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use crate::audit::{AuditEntry, InsightAuditLog};
    use crate::rate_limit::{GenerationRateLimiter, GENERATION_WINDOW_HOURS};
    use habitpay_shared::create_memory_pool;
    use serde_json::json;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    async fn record_generation(log: &InsightAuditLog, user_id: &str, endpoint: &str, at: OffsetDateTime) {
        log.append_at(
            &AuditEntry {
                user_id,
                endpoint,
                input: &json!({}),
                output: "summary",
                tokens_prompt: None,
                tokens_completion: None,
                cost_usd: None,
            },
            at,
        )
        .await
        .unwrap();
    }

    // =========================================================================
    // No prior generation - allowed
    // =========================================================================
    #[tokio::test]
    async fn test_first_generation_allowed() {
        let limiter = GenerationRateLimiter::new(create_memory_pool().await.unwrap());
        let result = limiter.allow_at("u1", "insight/habit", NOW).await.unwrap();
        assert!(result.allowed);
        assert!(result.retry_after_hours.is_none());
    }

    // =========================================================================
    // One generation recorded - denied until the window passes
    // =========================================================================
    #[tokio::test]
    async fn test_denied_within_window_then_allowed() {
        let pool = create_memory_pool().await.unwrap();
        let log = InsightAuditLog::new(pool.clone());
        let limiter = GenerationRateLimiter::new(pool);

        record_generation(&log, "u1", "insight/habit", NOW).await;

        let denied = limiter.allow_at("u1", "insight/habit", NOW).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_hours, Some(24));

        let almost = NOW + Duration::hours(GENERATION_WINDOW_HOURS) - Duration::seconds(1);
        assert!(!limiter.allow_at("u1", "insight/habit", almost).await.unwrap().allowed);

        let after = NOW + Duration::hours(GENERATION_WINDOW_HOURS) + Duration::seconds(1);
        assert!(limiter.allow_at("u1", "insight/habit", after).await.unwrap().allowed);
    }

    // =========================================================================
    // The window is per report kind and per user
    // =========================================================================
    #[tokio::test]
    async fn test_window_is_per_kind_and_user() {
        let pool = create_memory_pool().await.unwrap();
        let log = InsightAuditLog::new(pool.clone());
        let limiter = GenerationRateLimiter::new(pool);

        record_generation(&log, "u1", "insight/habit", NOW).await;

        assert!(limiter.allow_at("u1", "insight/weekly", NOW).await.unwrap().allowed);
        assert!(limiter.allow_at("u2", "insight/habit", NOW).await.unwrap().allowed);
    }
}

#[cfg(test)]
mod service_tests {
    use crate::cache::input_hash;
    use crate::events::NewPaidEvent;
    use crate::BillingService;
    use habitpay_shared::create_memory_pool;
    use serde_json::json;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2024-05-01 09:00 UTC);

    // =========================================================================
    // Cache hit and savings view on a shared pool
    // =========================================================================
    #[tokio::test]
    async fn test_service_components_share_store() {
        let billing = BillingService::new(create_memory_pool().await.unwrap());
        let input = json!({"highAccuracy": false, "date": "2024-05-01"});
        let hash = input_hash(&input);

        billing
            .cache
            .put_at("u1", "insight/habit", &hash, &input, &json!({"summary": "ok"}), NOW + Duration::days(7), NOW)
            .await
            .unwrap();
        billing
            .events
            .append_at(
                &NewPaidEvent {
                    user_id: "u1",
                    endpoint: "insight/habit",
                    amount_cents: 0,
                    used_credit: true,
                    meta: json!({"period": "pro-monthly"}),
                },
                NOW,
            )
            .await
            .unwrap();

        let same_input = json!({"date": "2024-05-01", "highAccuracy": false});
        assert!(billing
            .cache
            .lookup_at("u1", "insight/habit", &input_hash(&same_input), NOW)
            .await
            .unwrap()
            .is_some());

        let savings = billing.events.credit_savings("u1").await.unwrap();
        assert_eq!(savings.total_saved_cents, 15);

        let summary = billing.invariants.run_all_checks().await.unwrap();
        assert!(summary.healthy);
    }
}
