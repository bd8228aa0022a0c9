// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HabitPay Billing Module
//!
//! Durable state behind paid access to insight reports.
//!
//! ## Features
//!
//! - **Credit Ledger**: prepaid credit packs with atomic consume and lazy expiry
//! - **Report Cache**: content-addressed cache of generated reports
//! - **Rate Limiting**: one generation per user and report kind per 24 hours
//! - **Plans**: flat-rate pro/premium plans
//! - **Paid Events**: append-only billing log, source of the savings view
//! - **Insight Audit**: append-only generation log
//! - **Invariants**: runnable consistency checks

pub mod audit;
pub mod cache;
pub mod credits;
pub mod error;
pub mod events;
pub mod invariants;
pub mod plans;
pub mod rate_limit;

#[cfg(test)]
mod edge_case_tests;

// Audit
pub use audit::{preview, AuditEntry, InsightAuditLog, PREVIEW_MAX_CHARS};

// Cache
pub use cache::{input_hash, CachedReport, ReportCache};

// Credits
pub use credits::{CreditBalance, CreditGrant, CreditLedger};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{CreditSavings, NewPaidEvent, PaidEvent, PaidEventLog, STATUS_SETTLED};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Plans
pub use plans::{PlanService, UserPlan};

// Rate limiting
pub use rate_limit::{GenerationRateLimiter, RateLimitResult, GENERATION_WINDOW_HOURS};

use sqlx::SqlitePool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub credits: CreditLedger,
    pub cache: ReportCache,
    pub rate_limiter: GenerationRateLimiter,
    pub plans: PlanService,
    pub events: PaidEventLog,
    pub audit: InsightAuditLog,
    pub invariants: InvariantChecker,
}

impl BillingService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            credits: CreditLedger::new(pool.clone()),
            cache: ReportCache::new(pool.clone()),
            rate_limiter: GenerationRateLimiter::new(pool.clone()),
            plans: PlanService::new(pool.clone()),
            events: PaidEventLog::new(pool.clone()),
            audit: InsightAuditLog::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
        }
    }
}
