// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! HabitPay shared types
//!
//! Store pool construction, schema migrations, the pricing catalogue and
//! the plan tiers used by both the billing and API crates.

pub mod db;
pub mod pricing;
pub mod tier;
pub mod timestamp;

pub use db::{create_memory_pool, create_pool, run_migrations, DbError};
pub use pricing::{
    cents_to_usd, credit_pack, list_price_cents, paid_resource, usdc_atomic_units, CreditPack,
    PaidResource, CREDIT_PACKS, DEFAULT_CREDIT_PERIOD, PAID_API_PREFIX, PAID_RESOURCES,
};
pub use tier::PlanTier;
pub use timestamp::{from_unix, to_unix};
