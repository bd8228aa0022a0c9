//! Pricing catalogue
//!
//! Single source of truth for what each paid resource costs and which
//! payment sources it accepts, plus the prepaid credit packs on sale.

use serde::Serialize;

/// Path prefix of every resource behind the payment gate
pub const PAID_API_PREFIX: &str = "/api/paid/";

/// Credit period consumed by report endpoints
pub const DEFAULT_CREDIT_PERIOD: &str = "pro-monthly";

/// A priced resource behind the payment gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaidResource {
    /// Full request path
    pub path: &'static str,
    /// Logical endpoint name used in cache keys and billing logs
    pub endpoint: &'static str,
    /// Per-request micropayment price in US cents
    pub price_cents: i64,
    pub description: &'static str,
    /// An active pro/premium plan grants access without payment
    pub honors_plan: bool,
    /// A prepaid credit can be spent instead of a micropayment
    pub honors_credit: bool,
    /// The endpoint may re-serve the caller's own cached result without payment
    pub serves_cached: bool,
}

pub const PAID_RESOURCES: &[PaidResource] = &[
    PaidResource {
        path: "/api/paid/insight/habit",
        endpoint: "insight/habit",
        price_cents: 15,
        description: "Habit insight",
        honors_plan: true,
        honors_credit: true,
        serves_cached: true,
    },
    PaidResource {
        path: "/api/paid/insight/weekly",
        endpoint: "insight/weekly",
        price_cents: 25,
        description: "Weekly insight",
        honors_plan: true,
        honors_credit: true,
        serves_cached: true,
    },
    PaidResource {
        path: "/api/paid/insight/monthly",
        endpoint: "insight/monthly",
        price_cents: 35,
        description: "Monthly insight",
        honors_plan: true,
        honors_credit: true,
        serves_cached: true,
    },
    PaidResource {
        path: "/api/paid/credits/pro-monthly",
        endpoint: "credits/pro-monthly",
        price_cents: 499,
        description: "Pro credits pack",
        honors_plan: false,
        honors_credit: false,
        serves_cached: false,
    },
    PaidResource {
        path: "/api/paid/ping",
        endpoint: "ping",
        price_cents: 1,
        description: "Paid endpoint probe",
        honors_plan: true,
        honors_credit: false,
        serves_cached: false,
    },
];

/// Look up a paid resource by exact request path
pub fn paid_resource(path: &str) -> Option<&'static PaidResource> {
    let path = path.trim_end_matches('/');
    PAID_RESOURCES.iter().find(|r| r.path == path)
}

/// List price of an endpoint, used to compute what credits saved a user
pub fn list_price_cents(endpoint: &str) -> Option<i64> {
    PAID_RESOURCES
        .iter()
        .find(|r| r.endpoint == endpoint)
        .map(|r| r.price_cents)
}

/// A prepaid credit pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPack {
    /// Pack name, also the ledger period it grants into
    pub name: &'static str,
    pub price_cents: i64,
    pub credits: i64,
    /// Validity of the granted credits
    pub days: i64,
}

pub const CREDIT_PACKS: &[CreditPack] = &[CreditPack {
    name: "pro-monthly",
    price_cents: 499,
    credits: 12,
    days: 30,
}];

pub fn credit_pack(name: &str) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|p| p.name == name)
}

/// Convert cents to a USD amount for JSON bodies
pub fn cents_to_usd(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// USDC has 6 decimals: one cent is 10_000 atomic units
pub fn usdc_atomic_units(cents: i64) -> String {
    (cents.max(0) as u128 * 10_000).to_string()
}
