//! x402 payment requirements and the 402 response body

use habitpay_shared::{cents_to_usd, usdc_atomic_units, PaidResource};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const X402_VERSION: u8 = 1;

/// How long a signed payment authorization stays usable
const MAX_TIMEOUT_SECONDS: u64 = 60;

/// What a client must pay for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// USDC atomic units (6 decimals)
    pub max_amount_required: String,
    /// Absolute URL of the resource
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub asset: String,
}

impl PaymentRequirements {
    pub fn for_resource(resource: &PaidResource, config: &Config) -> Self {
        Self {
            scheme: "exact".to_string(),
            network: config.x402.network.clone(),
            max_amount_required: usdc_atomic_units(resource.price_cents),
            resource: format!("{}{}", config.public_base_url, resource.path),
            description: resource.description.to_string(),
            mime_type: "application/json".to_string(),
            pay_to: config.x402.recipient.clone(),
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            asset: config.x402.asset.clone(),
        }
    }
}

/// Body of a 402 response: enough for a client to build a proof and retry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub error: String,
    pub code: u16,
    pub x402_version: u8,
    /// USD
    pub price: f64,
    pub recipient: String,
    pub network: String,
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentInstructions {
    pub fn new(resource: &PaidResource, config: &Config, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: 402,
            x402_version: X402_VERSION,
            price: cents_to_usd(resource.price_cents),
            recipient: config.x402.recipient.clone(),
            network: config.x402.network.clone(),
            accepts: vec![PaymentRequirements::for_resource(resource, config)],
        }
    }
}
