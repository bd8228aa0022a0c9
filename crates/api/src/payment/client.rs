//! Micropayment facilitator client
//!
//! Verifies and settles x402 payment proofs against the facilitator. Each
//! call is retried at most once, on transport failures and 5xx only. An
//! unreachable facilitator fails closed.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_retry::{strategy::FixedInterval, RetryIf};

use super::requirements::{PaymentRequirements, X402_VERSION};

/// Header carrying the client's payment proof
pub const X_PAYMENT: &str = "x-payment";
/// Header carrying the settlement receipt
pub const X_PAYMENT_RESPONSE: &str = "x-payment-response";

const RETRY_DELAY_MS: u64 = 250;
const FACILITATOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Malformed payment header: {0}")]
    InvalidHeader(String),
    #[error("Payment rejected: {0}")]
    Rejected(String),
    #[error("Facilitator unreachable: {0}")]
    Unreachable(String),
}

/// Failure of one facilitator round trip
#[derive(Debug)]
enum CallError {
    Transport(reqwest::Error),
    Status(u16),
    Decode(String),
}

impl CallError {
    fn is_retryable(&self) -> bool {
        match self {
            CallError::Transport(_) => true,
            CallError::Status(status) => *status >= 500,
            CallError::Decode(_) => false,
        }
    }
}

impl From<CallError> for PaymentError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Transport(e) => PaymentError::Unreachable(e.to_string()),
            CallError::Status(status) if status >= 500 => {
                PaymentError::Unreachable(format!("facilitator returned {status}"))
            }
            CallError::Status(status) => {
                PaymentError::Rejected(format!("facilitator returned {status}"))
            }
            CallError::Decode(e) => PaymentError::Unreachable(e),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequest<'a> {
    x402_version: u8,
    payment_payload: &'a Value,
    payment_requirements: &'a PaymentRequirements,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    is_valid: bool,
    invalid_reason: Option<String>,
    payer: Option<String>,
}

/// Settlement result, echoed back to the client base64-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    /// Value of the `X-PAYMENT-RESPONSE` header
    pub fn to_header_value(&self) -> String {
        STANDARD.encode(serde_json::to_vec(self).unwrap_or_default())
    }
}

/// A proof the facilitator accepted but that has not been settled yet
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub payload: Value,
    pub requirements: PaymentRequirements,
    pub payer: Option<String>,
}

/// Decode the base64 JSON `X-PAYMENT` header
pub fn decode_payment_header(value: &str) -> Result<Value, PaymentError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| PaymentError::InvalidHeader(e.to_string()))?;
    let payload: Value =
        serde_json::from_slice(&bytes).map_err(|e| PaymentError::InvalidHeader(e.to_string()))?;
    if !payload.is_object() {
        return Err(PaymentError::InvalidHeader("payload is not an object".to_string()));
    }
    Ok(payload)
}

#[derive(Clone)]
pub struct MicropaymentClient {
    http_client: Client,
    facilitator_url: String,
}

impl MicropaymentClient {
    pub fn new(http_client: Client, facilitator_url: impl Into<String>) -> Self {
        Self {
            http_client,
            facilitator_url: facilitator_url.into(),
        }
    }

    pub async fn verify(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<VerifiedPayment, PaymentError> {
        let response: VerifyResponse = self.call("verify", payload, requirements).await?;

        if !response.is_valid {
            return Err(PaymentError::Rejected(
                response
                    .invalid_reason
                    .unwrap_or_else(|| "invalid payment".to_string()),
            ));
        }

        Ok(VerifiedPayment {
            payload: payload.clone(),
            requirements: requirements.clone(),
            payer: response.payer,
        })
    }

    pub async fn settle(&self, payment: &VerifiedPayment) -> Result<SettleResponse, PaymentError> {
        let response: SettleResponse = self
            .call("settle", &payment.payload, &payment.requirements)
            .await?;

        if !response.success {
            return Err(PaymentError::Rejected(
                response
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "settlement failed".to_string()),
            ));
        }

        tracing::info!(
            resource = %payment.requirements.resource,
            amount = %payment.requirements.max_amount_required,
            transaction = ?response.transaction,
            "Micropayment settled"
        );
        Ok(response)
    }

    async fn call<T>(
        &self,
        action: &str,
        payload: &Value,
        requirements: &PaymentRequirements,
    ) -> Result<T, CallError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.facilitator_url, action);
        let body = FacilitatorRequest {
            x402_version: X402_VERSION,
            payment_payload: payload,
            payment_requirements: requirements,
        };

        let strategy = FixedInterval::from_millis(RETRY_DELAY_MS).take(1);
        RetryIf::spawn(
            strategy,
            || self.post::<T>(&url, &body),
            |e: &CallError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::warn!(url = %url, error = ?e, "Facilitator call failed, retrying once");
                }
                retry
            },
        )
        .await
    }

    async fn post<T>(&self, url: &str, body: &FacilitatorRequest<'_>) -> Result<T, CallError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .http_client
            .post(url)
            .timeout(FACILITATOR_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(CallError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CallError::Decode(e.to_string()))
    }
}
