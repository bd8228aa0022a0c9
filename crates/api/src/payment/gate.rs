//! Payment gate for `/api/paid/*`
//!
//! Runs after authentication. Decides whether the request may proceed and
//! which source will pay for it; the endpoint does the actual debit.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use habitpay_shared::{paid_resource, PaidResource, DEFAULT_CREDIT_PERIOD};
use time::OffsetDateTime;

use super::client::{decode_payment_header, PaymentError, SettleResponse, VerifiedPayment, X_PAYMENT};
use super::requirements::{PaymentInstructions, PaymentRequirements};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MISSING_PAYMENT: &str = "X-PAYMENT header is required";

/// How a gated request is allowed through
#[derive(Debug, Clone)]
pub enum PaidAccess {
    /// Active pro/premium plan, nothing to charge
    Plan,
    /// A prepaid credit was available when the gate looked
    Credit,
    /// A verified, not yet settled, micropayment proof
    Micropayment(VerifiedPayment),
    /// Nothing to pay with. The endpoint may still serve the caller's own
    /// cached result; anything else answers with these instructions.
    CacheOnly(Box<PaymentInstructions>),
}

impl PaidAccess {
    pub fn label(&self) -> &'static str {
        match self {
            PaidAccess::Plan => "plan",
            PaidAccess::Credit => "credit",
            PaidAccess::Micropayment(_) => "x402",
            PaidAccess::CacheOnly(_) => "cache",
        }
    }
}

/// Result of debiting the access source
#[derive(Debug, Clone)]
pub struct Charge {
    pub amount_cents: i64,
    pub used_credit: bool,
    pub paid_with: &'static str,
    pub settlement: Option<SettleResponse>,
}

/// Middleware enforcing payment on paid resources
pub async fn require_payment(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(user) = request.extensions().get::<AuthUser>().cloned() else {
        return ApiError::Unauthorized.into_response();
    };
    let payment_header = request.headers().get(X_PAYMENT).cloned();

    match resolve_access(&state, &user, &path, payment_header.as_ref()).await {
        Ok(access) => {
            tracing::debug!(path = %path, paid_with = access.label(), "Payment gate passed");
            request.extensions_mut().insert(access);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

async fn resolve_access(
    state: &AppState,
    user: &AuthUser,
    path: &str,
    payment_header: Option<&HeaderValue>,
) -> ApiResult<PaidAccess> {
    if !state.config.paid_enabled {
        return Err(ApiError::ServiceUnavailable(
            "Paid features are disabled".to_string(),
        ));
    }

    let resource = paid_resource(path).ok_or(ApiError::NotFound)?;
    let now = OffsetDateTime::now_utc();

    if state.config.require_plan
        && resource.honors_plan
        && state.billing.plans.is_active_at(&user.user_id, now).await?
    {
        return Ok(PaidAccess::Plan);
    }

    if resource.honors_credit
        && state
            .billing
            .credits
            .has_credit_at(&user.user_id, DEFAULT_CREDIT_PERIOD, now)
            .await?
    {
        return Ok(PaidAccess::Credit);
    }

    let Some(header) = payment_header else {
        if resource.serves_cached {
            return Ok(PaidAccess::CacheOnly(Box::new(PaymentInstructions::new(
                resource,
                &state.config,
                MISSING_PAYMENT,
            ))));
        }
        return Err(payment_required(resource, state, MISSING_PAYMENT));
    };

    let payload = header
        .to_str()
        .map_err(|e| PaymentError::InvalidHeader(e.to_string()))
        .and_then(decode_payment_header);
    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                security_event = "invalid_payment_proof",
                user_id = %user.user_id,
                path = %resource.path,
                error = %e,
                "Malformed payment proof"
            );
            return Err(payment_required(resource, state, e.to_string()));
        }
    };

    let requirements = PaymentRequirements::for_resource(resource, &state.config);
    match state.payments.verify(&payload, &requirements).await {
        Ok(verified) => Ok(PaidAccess::Micropayment(verified)),
        Err(PaymentError::Unreachable(e)) => Err(ApiError::PaymentFacilitator(e)),
        Err(e) => {
            tracing::warn!(
                security_event = "invalid_payment_proof",
                user_id = %user.user_id,
                path = %resource.path,
                error = %e,
                "Payment proof rejected"
            );
            Err(payment_required(resource, state, e.to_string()))
        }
    }
}

pub fn payment_required(resource: &PaidResource, state: &AppState, error: impl Into<String>) -> ApiError {
    ApiError::PaymentRequired(Box::new(PaymentInstructions::new(
        resource,
        &state.config,
        error,
    )))
}

/// Debit the source the gate chose.
///
/// A credit seen by the gate can be spent by a concurrent request before
/// this runs; losing that race is a 402, never a negative balance.
pub async fn charge(
    state: &AppState,
    user: &AuthUser,
    resource: &PaidResource,
    access: &PaidAccess,
) -> ApiResult<Charge> {
    match access {
        PaidAccess::CacheOnly(instructions) => Err(ApiError::PaymentRequired(instructions.clone())),
        PaidAccess::Plan => Ok(Charge {
            amount_cents: 0,
            used_credit: false,
            paid_with: access.label(),
            settlement: None,
        }),
        PaidAccess::Credit => {
            let consumed = state
                .billing
                .credits
                .consume(&user.user_id, DEFAULT_CREDIT_PERIOD)
                .await?;
            if !consumed {
                return Err(payment_required(resource, state, "No credits remaining"));
            }
            Ok(Charge {
                amount_cents: 0,
                used_credit: true,
                paid_with: access.label(),
                settlement: None,
            })
        }
        PaidAccess::Micropayment(payment) => {
            let settlement = state.payments.settle(payment).await.map_err(|e| match e {
                PaymentError::Unreachable(e) => ApiError::PaymentFacilitator(e),
                other => payment_required(resource, state, other.to_string()),
            })?;
            Ok(Charge {
                amount_cents: resource.price_cents,
                used_credit: false,
                paid_with: access.label(),
                settlement: Some(settlement),
            })
        }
    }
}
