//! Paid report orchestration
//!
//! cache → rate limit → charge → generate → cache put → audit → paid event.

use axum::{
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use habitpay_billing::{input_hash, AuditEntry, NewPaidEvent, GENERATION_WINDOW_HOURS};
use habitpay_shared::{from_unix, paid_resource, to_unix};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::input::ReportInput;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::payment::{charge, PaidAccess, SettleResponse, X_PAYMENT_RESPONSE};
use crate::state::AppState;

/// `paid_with` of a report served from cache
const PAID_WITH_CACHE: &str = "cache";

/// Serve a paid report to a user the payment gate already admitted
pub async fn serve_report(
    state: &AppState,
    user: &AuthUser,
    access: &PaidAccess,
    input: ReportInput,
) -> ApiResult<Response> {
    let kind = input.kind();
    let endpoint = kind.endpoint();
    let resource = paid_resource(kind.path()).ok_or(ApiError::NotFound)?;
    let billing = &state.billing;

    let key = input.cache_key();
    let hash = input_hash(&key);
    let now = OffsetDateTime::now_utc();

    if let Some(hit) = billing
        .cache
        .lookup_at(&user.user_id, endpoint, &hash, now)
        .await?
    {
        let cached_until = rfc3339(hit.valid_until)?;
        billing
            .events
            .append_at(
                &NewPaidEvent {
                    user_id: &user.user_id,
                    endpoint,
                    amount_cents: 0,
                    used_credit: false,
                    meta: json!({
                        "cachedUntil": cached_until,
                        "used_credit": false,
                        "cache_hit": true,
                        "paid_with": PAID_WITH_CACHE,
                    }),
                },
                now,
            )
            .await?;

        tracing::debug!(user_id = %user.user_id, endpoint, "Report served from cache");
        return report_response(hit.content, cached_until, false, PAID_WITH_CACHE, None);
    }

    if let PaidAccess::CacheOnly(instructions) = access {
        return Err(ApiError::PaymentRequired(instructions.clone()));
    }

    let limit = billing
        .rate_limiter
        .allow_at(&user.user_id, endpoint, now)
        .await?;
    if !limit.allowed {
        tracing::info!(user_id = %user.user_id, endpoint, "Report generation rate limited");
        return Err(ApiError::RateLimited {
            retry_in_hours: limit.retry_after_hours.unwrap_or(GENERATION_WINDOW_HOURS),
        });
    }

    let charged = charge(state, user, resource, access).await?;

    let report = state.insights.build(&user.user_id, &input).await?;

    // Stored at second precision; keep the first response identical to later hits
    let valid_until = from_unix(to_unix(input.valid_until(now)));
    let cached_until = rfc3339(valid_until)?;

    billing
        .cache
        .put_at(&user.user_id, endpoint, &hash, &key, &report.content, valid_until, now)
        .await?;

    billing
        .audit
        .append_at(
            &AuditEntry {
                user_id: &user.user_id,
                endpoint,
                input: &key,
                output: &report.summary,
                tokens_prompt: report.tokens_prompt,
                tokens_completion: report.tokens_completion,
                cost_usd: None,
            },
            now,
        )
        .await?;

    let mut meta = json!({
        "cachedUntil": cached_until,
        "used_credit": charged.used_credit,
        "paid_with": charged.paid_with,
    });
    if charged.used_credit {
        meta["period"] = json!(habitpay_shared::DEFAULT_CREDIT_PERIOD);
    }
    if report.draft {
        meta["draft"] = json!(true);
    }
    if let Some(tx) = charged.settlement.as_ref().and_then(|s| s.transaction.as_ref()) {
        meta["transaction"] = json!(tx);
    }

    billing
        .events
        .append_at(
            &NewPaidEvent {
                user_id: &user.user_id,
                endpoint,
                amount_cents: charged.amount_cents,
                used_credit: charged.used_credit,
                meta,
            },
            now,
        )
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        endpoint,
        amount_cents = charged.amount_cents,
        paid_with = charged.paid_with,
        draft = report.draft,
        "Report generated"
    );

    report_response(
        report.content,
        cached_until,
        charged.used_credit,
        charged.paid_with,
        charged.settlement.as_ref(),
    )
}

fn rfc3339(at: OffsetDateTime) -> ApiResult<String> {
    at.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("Failed to format timestamp: {e}")))
}

fn report_response(
    content: Value,
    cached_until: String,
    used_credit: bool,
    paid_with: &str,
    settlement: Option<&SettleResponse>,
) -> ApiResult<Response> {
    let mut body = match content {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("report".to_string(), other);
            map
        }
    };
    body.insert("cachedUntil".to_string(), Value::String(cached_until));
    body.insert("usedCredit".to_string(), Value::Bool(used_credit));
    body.insert("paidWith".to_string(), Value::String(paid_with.to_string()));

    let mut response = Json(Value::Object(body)).into_response();
    if let Some(settlement) = settlement {
        attach_settlement(&mut response, settlement);
    }
    Ok(response)
}

/// Add the `X-PAYMENT-RESPONSE` receipt header
pub fn attach_settlement(response: &mut Response, settlement: &SettleResponse) {
    if let Ok(value) = HeaderValue::from_str(&settlement.to_header_value()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(X_PAYMENT_RESPONSE), value);
    }
}
