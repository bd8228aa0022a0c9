//! Credit pack purchase, balance and history routes

use axum::{
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use habitpay_billing::{NewPaidEvent, PaidEvent};
use habitpay_shared::{cents_to_usd, credit_pack, paid_resource, DEFAULT_CREDIT_PERIOD, PAID_API_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    insights::attach_settlement,
    payment::{charge, PaidAccess},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub ok: bool,
    pub pack: String,
    pub credits_granted: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub period: String,
    pub credits: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub total_saved_usd: f64,
    pub credits_used_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub events: Vec<PaidEvent>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/paid/credits/{pack}
///
/// Settles the micropayment the gate verified, then sets the pack balance.
pub async fn purchase_pack(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(access): Extension<PaidAccess>,
    Path(pack_name): Path<String>,
) -> ApiResult<Response> {
    let pack = credit_pack(&pack_name).ok_or(ApiError::NotFound)?;
    let path = format!("{PAID_API_PREFIX}credits/{}", pack.name);
    let resource = paid_resource(&path).ok_or(ApiError::NotFound)?;

    let charged = charge(&state, &user, resource, &access).await?;

    let now = OffsetDateTime::now_utc();
    let grant = state
        .billing
        .credits
        .grant_pack_at(&user.user_id, pack.name, now)
        .await?;

    let mut meta = json!({
        "pack": pack.name,
        "credits_granted": grant.credits_granted,
        "expires_at": grant.expires_at.unix_timestamp(),
        "paid_with": charged.paid_with,
    });
    if let Some(tx) = charged.settlement.as_ref().and_then(|s| s.transaction.as_ref()) {
        meta["transaction"] = json!(tx);
    }

    state
        .billing
        .events
        .append_at(
            &NewPaidEvent {
                user_id: &user.user_id,
                endpoint: resource.endpoint,
                amount_cents: charged.amount_cents,
                used_credit: false,
                meta,
            },
            now,
        )
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        pack = pack.name,
        credits = grant.credits_granted,
        amount_cents = charged.amount_cents,
        "Credit pack purchased"
    );

    let mut response = Json(PurchaseResponse {
        ok: true,
        pack: pack.name.to_string(),
        credits_granted: grant.credits_granted,
        expires_at: grant.expires_at,
    })
    .into_response();
    if let Some(settlement) = &charged.settlement {
        attach_settlement(&mut response, settlement);
    }
    Ok(response)
}

/// GET /api/credits/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state
        .billing
        .credits
        .get_balance(&user.user_id, DEFAULT_CREDIT_PERIOD)
        .await?;
    let savings = state.billing.events.credit_savings(&user.user_id).await?;

    Ok(Json(BalanceResponse {
        credits: balance.effective_at(OffsetDateTime::now_utc()),
        period: balance.period,
        expires_at: balance.expires_at,
        total_saved_usd: cents_to_usd(savings.total_saved_cents),
        credits_used_count: savings.credits_used_count,
    }))
}

/// GET /api/credits/history?limit=N
pub async fn get_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let events = state
        .billing
        .events
        .list_for_user(&user.user_id, query.limit)
        .await?;
    Ok(Json(HistoryResponse { events }))
}
