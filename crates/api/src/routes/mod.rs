//! API routes

pub mod admin;
pub mod credits;
pub mod insights;
pub mod plan;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use habitpay_billing::NewPaidEvent;
use habitpay_shared::paid_resource;
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    auth::{require_auth, AuthUser},
    error::{error_detail_middleware, ApiError, ApiResult},
    insights::attach_settlement,
    payment::{charge, require_payment, PaidAccess},
    security::security_headers_middleware,
    state::AppState,
};

/// Build the application router.
///
/// Every `/api` route requires authentication; `/api/paid` routes also pass
/// through the payment gate.
pub fn create_router(state: AppState) -> Router {
    let paid = Router::new()
        .route("/api/paid/insight/habit", post(insights::habit_insight))
        .route("/api/paid/insight/weekly", post(insights::weekly_insight))
        .route("/api/paid/insight/monthly", post(insights::monthly_insight))
        .route("/api/paid/credits/{pack}", post(credits::purchase_pack))
        .route("/api/paid/ping", get(paid_ping))
        .route_layer(from_fn_with_state(state.clone(), require_payment));

    let api = Router::new()
        .route("/api/credits/balance", get(credits::get_balance))
        .route("/api/credits/history", get(credits::get_history))
        .route("/api/plan", get(plan::get_plan).post(plan::set_plan))
        .route("/api/admin/invariants", get(admin::run_invariant_checks))
        .merge(paid)
        .route_layer(from_fn_with_state(state.auth_state(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(from_fn_with_state(
            state.config.environment,
            error_detail_middleware,
        ))
        .layer(from_fn(security_headers_middleware))
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

/// GET /health - liveness plus a store round trip
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Health check database ping failed");
            "fail"
        }
    };

    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if database == "ok" { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            database,
        }),
    )
}

/// GET /api/paid/ping - gated liveness probe of the paid prefix
async fn paid_ping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(access): Extension<PaidAccess>,
) -> ApiResult<Response> {
    let resource = paid_resource("/api/paid/ping").ok_or(ApiError::NotFound)?;
    let charged = charge(&state, &user, resource, &access).await?;

    let mut meta = json!({ "paid_with": charged.paid_with });
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
                used_credit: charged.used_credit,
                meta,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    let mut response = Json(json!({ "ok": true, "paidWith": charged.paid_with })).into_response();
    if let Some(settlement) = &charged.settlement {
        attach_settlement(&mut response, settlement);
    }
    Ok(response)
}
