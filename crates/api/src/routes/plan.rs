//! Plan routes

use axum::{
    extract::{Extension, State},
    Json,
};
use habitpay_billing::UserPlan;
use habitpay_shared::PlanTier;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const DEFAULT_PLAN_DAYS: i64 = 30;
const MAX_PLAN_DAYS: i64 = 366;

#[derive(Debug, Deserialize)]
pub struct SetPlanRequest {
    pub plan: String,
    pub days: Option<i64>,
}

/// GET /api/plan
pub async fn get_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserPlan>> {
    Ok(Json(state.billing.plans.get(&user.user_id).await?))
}

/// POST /api/plan - activation stub for development; refused in production
pub async fn set_plan(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SetPlanRequest>,
) -> ApiResult<Json<UserPlan>> {
    if state.config.environment.is_production() {
        tracing::warn!(user_id = %user.user_id, "Plan activation stub called in production");
        return Err(ApiError::Forbidden);
    }

    let plan = req
        .plan
        .parse::<PlanTier>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if !plan.is_paid() {
        return Err(ApiError::Validation("plan must be pro or premium".to_string()));
    }

    let days = req.days.unwrap_or(DEFAULT_PLAN_DAYS);
    if !(1..=MAX_PLAN_DAYS).contains(&days) {
        return Err(ApiError::Validation(format!(
            "days must be between 1 and {MAX_PLAN_DAYS}"
        )));
    }

    let now = OffsetDateTime::now_utc();
    let updated = state
        .billing
        .plans
        .set_at(&user.user_id, plan, Some(now + Duration::days(days)), now)
        .await?;

    tracing::info!(user_id = %user.user_id, plan = %plan, days, "Plan activated");
    Ok(Json(updated))
}
