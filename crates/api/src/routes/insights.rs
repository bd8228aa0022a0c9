//! Paid insight report routes

use axum::{
    body::Bytes,
    extract::{Extension, State},
    response::Response,
};
use time::OffsetDateTime;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    insights::{serve_report, ReportInput, ReportKind},
    payment::PaidAccess,
    state::AppState,
};

/// POST /api/paid/insight/habit - `{date, highAccuracy}`
pub async fn habit_insight(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(access): Extension<PaidAccess>,
    body: Bytes,
) -> ApiResult<Response> {
    serve(&state, &user, &access, ReportKind::Habit, &body).await
}

/// POST /api/paid/insight/weekly - `{week_start, highAccuracy}`
pub async fn weekly_insight(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(access): Extension<PaidAccess>,
    body: Bytes,
) -> ApiResult<Response> {
    serve(&state, &user, &access, ReportKind::Weekly, &body).await
}

/// POST /api/paid/insight/monthly - `{month: "YYYY-MM", highAccuracy}`
pub async fn monthly_insight(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(access): Extension<PaidAccess>,
    body: Bytes,
) -> ApiResult<Response> {
    serve(&state, &user, &access, ReportKind::Monthly, &body).await
}

async fn serve(
    state: &AppState,
    user: &AuthUser,
    access: &PaidAccess,
    kind: ReportKind,
    body: &[u8],
) -> ApiResult<Response> {
    let today = OffsetDateTime::now_utc().date();
    let input = ReportInput::parse(kind, body, today);
    serve_report(state, user, access, input).await
}
