//! Admin routes
//!
//! Restricted to user ids listed in `ADMIN_UIDS`.

use axum::{
    extract::{Extension, State},
    Json,
};
use habitpay_billing::InvariantCheckSummary;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// GET /api/admin/invariants
pub async fn run_invariant_checks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    if !state.config.is_admin(&user.user_id) {
        tracing::warn!(
            security_event = "admin_access_denied",
            user_id = %user.user_id,
            "Non-admin requested invariant checks"
        );
        return Err(ApiError::Forbidden);
    }

    let summary = state.billing.invariants.run_all_checks().await?;
    if !summary.healthy {
        tracing::error!(
            violations = summary.violations.len(),
            checks_failed = summary.checks_failed,
            "Billing invariant violations detected"
        );
    }
    Ok(Json(summary))
}
