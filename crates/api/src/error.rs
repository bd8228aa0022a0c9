//! API error type and its JSON mapping

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use habitpay_billing::BillingError;
use serde_json::{json, Value};

use crate::config::Environment;
use crate::insights::InsightError;
use crate::payment::PaymentInstructions;

pub type ApiResult<T> = Result<T, ApiError>;

/// Largest error body the detail middleware will rewrite
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Payment required")]
    PaymentRequired(Box<PaymentInstructions>),
    #[error("Rate limited, retry in {retry_in_hours} hours")]
    RateLimited { retry_in_hours: i64 },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Payment facilitator error: {0}")]
    PaymentFacilitator(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Server-side detail of a 5xx, exposed only outside production
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".to_string(), None),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), None),
            ApiError::PaymentRequired(instructions) => {
                return (StatusCode::PAYMENT_REQUIRED, Json(instructions.as_ref())).into_response();
            }
            ApiError::RateLimited { retry_in_hours } => {
                let body = Json(json!({
                    "error": "rate_limited",
                    "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "retry_in_hours": retry_in_hours,
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                if let Ok(value) = HeaderValue::from_str(&(retry_in_hours * 3600).to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return response;
            }
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), None),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), None),
            ApiError::PaymentFacilitator(msg) => (
                StatusCode::BAD_GATEWAY,
                "Payment facilitator unavailable".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                "Upstream service error".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Database(msg) | ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(msg.clone()),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Database(e) => ApiError::Database(e.to_string()),
            BillingError::Serialization(e) => ApiError::Internal(e.to_string()),
            BillingError::UnknownPack(_) => ApiError::NotFound,
            BillingError::InvalidAmount(amount) => {
                ApiError::Validation(format!("Invalid amount: {amount}"))
            }
        }
    }
}

impl From<InsightError> for ApiError {
    fn from(e: InsightError) -> Self {
        match e {
            InsightError::Database(e) => ApiError::Database(e.to_string()),
            InsightError::Generation(e) => ApiError::Upstream(e.to_string()),
        }
    }
}

/// Adds the `detail` of a failed request to its JSON body outside production
pub async fn error_detail_middleware(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if environment.is_production() {
        return response;
    }
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let mut json: Value = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
    if let Some(obj) = json.as_object_mut() {
        obj.insert("detail".to_string(), Value::String(detail));
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    let body = serde_json::to_vec(&json).unwrap_or_default();
    Response::from_parts(parts, Body::from(body))
}
