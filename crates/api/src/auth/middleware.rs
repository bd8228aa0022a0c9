//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::verifier::IdentityVerifier;
use crate::config::Environment;

/// Client-supplied identity override header; never trusted
pub const IDENTITY_OVERRIDE_HEADER: &str = "x-user-id";

/// Cookie carrying the Supabase access token for browser clients
const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// Authenticated user, inserted into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Auth state shared by the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub environment: Environment,
}

fn extract_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|cookie| cookie.strip_prefix(&format!("{ACCESS_TOKEN_COOKIE}=")))
                .filter(|token| !token.is_empty())
                .map(String::from)
        })
}

/// Extract bearer token from Authorization header or the access token cookie.
/// The header wins when both are present.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    extract_token_from_cookie(headers)
}

/// Middleware that requires a verified identity.
///
/// Order: credential (401), then in production any identity override header
/// is refused (403). The override header never reaches a handler.
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = extract_bearer_token(request.headers()) else {
        tracing::debug!(path = %path, "require_auth: no bearer token (header or cookie)");
        return AuthError::MissingAuth.into_response();
    };

    let verified = match auth_state.verifier.verify(&token).await {
        Ok(verified) => verified,
        Err(e) => {
            tracing::debug!(path = %path, verifier = auth_state.verifier.name(), "require_auth: token rejected");
            return e.into_response();
        }
    };

    if request.headers().contains_key(IDENTITY_OVERRIDE_HEADER) {
        if auth_state.environment.is_production() {
            tracing::warn!(
                security_event = "identity_spoofing_attempt",
                user_id = %verified.user_id,
                path = %path,
                "Rejected request carrying an identity override header"
            );
            return AuthError::SpoofedIdentity.into_response();
        }
        request.headers_mut().remove(IDENTITY_OVERRIDE_HEADER);
    }

    tracing::debug!(path = %path, user_id = %verified.user_id, "require_auth: authenticated");

    request.extensions_mut().insert(AuthUser {
        user_id: verified.user_id,
        email: verified.email,
    });
    next.run(request).await
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Identity override header is not allowed")]
    SpoofedIdentity,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::SpoofedIdentity => (StatusCode::FORBIDDEN, "Forbidden"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
