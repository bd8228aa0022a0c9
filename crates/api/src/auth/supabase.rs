//! Supabase identity verifier
//!
//! Tokens signed with the project JWT secret are verified locally. Anything
//! else is checked against the Supabase Auth API, with results cached and
//! concurrent checks of the same token coalesced into one call.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};

use super::jwt::SupabaseJwt;
use super::middleware::AuthError;
use super::verifier::{IdentityVerifier, VerifiedUser};

/// Cache Supabase verification results for 60 seconds
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// Bound on cached tokens; the oldest entry is evicted at capacity
const MAX_CACHE_ENTRIES: usize = 10_000;

type InFlightResult = Result<VerifiedUser, ()>;

/// In-flight verification calls keyed by token
type InFlightRequests = Arc<Mutex<HashMap<String, broadcast::Sender<InFlightResult>>>>;

#[derive(Clone, Debug)]
struct CachedAuth {
    user: VerifiedUser,
    cached_at: Instant,
}

type TokenCache = Arc<RwLock<HashMap<String, CachedAuth>>>;

/// Response from Supabase /auth/v1/user endpoint
#[derive(Debug, Clone, Deserialize)]
struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseVerifier {
    jwt: Option<SupabaseJwt>,
    supabase_url: String,
    supabase_anon_key: String,
    http_client: Client,
    token_cache: TokenCache,
    in_flight_requests: InFlightRequests,
}

impl SupabaseVerifier {
    pub fn new(
        supabase_url: impl Into<String>,
        supabase_anon_key: impl Into<String>,
        jwt_secret: &str,
        http_client: Client,
    ) -> Self {
        let jwt = if jwt_secret.is_empty() {
            tracing::warn!("Supabase JWT validation not configured (missing SUPABASE_JWT_SECRET)");
            None
        } else {
            tracing::info!("Supabase JWT validation enabled");
            Some(SupabaseJwt::new(jwt_secret))
        };

        Self {
            jwt,
            supabase_url: supabase_url.into(),
            supabase_anon_key: supabase_anon_key.into(),
            http_client,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
            in_flight_requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn verify_via_api(&self, token: &str) -> Result<VerifiedUser, AuthError> {
        if self.supabase_anon_key.is_empty() {
            tracing::warn!("Supabase anon key not configured, cannot verify token via API");
            return Err(AuthError::InvalidToken);
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(token) {
                if cached.cached_at.elapsed() < TOKEN_CACHE_TTL {
                    tracing::debug!(user_id = %cached.user.user_id, "Using cached Supabase auth");
                    return Ok(cached.user.clone());
                }
            }
        }

        // Join an in-flight verification of this token if there is one
        let token_key = token.to_string();
        let mut rx_opt = None;
        {
            let mut in_flight = self.in_flight_requests.lock().await;
            if let Some(tx) = in_flight.get(&token_key) {
                rx_opt = Some(tx.subscribe());
                tracing::debug!("Joining in-flight Supabase verification request");
            } else {
                let (tx, _) = broadcast::channel(1);
                in_flight.insert(token_key.clone(), tx);
            }
        }

        if let Some(mut rx) = rx_opt {
            return match rx.recv().await {
                Ok(Ok(user)) => Ok(user),
                Ok(Err(())) | Err(_) => Err(AuthError::InvalidToken),
            };
        }

        let result = self.call_user_endpoint(token).await;

        {
            let mut in_flight = self.in_flight_requests.lock().await;
            if let Some(tx) = in_flight.remove(&token_key) {
                let _ = tx.send(result.clone().map_err(|_| ()));
            }
        }

        if let Ok(ref user) = result {
            let mut cache = self.token_cache.write().await;

            if cache.len() >= MAX_CACHE_ENTRIES {
                if let Some(oldest_key) = cache
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone())
                {
                    cache.remove(&oldest_key);
                }
            }

            cache.insert(
                token_key,
                CachedAuth {
                    user: user.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        result
    }

    async fn call_user_endpoint(&self, token: &str) -> Result<VerifiedUser, AuthError> {
        let url = format!("{}/auth/v1/user", self.supabase_url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.supabase_anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to verify Supabase token");
                AuthError::InvalidToken
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                status = response.status().as_u16(),
                "Supabase token verification failed"
            );
            return Err(AuthError::InvalidToken);
        }

        let user = response
            .json::<SupabaseUserResponse>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(VerifiedUser {
            user_id: user.id,
            email: user.email,
        })
    }

    #[cfg(test)]
    async fn cached_tokens(&self) -> usize {
        self.token_cache.read().await.len()
    }
}

#[async_trait]
impl IdentityVerifier for SupabaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, AuthError> {
        if let Some(jwt) = &self.jwt {
            match jwt.verify(token) {
                Ok(claims) => {
                    return Ok(VerifiedUser {
                        user_id: claims.sub,
                        email: claims.email,
                    })
                }
                Err(e) => tracing::debug!(error = %e, "Local JWT validation failed"),
            }
        }

        if self.supabase_url.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        self.verify_via_api(token).await
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    #[tokio::test]
    async fn test_local_jwt_needs_no_network() {
        let secret = "local-secret";
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 600;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "u-local", "aud": "authenticated", "exp": exp}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let verifier = SupabaseVerifier::new("", "", secret, Client::new());
        let user = verifier.verify(&token).await.unwrap();
        assert_eq!(user.user_id, "u-local");
    }

    #[tokio::test]
    async fn test_api_result_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon")
            .match_header("authorization", "Bearer opaque-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"u-remote","email":"r@example.com"}"#)
            .expect(1)
            .create_async()
            .await;

        let verifier = SupabaseVerifier::new(server.url(), "anon", "", Client::new());
        for _ in 0..3 {
            let user = verifier.verify("opaque-token").await.unwrap();
            assert_eq!(user.user_id, "u-remote");
        }

        mock.assert_async().await;
        assert_eq!(verifier.cached_tokens().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_cached() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .create_async()
            .await;

        let verifier = SupabaseVerifier::new(server.url(), "anon", "", Client::new());
        assert!(matches!(
            verifier.verify("bad").await,
            Err(AuthError::InvalidToken)
        ));
        assert_eq!(verifier.cached_tokens().await, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_verifier_rejects() {
        let verifier = SupabaseVerifier::new("", "", "", Client::new());
        assert!(verifier.verify("anything").await.is_err());
    }
}
