//! Local verification of Supabase-issued access tokens (HS256)

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Audience Supabase stamps on signed-in user tokens
const SUPABASE_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    pub sub: String,
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseJwt {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SupabaseJwt {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<SupabaseClaims, jsonwebtoken::errors::Error> {
        decode::<SupabaseClaims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-supabase-jwt-secret";

    fn token(secret: &str, aud: &str, exp_offset: i64) -> String {
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + exp_offset;
        encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "user-123", "email": "a@example.com", "aud": aud, "exp": exp, "role": "authenticated"}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let claims = SupabaseJwt::new(SECRET)
            .verify(&token(SECRET, "authenticated", 3600))
            .unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.email.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_rejects_wrong_secret_audience_and_expiry() {
        let jwt = SupabaseJwt::new(SECRET);
        assert!(jwt.verify(&token("other-secret", "authenticated", 3600)).is_err());
        assert!(jwt.verify(&token(SECRET, "anon", 3600)).is_err());
        assert!(jwt.verify(&token(SECRET, "authenticated", -3600)).is_err());
        assert!(jwt.verify("not-a-jwt").is_err());
    }
}
