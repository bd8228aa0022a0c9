//! Static token identities for development and test profiles
//!
//! Never constructed in production; the server wires either this provider
//! or the Supabase verifier, not both.

use async_trait::async_trait;
use subtle::ConstantTimeEq;

use super::middleware::AuthError;
use super::verifier::{IdentityVerifier, VerifiedUser};
use crate::config::Environment;

pub struct TestIdentityProvider {
    tokens: Vec<(String, String)>,
}

impl TestIdentityProvider {
    /// `None` in production or when no tokens are configured
    pub fn for_environment(environment: Environment, tokens: &[(String, String)]) -> Option<Self> {
        if environment.is_production() || tokens.is_empty() {
            return None;
        }
        Some(Self {
            tokens: tokens.to_vec(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for TestIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, AuthError> {
        // Compare against every entry so timing does not reveal which matched
        let mut found = None;
        for (candidate, user_id) in &self.tokens {
            if bool::from(candidate.as_bytes().ct_eq(token.as_bytes())) {
                found = Some(user_id);
            }
        }

        found
            .map(|user_id| VerifiedUser {
                user_id: user_id.clone(),
                email: None,
            })
            .ok_or(AuthError::InvalidToken)
    }

    fn name(&self) -> &'static str {
        "test-identity"
    }
}
