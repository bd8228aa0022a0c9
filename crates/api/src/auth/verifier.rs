//! Identity verification seam

use async_trait::async_trait;

use super::middleware::AuthError;

/// A user identity proven by a bearer credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub user_id: String,
    pub email: Option<String>,
}

/// Turns a bearer credential into a user id.
///
/// Implementations must reject anything they cannot positively verify.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, AuthError>;

    fn name(&self) -> &'static str;
}
