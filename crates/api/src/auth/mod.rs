//! Authentication: bearer credential to user id

pub mod jwt;
pub mod middleware;
pub mod supabase;
pub mod test_identity;
pub mod verifier;

pub use jwt::{SupabaseClaims, SupabaseJwt};
pub use middleware::{
    extract_bearer_token, require_auth, AuthError, AuthState, AuthUser, IDENTITY_OVERRIDE_HEADER,
};
pub use supabase::SupabaseVerifier;
pub use test_identity::TestIdentityProvider;
pub use verifier::{IdentityVerifier, VerifiedUser};
