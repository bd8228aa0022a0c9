// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! HabitPay API Library
//!
//! HTTP server components: identity, the payment gate, paid insight
//! reports and the credit and plan endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod insights;
pub mod payment;
pub mod routes;
pub mod security;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
