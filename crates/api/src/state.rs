//! Application state

use habitpay_billing::BillingService;
use reqwest::Client;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{
    auth::{AuthState, IdentityVerifier, SupabaseVerifier, TestIdentityProvider},
    config::Config,
    insights::{InsightService, OpenAiGenerator, TemplateGenerator, TextGenerator},
    payment::MicropaymentClient,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub billing: Arc<BillingService>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub payments: MicropaymentClient,
    pub insights: Arc<InsightService>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let http_client = Client::new();

        let generator: Arc<dyn TextGenerator> = if config.openai_api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY not set, report summaries use the built-in template");
            Arc::new(TemplateGenerator)
        } else {
            Arc::new(OpenAiGenerator::new(
                http_client.clone(),
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
                config.openai_model.clone(),
            ))
        };

        Self::with_generator(pool, config, generator)
    }

    /// Build state with an explicit report generator
    pub fn with_generator(
        pool: SqlitePool,
        config: Config,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let http_client = Client::new();

        let verifier: Arc<dyn IdentityVerifier> = match TestIdentityProvider::for_environment(
            config.environment,
            &config.test_identity_tokens,
        ) {
            Some(provider) => {
                tracing::warn!(
                    tokens = config.test_identity_tokens.len(),
                    "Using static test identities; Supabase verification is disabled"
                );
                Arc::new(provider)
            }
            None => {
                if !config.supabase_url.is_empty() && config.supabase_anon_key.is_empty() {
                    tracing::warn!("Supabase URL configured but SUPABASE_ANON_KEY is missing - API token verification will fail");
                }
                Arc::new(SupabaseVerifier::new(
                    config.supabase_url.clone(),
                    config.supabase_anon_key.clone(),
                    &config.supabase_jwt_secret,
                    http_client.clone(),
                ))
            }
        };

        if config.paid_enabled {
            tracing::info!(
                network = %config.x402.network,
                facilitator = %config.x402.facilitator_url,
                "Paid features enabled"
            );
        } else {
            tracing::info!("Paid features disabled via config (PAID_ENABLED=false)");
        }

        let payments = MicropaymentClient::new(http_client, config.x402.facilitator_url.clone());
        let billing = Arc::new(BillingService::new(pool.clone()));
        let insights = Arc::new(InsightService::new(
            pool.clone(),
            generator,
            config.generation_timeout,
        ));

        Self {
            pool,
            config: Arc::new(config),
            billing,
            verifier,
            payments,
            insights,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            verifier: self.verifier.clone(),
            environment: self.config.environment,
        }
    }
}
