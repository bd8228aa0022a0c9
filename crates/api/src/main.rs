//! HabitPay API Server
//!
//! Habit tracking API with paid insight reports behind plans, prepaid
//! credits and x402 micropayments.

use std::net::SocketAddr;

use axum::http::{header, HeaderName, HeaderValue, Method};
use habitpay_api::{
    config::LogFormat,
    create_router,
    payment::{X_PAYMENT, X_PAYMENT_RESPONSE},
    AppState, Config,
};
use habitpay_shared::{create_pool, run_migrations};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration before logging so the log format can be chosen
    let config = Config::from_env()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,habitpay_api=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!(
        environment = ?config.environment,
        "Starting HabitPay API Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    tracing::info!(
        allowed_origins = ?allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static(X_PAYMENT),
        ])
        .expose_headers([
            header::CONTENT_TYPE,
            header::RETRY_AFTER,
            HeaderName::from_static(X_PAYMENT_RESPONSE),
        ])
        .allow_credentials(true);

    let addr: SocketAddr = config.bind_address.parse()?;
    let state = AppState::new(pool, config);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
