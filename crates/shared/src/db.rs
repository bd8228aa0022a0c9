//! Store pool construction and migrations
//!
//! Every component receives a clone of the pool; there is no process-wide
//! client object.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Default pool size for request handlers
const DEFAULT_POOL_SIZE: u32 = 16;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Create the connection pool used by the API server.
///
/// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    tracing::info!(
        pool_size = DEFAULT_POOL_SIZE,
        "Connected to database"
    );

    Ok(pool)
}

/// Create a private in-memory database with the schema applied.
///
/// An in-memory SQLite database lives inside a single connection, so the
/// pool is pinned to exactly one connection that is never recycled.
pub async fn create_memory_pool() -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply embedded migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations complete");
    Ok(())
}
