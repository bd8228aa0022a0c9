//! Content-addressed report cache
//!
//! Keyed by (user, endpoint, input hash). Rows are replaced on every
//! generation and only ignored, never purged, once `valid_until` passes.

use habitpay_shared::{from_unix, to_unix};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::error::BillingResult;

/// Stable digest of a normalized report input.
///
/// Object keys are sorted at every depth before hashing, so the same
/// logical input hashes identically whatever order its fields arrived in.
pub fn input_hash(input: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(input, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedReport {
    pub content: Value,
    pub valid_until: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    content: String,
    valid_until: i64,
    created_at: i64,
}

pub struct ReportCache {
    pool: SqlitePool,
}

impl ReportCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn lookup(
        &self,
        user_id: &str,
        endpoint: &str,
        input_hash: &str,
    ) -> BillingResult<Option<CachedReport>> {
        self.lookup_at(user_id, endpoint, input_hash, OffsetDateTime::now_utc())
            .await
    }

    /// A row is a hit only while `now < valid_until`
    pub async fn lookup_at(
        &self,
        user_id: &str,
        endpoint: &str,
        input_hash: &str,
        now: OffsetDateTime,
    ) -> BillingResult<Option<CachedReport>> {
        let row: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT content, valid_until, created_at
            FROM ai_reports
            WHERE user_id = ? AND endpoint = ? AND input_hash = ? AND valid_until > ?
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(input_hash)
        .bind(to_unix(now))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(CachedReport {
                content: serde_json::from_str(&row.content)?,
                valid_until: from_unix(row.valid_until),
                created_at: from_unix(row.created_at),
            })
        })
        .transpose()
    }

    /// Insert or replace the report for this key. Last writer wins.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_at(
        &self,
        user_id: &str,
        endpoint: &str,
        input_hash: &str,
        input: &Value,
        content: &Value,
        valid_until: OffsetDateTime,
        now: OffsetDateTime,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_reports (user_id, endpoint, input_hash, input, content, valid_until, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, endpoint, input_hash) DO UPDATE SET
                input = excluded.input,
                content = excluded.content,
                valid_until = excluded.valid_until,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(input_hash)
        .bind(serde_json::to_string(input)?)
        .bind(serde_json::to_string(content)?)
        .bind(to_unix(valid_until))
        .bind(to_unix(now))
        .bind(to_unix(now))
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %user_id, endpoint = %endpoint, valid_until = %valid_until, "Cached report");
        Ok(())
    }
}
