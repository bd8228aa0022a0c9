//! Insight generation audit log (append-only)

use habitpay_shared::to_unix;
use serde_json::Value;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Maximum characters of generated text kept in an audit row
pub const PREVIEW_MAX_CHARS: usize = 280;

/// One generation to record
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub user_id: &'a str,
    pub endpoint: &'a str,
    pub input: &'a Value,
    /// Generated summary text, truncated on write
    pub output: &'a str,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    pub cost_usd: Option<f64>,
}

/// Truncate on a character boundary
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_MAX_CHARS).collect()
}

pub struct InsightAuditLog {
    pool: SqlitePool,
}

impl InsightAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append_at(&self, entry: &AuditEntry<'_>, now: OffsetDateTime) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO insights_audit
                (id, user_id, endpoint, input, output_preview, tokens_prompt, tokens_completion, cost_usd, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(entry.user_id)
        .bind(entry.endpoint)
        .bind(serde_json::to_string(entry.input)?)
        .bind(preview(entry.output))
        .bind(entry.tokens_prompt)
        .bind(entry.tokens_completion)
        .bind(entry.cost_usd)
        .bind(to_unix(now))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use habitpay_shared::create_memory_pool;
    use serde_json::json;

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let text = "é".repeat(400);
        let p = preview(&text);
        assert_eq!(p.chars().count(), PREVIEW_MAX_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn test_append_truncates_preview() {
        let pool = create_memory_pool().await.unwrap();
        let log = InsightAuditLog::new(pool.clone());
        let long = "x".repeat(1000);

        log.append_at(
            &AuditEntry {
                user_id: "u1",
                endpoint: "insight/habit",
                input: &json!({"date": "2024-01-01"}),
                output: &long,
                tokens_prompt: Some(120),
                tokens_completion: None,
                cost_usd: None,
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();

        let (stored, prompt): (String, Option<i64>) =
            sqlx::query_as("SELECT output_preview, tokens_prompt FROM insights_audit")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(stored.len(), PREVIEW_MAX_CHARS);
        assert_eq!(prompt, Some(120));
    }
}
