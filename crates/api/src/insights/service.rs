//! Report content under a generation deadline

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

use super::input::ReportInput;
use super::llm::{InsightPrompt, TextGenerator};
use super::stats::{load_stats, ReportStats};
use super::InsightError;

/// A built report and the accounting for its audit row
#[derive(Debug, Clone)]
pub struct BuiltReport {
    pub content: Value,
    pub summary: String,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    /// Deadline hit; `content` is the fallback draft
    pub draft: bool,
}

pub struct InsightService {
    pool: SqlitePool,
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl InsightService {
    pub fn new(pool: SqlitePool, generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        tracing::info!(
            generator = generator.name(),
            timeout_secs = timeout.as_secs_f64(),
            "Insight generator configured"
        );
        Self {
            pool,
            generator,
            timeout,
        }
    }

    /// Build the report for `input`.
    ///
    /// Missing the deadline is not an error: the result is a draft with
    /// empty statistics. Store and generator failures are.
    pub async fn build(&self, user_id: &str, input: &ReportInput) -> Result<BuiltReport, InsightError> {
        let stats = load_stats(&self.pool, user_id, input).await?;
        let prompt = InsightPrompt {
            kind: input.kind(),
            label: input.label(),
            high_accuracy: input.high_accuracy(),
            stats,
        };

        match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(generation)) => Ok(BuiltReport {
                content: report_content(input, &prompt.stats, &generation.text, false),
                summary: generation.text,
                tokens_prompt: generation.tokens_prompt,
                tokens_completion: generation.tokens_completion,
                draft: false,
            }),
            Ok(Err(e)) => Err(InsightError::Generation(e)),
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    endpoint = input.kind().endpoint(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Generation exceeded its deadline, serving draft"
                );
                let summary = format!(
                    "Fallback: generation exceeded the time budget. Showing a draft report for {}.",
                    input.label()
                );
                Ok(BuiltReport {
                    content: report_content(input, &ReportStats::default(), &summary, true),
                    summary,
                    tokens_prompt: None,
                    tokens_completion: None,
                    draft: true,
                })
            }
        }
    }
}

fn report_content(input: &ReportInput, stats: &ReportStats, summary: &str, draft: bool) -> Value {
    let (field, value) = input.key_field();
    let mut content = Map::new();
    content.insert(field.to_string(), Value::String(value));
    content.insert("highAccuracy".to_string(), Value::Bool(input.high_accuracy()));
    content.insert("totals".to_string(), json!(stats.totals));
    content.insert("items".to_string(), json!(stats.items));
    content.insert("summary".to_string(), Value::String(summary.to_string()));
    if draft {
        content.insert("draft".to_string(), Value::Bool(true));
    }
    Value::Object(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::llm::{Generation, GenerationError, TemplateGenerator};
    use crate::insights::stats::fixtures::{habit, log};
    use async_trait::async_trait;
    use habitpay_shared::create_memory_pool;
    use time::macros::date;

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        async fn generate(&self, _prompt: &InsightPrompt) -> Result<Generation, GenerationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(GenerationError::EmptyResponse)
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &InsightPrompt) -> Result<Generation, GenerationError> {
            Err(GenerationError::Api {
                status: 500,
                message: "boom".into(),
            })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn input() -> ReportInput {
        ReportInput::Habit {
            date: date!(2024 - 01 - 01),
            high_accuracy: true,
        }
    }

    #[tokio::test]
    async fn test_build_from_store() {
        let pool = create_memory_pool().await.unwrap();
        habit(&pool, "u1", "h1", "Meditation", 1).await;
        log(&pool, "u1", "h1", "2024-01-01", true).await;

        let service = InsightService::new(pool, Arc::new(TemplateGenerator), Duration::from_secs(5));
        let report = service.build("u1", &input()).await.unwrap();

        assert!(!report.draft);
        assert_eq!(report.content["date"], "2024-01-01");
        assert_eq!(report.content["highAccuracy"], true);
        assert_eq!(report.content["totals"]["completed"], 1);
        assert_eq!(report.content["items"][0]["title"], "Meditation");
        assert_eq!(report.content["summary"], report.summary.as_str());
        assert!(report.content.get("draft").is_none());
    }

    #[tokio::test]
    async fn test_deadline_yields_draft() {
        let pool = create_memory_pool().await.unwrap();
        habit(&pool, "u1", "h1", "Meditation", 1).await;

        let service = InsightService::new(pool, Arc::new(SlowGenerator), Duration::from_millis(20));
        let report = service.build("u1", &input()).await.unwrap();

        assert!(report.draft);
        assert!(report.summary.starts_with("Fallback:"));
        assert_eq!(report.content["draft"], true);
        assert_eq!(report.content["totals"]["habits_total"], 0);
        assert_eq!(report.content["items"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_generator_failure_is_an_error() {
        let pool = create_memory_pool().await.unwrap();
        let service = InsightService::new(pool, Arc::new(FailingGenerator), Duration::from_secs(5));
        assert!(matches!(
            service.build("u1", &input()).await,
            Err(InsightError::Generation(_))
        ));
    }
}
