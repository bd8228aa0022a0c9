//! Text generation for report summaries

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::input::ReportKind;
use super::stats::ReportStats;

/// Upper bound on summary length requested from the model
const MAX_SUMMARY_TOKENS: u32 = 300;

/// What the generator is asked to summarize
#[derive(Debug, Clone)]
pub struct InsightPrompt {
    pub kind: ReportKind,
    pub label: String,
    pub high_accuracy: bool,
    pub stats: ReportStats,
}

impl InsightPrompt {
    fn user_message(&self) -> String {
        let items = serde_json::to_string(&self.stats.items).unwrap_or_default();
        format!(
            "{} report for {}. Completed {} of {} habit check-ins ({}%). Details: {}",
            self.kind.title(),
            self.label,
            self.stats.totals.completed,
            self.stats.totals.habits_total,
            self.stats.totals.rate_pct,
            items
        )
    }
}

/// Generated text and the token accounting the backend reported
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Request(String),
    #[error("Generator API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Generator returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &InsightPrompt) -> Result<Generation, GenerationError>;

    fn name(&self) -> &'static str;
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: i64,
    completion_tokens: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetails,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetails {
    message: String,
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &InsightPrompt) -> Result<Generation, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(
                    "You are a concise habit coach. Summarize the user's habit data in at most \
                     three sentences and end with one concrete suggestion.",
                ),
                ChatMessage::user(prompt.user_message()),
            ],
            max_tokens: MAX_SUMMARY_TOKENS,
            temperature: if prompt.high_accuracy { 0.2 } else { 0.7 },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&error_text)
                .map(|body| body.error.message)
                .unwrap_or(error_text);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(format!("Failed to parse response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        tracing::debug!(
            model = %self.model,
            kind = prompt.kind.endpoint(),
            "Generated report summary"
        );

        Ok(Generation {
            text,
            tokens_prompt: completion.usage.as_ref().map(|u| u.prompt_tokens),
            tokens_completion: completion.usage.as_ref().map(|u| u.completion_tokens),
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic summaries, used when no model is configured
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, prompt: &InsightPrompt) -> Result<Generation, GenerationError> {
        let totals = &prompt.stats.totals;
        let advice = if totals.habits_total == 0 {
            "Log a few check-ins to get a meaningful report."
        } else if totals.rate_pct >= 80.0 {
            "Strong consistency, keep the streak going."
        } else if totals.rate_pct >= 50.0 {
            "Solid base. Pick one habit to make non-negotiable."
        } else {
            "Start smaller: focus on a single habit each day."
        };

        Ok(Generation {
            text: format!(
                "{} insight for {}: {} of {} check-ins completed ({}%). highAccuracy={}. {}",
                prompt.kind.title(),
                prompt.label,
                totals.completed,
                totals.habits_total,
                totals.rate_pct,
                if prompt.high_accuracy { "on" } else { "off" },
                advice
            ),
            tokens_prompt: None,
            tokens_completion: None,
        })
    }

    fn name(&self) -> &'static str {
        "template"
    }
}
