//! Paid insight reports over the user's habit data

pub mod input;
pub mod llm;
pub mod report;
pub mod service;
pub mod stats;

pub use input::{ReportInput, ReportKind};
pub use llm::{Generation, GenerationError, InsightPrompt, OpenAiGenerator, TemplateGenerator, TextGenerator};
pub use report::{attach_settlement, serve_report};
pub use service::{BuiltReport, InsightService};

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("Failed to load habit data: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}
