pub mod gemini;
pub mod prompts;

use async_trait::async_trait;

pub const FALLBACK_NARRATIVE: &str = "Unable to generate recommendations at this time. Please consult with a local agricultural expert.";

pub const EMPTY_HISTORY_SUMMARY: &str =
    "<p>No scan data available to generate a report. Perform a new scan to get started.</p>";

pub const SUMMARY_FALLBACK: &str = "<p>Could not generate a report at this time.</p>";

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM returned no text")]
    EmptyResponse,
    #[error("LLM API key is not configured")]
    NotConfigured,
}

/// Turns a prompt into free text (HTML fragments in practice).
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, NarrativeError>;
}
