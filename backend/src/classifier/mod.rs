pub mod client;

use async_trait::async_trait;
use shared::{ModelChoice, Prediction};

use crate::analysis::upload::ImageUpload;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid classifier URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl ClassifierError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClassifierError::Status { status, .. } => Some(*status),
            ClassifierError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// The external image-classification service.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        image: &ImageUpload,
        model: ModelChoice,
    ) -> Result<Prediction, ClassifierError>;
}
