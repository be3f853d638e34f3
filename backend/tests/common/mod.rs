#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use cropscan_backend::analysis::upload::ImageUpload;
use cropscan_backend::auth::models::AuthUser;
use cropscan_backend::classifier::{Classifier, ClassifierError};
use cropscan_backend::config::{AppConfig, StoreBackend};
use cropscan_backend::context::AppContext;
use cropscan_backend::db::memory_repository::MemoryRepository;
use cropscan_backend::narrative::{NarrativeError, NarrativeGenerator};
use cropscan_backend::storage::image_storage::ImageStorage;
use shared::{ImageReference, ModelChoice, Prediction, ScanReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
pub const BOUNDARY: &str = "cropscan-test-boundary";

pub struct FakeClassifier {
    pub outcome: Result<Prediction, u16>,
    pub calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn predicting(label: &str, confidence: f64) -> Self {
        Self {
            outcome: Ok(Prediction {
                class_index: 7,
                label: label.to_string(),
                confidence,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            outcome: Err(status),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(
        &self,
        _image: &ImageUpload,
        _model: ModelChoice,
    ) -> Result<Prediction, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|status| ClassifierError::Status {
            status,
            body: "Internal Server Error".to_string(),
        })
    }
}

pub struct FakeNarrator(pub Option<String>);

#[async_trait]
impl NarrativeGenerator for FakeNarrator {
    async fn generate(&self, _prompt: &str) -> Result<String, NarrativeError> {
        self.0.clone().ok_or(NarrativeError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-secret".to_string();
    config.storage.backend = StoreBackend::Memory;
    config
}

pub fn context(
    store: Arc<MemoryRepository>,
    classifier: FakeClassifier,
    narrator: FakeNarrator,
) -> AppContext {
    context_with_classifier(store, Arc::new(classifier), narrator)
}

pub fn context_with_classifier(
    store: Arc<MemoryRepository>,
    classifier: Arc<FakeClassifier>,
    narrator: FakeNarrator,
) -> AppContext {
    AppContext::from_parts(
        test_config(),
        store.clone(),
        store,
        classifier,
        Arc::new(narrator),
        ImageStorage::Inline,
        None,
    )
}

pub fn token_for(ctx: &AppContext, user_id: Uuid) -> String {
    ctx.jwt_service()
        .generate_token(&AuthUser {
            id: user_id,
            email: format!("{}@example.com", user_id.simple()),
            name: "Grower".to_string(),
            picture_url: None,
        })
        .unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

pub fn multipart_body(field: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"leaf.png\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> (&'static str, String) {
    (
        "Content-Type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    )
}

pub fn stored_report(owner_id: Uuid, label: &str, minutes_ago: i64) -> ScanReport {
    ScanReport {
        id: Uuid::new_v4(),
        owner_id,
        image_reference: ImageReference::Inline("data:image/png;base64,AA".to_string()),
        model_used: ModelChoice::Fast,
        prediction: Prediction {
            class_index: 1,
            label: label.to_string(),
            confidence: 0.7,
        },
        narrative_report: Some("<p>advice</p>".to_string()),
        created_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}
