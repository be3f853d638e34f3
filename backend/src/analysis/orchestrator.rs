use chrono::Utc;
use shared::{ImageReference, ModelChoice, ScanReport};
use std::sync::Arc;
use uuid::Uuid;

use super::upload::{ImageUpload, UploadError};
use crate::auth::models::Identity;
use crate::classifier::{Classifier, ClassifierError};
use crate::db::{ReportStore, RepositoryError};
use crate::narrative::prompts::{diagnosis_prompt, history_prompt};
use crate::narrative::{
    EMPTY_HISTORY_SUMMARY, FALLBACK_NARRATIVE, NarrativeGenerator, SUMMARY_FALLBACK,
};
use crate::storage::image_storage::ImageStorage;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error(transparent)]
    UnsupportedImage(#[from] UploadError),
    #[error("Classification failed: {body}")]
    ClassificationFailed {
        status_code: Option<u16>,
        body: String,
    },
    /// The report was computed but could not be saved.
    #[error("Report could not be saved: {reason}")]
    PersistenceFailed {
        report: Box<ScanReport>,
        reason: String,
    },
    #[error("Scan history unavailable: {0}")]
    HistoryUnavailable(#[from] RepositoryError),
}

impl From<ClassifierError> for AnalysisError {
    fn from(err: ClassifierError) -> Self {
        let status_code = err.status_code();
        let body = match err {
            ClassifierError::Status { body, .. } => body,
            other => other.to_string(),
        };
        AnalysisError::ClassificationFailed { status_code, body }
    }
}

/// Drives one image through classification, narrative generation and
/// persistence. Stages run strictly in sequence and none is retried.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    classifier: Arc<dyn Classifier>,
    narrator: Arc<dyn NarrativeGenerator>,
    reports: Arc<dyn ReportStore>,
    images: ImageStorage,
}

impl AnalysisOrchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        narrator: Arc<dyn NarrativeGenerator>,
        reports: Arc<dyn ReportStore>,
        images: ImageStorage,
    ) -> Self {
        Self {
            classifier,
            narrator,
            reports,
            images,
        }
    }

    pub async fn run_analysis(
        &self,
        image: &ImageUpload,
        model: ModelChoice,
        caller: &Identity,
    ) -> Result<ScanReport, AnalysisError> {
        if !caller.is_active_at(Utc::now()) {
            return Err(AnalysisError::Unauthenticated);
        }

        log::info!(
            "Classifying {} ({}) for user {} with {} model",
            image.file_name(),
            image.kind().mime_type(),
            caller.user_id,
            model
        );
        let prediction = self.classifier.classify(image, model).await.map_err(|e| {
            log::error!("Classifier call failed for user {}: {}", caller.user_id, e);
            AnalysisError::from(e)
        })?;
        log::info!(
            "Classifier predicted {} ({:.1}%)",
            prediction.label,
            prediction.confidence_percent()
        );

        let prompt = diagnosis_prompt(model, &prediction);
        let narrative = match self.narrator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Narrative generation failed, using fallback: {}", e);
                FALLBACK_NARRATIVE.to_string()
            }
        };

        let report_id = Uuid::new_v4();
        let (image_reference, upload_failure) =
            match self.images.store(caller.user_id, report_id, image).await {
                Ok(reference) => (reference, None),
                Err(e) => {
                    log::error!("Image upload failed for report {}: {}", report_id, e);
                    (ImageReference::Inline(image.data_uri()), Some(e.to_string()))
                }
            };

        let report = ScanReport {
            id: report_id,
            owner_id: caller.user_id,
            image_reference,
            model_used: model,
            prediction,
            narrative_report: Some(narrative),
            created_at: Utc::now(),
        };

        if let Some(reason) = upload_failure {
            return Err(AnalysisError::PersistenceFailed {
                report: Box::new(report),
                reason,
            });
        }

        match self.reports.save(&report).await {
            Ok(_) => {
                log::info!("Saved report {} for user {}", report.id, report.owner_id);
                Ok(report)
            }
            Err(e) => {
                log::error!("Failed to save report {}: {}", report.id, e);
                if let Err(cleanup) = self.images.discard(caller.user_id, report.id, image).await {
                    log::warn!("Left orphaned image for report {}: {}", report.id, cleanup);
                }
                Err(AnalysisError::PersistenceFailed {
                    report: Box::new(report),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// HTML summary of the caller's whole history.
    pub async fn summarize_history(&self, caller: &Identity) -> Result<String, AnalysisError> {
        if !caller.is_active_at(Utc::now()) {
            return Err(AnalysisError::Unauthenticated);
        }

        let reports = self.reports.list_by_owner(caller.user_id, None).await?;
        if reports.is_empty() {
            return Ok(EMPTY_HISTORY_SUMMARY.to_string());
        }

        match self.narrator.generate(&history_prompt(&reports)).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                log::warn!("History summary generation failed: {}", e);
                Ok(SUMMARY_FALLBACK.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::upload::fixtures;
    use crate::db::memory_repository::MemoryRepository;
    use crate::narrative::NarrativeError;
    use async_trait::async_trait;
    use chrono::Duration;
    use shared::Prediction;
    use std::sync::Mutex;

    struct StubClassifier(Result<Prediction, u16>);

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(
            &self,
            _image: &ImageUpload,
            _model: ModelChoice,
        ) -> Result<Prediction, ClassifierError> {
            self.0.clone().map_err(|status| ClassifierError::Status {
                status,
                body: "model crashed".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNarrator {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NarrativeGenerator for RecordingNarrator {
        async fn generate(&self, prompt: &str) -> Result<String, NarrativeError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or(NarrativeError::EmptyResponse)
        }
    }

    struct DownStore;

    #[async_trait]
    impl ReportStore for DownStore {
        async fn save(&self, _report: &ScanReport) -> Result<Uuid, RepositoryError> {
            Err(RepositoryError::StoreUnavailable("connection refused".into()))
        }

        async fn list_by_owner(
            &self,
            _owner_id: Uuid,
            _limit: Option<usize>,
        ) -> Result<Vec<ScanReport>, RepositoryError> {
            Err(RepositoryError::StoreUnavailable("connection refused".into()))
        }

        async fn delete_all_by_owner(&self, _owner_id: Uuid) -> Result<usize, RepositoryError> {
            Err(RepositoryError::StoreUnavailable("connection refused".into()))
        }
    }

    fn late_blight() -> Prediction {
        Prediction {
            class_index: 30,
            label: "Tomato___Late_blight".into(),
            confidence: 0.93,
        }
    }

    fn caller() -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "grower@example.com".into(),
            name: "Grower".into(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn png() -> ImageUpload {
        ImageUpload::new(fixtures::PNG.to_vec(), "image/png", Some("leaf.png".into())).unwrap()
    }

    fn orchestrator(
        classifier: StubClassifier,
        narrator: Arc<RecordingNarrator>,
        store: Arc<dyn ReportStore>,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(classifier), narrator, store, ImageStorage::Inline)
    }

    #[actix_web::test]
    async fn successful_run_persists_prediction_and_narrative() {
        let store = Arc::new(MemoryRepository::new());
        let narrator = Arc::new(RecordingNarrator {
            reply: Some("<p>Remove infected leaves.</p>".into()),
            ..Default::default()
        });
        let orchestrator = orchestrator(StubClassifier(Ok(late_blight())), narrator.clone(), store.clone());
        let who = caller();

        let report = orchestrator
            .run_analysis(&png(), ModelChoice::Accurate, &who)
            .await
            .unwrap();

        assert_eq!(report.prediction.label, "Tomato___Late_blight");
        assert_eq!(report.prediction.confidence, 0.93);
        assert_eq!(report.owner_id, who.user_id);
        assert_eq!(report.model_used, ModelChoice::Accurate);
        assert!(report.image_reference.is_inline());

        let prompts = narrator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Tomato___Late_blight"));
        assert!(prompts[0].contains("93.0%"));

        let saved = store.list_by_owner(who.user_id, None).await.unwrap();
        assert_eq!(saved, vec![report]);
    }

    #[actix_web::test]
    async fn classifier_failure_aborts_without_persisting() {
        let store = Arc::new(MemoryRepository::new());
        let narrator = Arc::new(RecordingNarrator::default());
        let orchestrator = orchestrator(StubClassifier(Err(500)), narrator.clone(), store.clone());
        let who = caller();

        let err = orchestrator
            .run_analysis(&png(), ModelChoice::Fast, &who)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::ClassificationFailed { status_code: Some(500), ref body } if body == "model crashed"
        ));
        assert!(narrator.prompts.lock().unwrap().is_empty());
        assert!(store.list_by_owner(who.user_id, None).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn narrative_failure_falls_back_and_still_persists() {
        let store = Arc::new(MemoryRepository::new());
        let orchestrator = orchestrator(
            StubClassifier(Ok(late_blight())),
            Arc::new(RecordingNarrator::default()),
            store.clone(),
        );
        let who = caller();

        let report = orchestrator
            .run_analysis(&png(), ModelChoice::Fast, &who)
            .await
            .unwrap();

        assert_eq!(report.narrative_report.as_deref(), Some(FALLBACK_NARRATIVE));
        assert_eq!(store.list_by_owner(who.user_id, None).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn store_failure_returns_the_unsaved_report() {
        let orchestrator = orchestrator(
            StubClassifier(Ok(late_blight())),
            Arc::new(RecordingNarrator::default()),
            Arc::new(DownStore),
        );
        let who = caller();

        match orchestrator.run_analysis(&png(), ModelChoice::Fast, &who).await {
            Err(AnalysisError::PersistenceFailed { report, reason }) => {
                assert_eq!(report.owner_id, who.user_id);
                assert_eq!(report.prediction.label, "Tomato___Late_blight");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected PersistenceFailed, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn expired_identity_is_refused_before_any_call() {
        let narrator = Arc::new(RecordingNarrator::default());
        let orchestrator = orchestrator(
            StubClassifier(Err(500)),
            narrator.clone(),
            Arc::new(MemoryRepository::new()),
        );
        let mut who = caller();
        who.expires_at = Utc::now() - Duration::seconds(1);

        let err = orchestrator
            .run_analysis(&png(), ModelChoice::Fast, &who)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Unauthenticated));
    }

    #[actix_web::test]
    async fn empty_history_summary_skips_the_llm() {
        let narrator = Arc::new(RecordingNarrator {
            reply: Some("<h3>Summary</h3>".into()),
            ..Default::default()
        });
        let orchestrator = orchestrator(
            StubClassifier(Ok(late_blight())),
            narrator.clone(),
            Arc::new(MemoryRepository::new()),
        );

        let summary = orchestrator.summarize_history(&caller()).await.unwrap();
        assert_eq!(summary, EMPTY_HISTORY_SUMMARY);
        assert!(narrator.prompts.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn history_summary_falls_back_when_the_llm_fails() {
        let store = Arc::new(MemoryRepository::new());
        let orchestrator = orchestrator(
            StubClassifier(Ok(late_blight())),
            Arc::new(RecordingNarrator::default()),
            store,
        );
        let who = caller();
        orchestrator
            .run_analysis(&png(), ModelChoice::Fast, &who)
            .await
            .unwrap();

        let summary = orchestrator.summarize_history(&who).await.unwrap();
        assert_eq!(summary, SUMMARY_FALLBACK);
    }
}
