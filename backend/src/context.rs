use actix_web::web;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;

use crate::analysis::history::ScanHistory;
use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::auth::cognito_service::CognitoService;
use crate::auth::jwt::JwtService;
use crate::auth::middleware::AuthMiddleware;
use crate::auth::oauth_state::OAuthStateStore;
use crate::classifier::client::HttpClassifier;
use crate::classifier::{Classifier, ClassifierError};
use crate::config::{AppConfig, StoreBackend};
use crate::db::dynamodb_repository::DynamoDbRepository;
use crate::db::memory_repository::MemoryRepository;
use crate::db::{ReportStore, UserStore};
use crate::narrative::gemini::GeminiClient;
use crate::narrative::{NarrativeError, NarrativeGenerator};
use crate::routes::configure_routes;
use crate::storage::image_storage::ImageStorage;
use crate::storage::s3_service::S3Service;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Narrative(#[from] NarrativeError),
}

/// Every long-lived service of the application, built once at start-up and
/// handed to request handlers through `web::Data`.
#[derive(Clone)]
pub struct AppContext {
    config: AppConfig,
    jwt_service: JwtService,
    cognito_service: Option<CognitoService>,
    oauth_states: OAuthStateStore,
    users: Arc<dyn UserStore>,
    orchestrator: AnalysisOrchestrator,
    history: ScanHistory,
}

impl AppContext {
    pub async fn initialize(config: AppConfig) -> Result<Self, ContextError> {
        let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(&config.classifier)?);
        let narrator: Arc<dyn NarrativeGenerator> = Arc::new(GeminiClient::new(&config.llm)?);
        if config.llm.api_key.is_none() {
            log::warn!("GEMINI_API_KEY is not set; reports will use the fallback narrative");
        }

        let needs_aws = config.storage.backend == StoreBackend::DynamoDb
            || config.storage.s3_bucket.is_some()
            || config.cognito_configured();
        let aws_config: Option<SdkConfig> = if needs_aws {
            Some(aws_config::defaults(BehaviorVersion::latest()).load().await)
        } else {
            None
        };

        let (reports, users): (Arc<dyn ReportStore>, Arc<dyn UserStore>) =
            match (config.storage.backend, aws_config.as_ref()) {
                (StoreBackend::DynamoDb, Some(aws)) => {
                    let repo = Arc::new(DynamoDbRepository::new(
                        DynamoDbClient::new(aws),
                        config.storage.users_table.clone(),
                        config.storage.reports_table.clone(),
                    ));
                    repo.verify_tables().await;
                    let reports: Arc<dyn ReportStore> = repo.clone();
                    let users: Arc<dyn UserStore> = repo;
                    (reports, users)
                }
                _ => {
                    log::warn!("Using the in-memory store; data is lost on restart");
                    let repo = Arc::new(MemoryRepository::new());
                    let reports: Arc<dyn ReportStore> = repo.clone();
                    let users: Arc<dyn UserStore> = repo;
                    (reports, users)
                }
            };

        let images = match (&config.storage.s3_bucket, aws_config.as_ref()) {
            (Some(bucket), Some(aws)) => {
                log::info!("Storing report images in s3://{}", bucket);
                ImageStorage::S3(S3Service::new(S3Client::new(aws), bucket.clone()))
            }
            _ => {
                log::info!("Embedding report images inline");
                ImageStorage::Inline
            }
        };

        let cognito_service = match (&config.auth.cognito, aws_config.as_ref()) {
            (Some(cognito), Some(aws)) if config.cognito_configured() => {
                log::info!("Cognito configuration detected");
                Some(CognitoService::new(CognitoClient::new(aws), cognito))
            }
            _ => {
                log::warn!(
                    "Cognito is not fully configured. Please run AWS setup commands and update .env file."
                );
                None
            }
        };

        Ok(Self::from_parts(
            config,
            reports,
            users,
            classifier,
            narrator,
            images,
            cognito_service,
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        reports: Arc<dyn ReportStore>,
        users: Arc<dyn UserStore>,
        classifier: Arc<dyn Classifier>,
        narrator: Arc<dyn NarrativeGenerator>,
        images: ImageStorage,
        cognito_service: Option<CognitoService>,
    ) -> Self {
        let jwt_service = JwtService::new(&config.auth.jwt_secret, config.auth.session_ttl_hours);
        let orchestrator =
            AnalysisOrchestrator::new(classifier, narrator, reports.clone(), images.clone());
        let history = ScanHistory::new(reports, images);

        Self {
            config,
            jwt_service,
            cognito_service,
            oauth_states: OAuthStateStore::new(),
            users,
            orchestrator,
            history,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn jwt_service(&self) -> &JwtService {
        &self.jwt_service
    }

    pub fn auth_middleware(&self) -> AuthMiddleware {
        AuthMiddleware::new(self.jwt_service.clone())
    }

    /// Registers shared state and routes on one worker's app.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.config.server.clone()))
            .app_data(web::Data::new(self.jwt_service.clone()))
            .app_data(web::Data::new(self.oauth_states.clone()))
            .app_data(web::Data::from(self.users.clone()))
            .app_data(web::Data::new(self.orchestrator.clone()))
            .app_data(web::Data::new(self.history.clone()));

        if let Some(cognito) = &self.cognito_service {
            cfg.app_data(web::Data::new(cognito.clone()));
        }

        configure_routes(cfg, self.config.server.static_dir.clone());
    }

    pub fn shutdown(&self) {
        let pending = self.oauth_states.pending();
        self.oauth_states.clear();
        log::info!("Shut down; discarded {} pending sign-in states", pending);
    }
}
