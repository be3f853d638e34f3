use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use shared::ReportResponse;

use crate::analysis::orchestrator::AnalysisError;
use crate::analysis::upload::UploadError;
use crate::db::RepositoryError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct UnsavedReportResponse<'a> {
    error: String,
    unsaved_report: &'a ReportResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Analysis(AnalysisError::UnsupportedImage(err))
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::InvalidData(_) | RepositoryError::PartialDelete { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Analysis(err) => match err {
                AnalysisError::Unauthenticated => StatusCode::UNAUTHORIZED,
                AnalysisError::UnsupportedImage(UploadError::TooLarge(_)) => {
                    StatusCode::PAYLOAD_TOO_LARGE
                }
                AnalysisError::UnsupportedImage(UploadError::UnsupportedType(_)) => {
                    StatusCode::UNSUPPORTED_MEDIA_TYPE
                }
                AnalysisError::UnsupportedImage(_) => StatusCode::BAD_REQUEST,
                AnalysisError::ClassificationFailed { .. } => StatusCode::BAD_GATEWAY,
                AnalysisError::PersistenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                AnalysisError::HistoryUnavailable(repo) => repository_status(repo),
            },
            AppError::Repository(err) => repository_status(err),
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status, self);
        }

        let mut builder = HttpResponse::build(status);
        match self {
            AppError::Analysis(AnalysisError::PersistenceFailed { report, .. }) => {
                let unsaved = ReportResponse::from(report.as_ref().clone());
                builder.json(UnsavedReportResponse {
                    error: self.to_string(),
                    unsaved_report: &unsaved,
                })
            }
            _ => builder.json(ErrorResponse {
                error: self.to_string(),
            }),
        }
    }
}
