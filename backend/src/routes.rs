use actix_files::{Files, NamedFile};
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use futures::TryStreamExt;
use log::info;
use serde::Deserialize;
use serde_json::json;
use shared::{ModelChoice, ProfileUpdate, ReportResponse};
use std::path::PathBuf;

use crate::analysis::history::ScanHistory;
use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::analysis::upload::{ImageUpload, MAX_IMAGE_BYTES, UploadError};
use crate::auth::cognito_routes::{
    change_password, cognito_auth_callback, cognito_login_redirect, cognito_logout,
    cognito_refresh_token, expired_session_cookie,
};
use crate::auth::cognito_service::CognitoService;
use crate::auth::middleware::AuthenticatedUser;
use crate::auth::routes::me;
use crate::db::UserStore;
use crate::error::AppError;

const VIEW_PATHS: &[&str] = &["/dashboard", "/analyze", "/insights", "/settings"];

/// Directory holding the UI bundle, if one is deployed.
#[derive(Clone)]
pub struct ViewRoot(pub Option<PathBuf>);

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.app_data(web::Data::new(ViewRoot(static_dir.clone())))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::scope("/auth")
                .route("/login", web::get().to(cognito_login_redirect))
                .route("/callback", web::get().to(cognito_auth_callback))
                .route("/me", web::get().to(me))
                .route("/refresh", web::post().to(cognito_refresh_token))
                .route("/logout", web::post().to(cognito_logout)),
        )
        .service(
            web::scope("/api")
                .route("/analyze", web::post().to(analyze))
                .service(
                    web::resource("/reports")
                        .route(web::get().to(list_reports))
                        .route(web::delete().to(delete_reports)),
                )
                .route("/dashboard", web::get().to(dashboard))
                .route("/insights", web::get().to(insights))
                .route("/insights/report", web::get().to(insights_report))
                .service(
                    web::resource("/settings/profile")
                        .route(web::get().to(get_profile))
                        .route(web::put().to(update_profile)),
                )
                .route("/settings/password", web::put().to(change_password))
                .route("/account", web::delete().to(delete_account)),
        );

    for path in VIEW_PATHS {
        cfg.route(path, web::get().to(view));
    }

    if let Some(dir) = static_dir {
        cfg.service(Files::new("/", dir).index_file("index.html"));
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn view(root: web::Data<ViewRoot>) -> Result<NamedFile, AppError> {
    let dir = root
        .0
        .as_ref()
        .ok_or_else(|| AppError::NotFound("No UI bundle is deployed".to_string()))?;
    NamedFile::open_async(dir.join("index.html"))
        .await
        .map_err(|e| AppError::NotFound(format!("index.html unavailable: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub model: Option<ModelChoice>,
}

/// Reads the `file` field, enforcing the size limit while streaming.
async fn read_image_field(payload: &mut Multipart) -> Result<ImageUpload, AppError> {
    let invalid = |e: actix_multipart::MultipartError| {
        AppError::BadRequest(format!("Invalid multipart payload: {}", e))
    };

    while let Some(mut field) = payload.try_next().await.map_err(invalid)? {
        if field.name() != Some("file") {
            while field.try_next().await.map_err(invalid)?.is_some() {}
            continue;
        }

        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(invalid)? {
            if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(UploadError::TooLarge(bytes.len() + chunk.len()).into());
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(ImageUpload::new(bytes, &mime_type, file_name)?);
    }

    Err(AppError::BadRequest("Missing multipart field 'file'".to_string()))
}

async fn analyze(
    user: AuthenticatedUser,
    query: web::Query<AnalyzeQuery>,
    orchestrator: web::Data<AnalysisOrchestrator>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let image = read_image_field(&mut payload).await?;
    let model = query.model.unwrap_or_default();

    let report = orchestrator.run_analysis(&image, model, &user.0).await?;
    Ok(HttpResponse::Created().json(ReportResponse::from(report)))
}

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    pub limit: Option<usize>,
}

async fn list_reports(
    user: AuthenticatedUser,
    query: web::Query<ReportsQuery>,
    history: web::Data<ScanHistory>,
) -> Result<HttpResponse, AppError> {
    if query.limit == Some(0) {
        return Err(AppError::BadRequest("limit must be positive".to_string()));
    }

    let reports: Vec<ReportResponse> = history
        .list(user.0.user_id, query.limit)
        .await?
        .into_iter()
        .map(ReportResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(reports))
}

async fn delete_reports(
    user: AuthenticatedUser,
    history: web::Data<ScanHistory>,
) -> Result<HttpResponse, AppError> {
    let deletion = history.delete_all(user.0.user_id).await?;
    Ok(HttpResponse::Ok().json(deletion))
}

async fn dashboard(
    user: AuthenticatedUser,
    history: web::Data<ScanHistory>,
) -> Result<HttpResponse, AppError> {
    let summary = history.dashboard(user.0.user_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

async fn insights(
    user: AuthenticatedUser,
    history: web::Data<ScanHistory>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(history.insights(user.0.user_id).await?))
}

async fn insights_report(
    user: AuthenticatedUser,
    orchestrator: web::Data<AnalysisOrchestrator>,
) -> Result<HttpResponse, AppError> {
    let report = orchestrator.summarize_history(&user.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "report": report })))
}

async fn get_profile(
    user: AuthenticatedUser,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let db_user = users.get_user(user.0.user_id).await?;
    Ok(HttpResponse::Ok().json(db_user.to_profile()))
}

async fn update_profile(
    user: AuthenticatedUser,
    update: web::Json<ProfileUpdate>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let mut db_user = users.get_user(user.0.user_id).await?;
    db_user.apply_profile_update(&update);
    users.update_user(&db_user).await?;
    info!("Updated profile for user {}", db_user.id);
    Ok(HttpResponse::Ok().json(db_user.to_profile()))
}

/// History, stored images, user record, then the identity-provider account.
/// Steps after the history deletion are best effort.
async fn delete_account(
    user: AuthenticatedUser,
    history: web::Data<ScanHistory>,
    users: web::Data<dyn UserStore>,
    cognito_service: Option<web::Data<CognitoService>>,
) -> Result<HttpResponse, AppError> {
    let user_id = user.0.user_id;
    let deletion = history.delete_all(user_id).await?;

    let mut user_deleted = false;
    let mut cognito_username = None;
    match users.get_user_by_id(user_id).await {
        Ok(Some(db_user)) => {
            cognito_username = db_user.cognito_username.or(Some(db_user.cognito_sub));
            match users.delete_user(user_id).await {
                Ok(()) => user_deleted = true,
                Err(e) => log::error!("Failed to delete user record {}: {}", user_id, e),
            }
        }
        Ok(None) => log::warn!("No user record for {} during account deletion", user_id),
        Err(e) => log::error!("Failed to load user {} for deletion: {}", user_id, e),
    }

    let mut identity_deleted = false;
    if let (Some(cognito), Some(username)) = (cognito_service, cognito_username) {
        match cognito.delete_account(&username).await {
            Ok(()) => identity_deleted = true,
            Err(e) => log::error!("Failed to delete Cognito account for {}: {}", user_id, e),
        }
    }

    info!(
        "Account deletion for {}: {} reports, {} images, record deleted: {}, identity deleted: {}",
        user_id, deletion.reports_deleted, deletion.images_deleted, user_deleted, identity_deleted
    );

    Ok(HttpResponse::Ok()
        .cookie(expired_session_cookie())
        .json(json!({
            "reports_deleted": deletion.reports_deleted,
            "images_deleted": deletion.images_deleted,
            "user_deleted": user_deleted,
            "identity_deleted": identity_deleted,
        })))
}
