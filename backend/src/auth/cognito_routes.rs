use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use actix_web::{HttpResponse, web};
use log::{error, info};
use serde_json::json;
use shared::PasswordChange;

use crate::config::ServerConfig;
use crate::db::UserStore;
use crate::db::models::User;
use crate::error::AppError;

use super::cognito_service::{CognitoError, CognitoService};
use super::jwt::JwtService;
use super::middleware::{AuthenticatedUser, SESSION_COOKIE};
use super::models::{AuthCallbackQuery, AuthUser};
use super::oauth_state::OAuthStateStore;

fn require_cognito(
    cognito: Option<web::Data<CognitoService>>,
) -> Result<web::Data<CognitoService>, AppError> {
    cognito.ok_or_else(|| {
        AppError::ServiceUnavailable("Sign-in provider is not configured".to_string())
    })
}

fn session_cookie(token: String, jwt_service: &JwtService, server: &ServerConfig) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(server.base_url.starts_with("https://"))
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(jwt_service.session_ttl().num_seconds()))
        .finish()
}

pub(crate) fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .finish()
}

fn error_redirect(server: &ServerConfig, error: &str, description: &str) -> HttpResponse {
    let location = format!(
        "{}/?error={}&error_description={}",
        server.base_url.trim_end_matches('/'),
        urlencoding::encode(error),
        urlencoding::encode(description)
    );
    HttpResponse::Found()
        .append_header(("Location", location))
        .finish()
}

pub async fn cognito_login_redirect(
    cognito_service: Option<web::Data<CognitoService>>,
    oauth_states: web::Data<OAuthStateStore>,
) -> Result<HttpResponse, AppError> {
    let cognito_service = require_cognito(cognito_service)?;
    let state = oauth_states.issue();

    match cognito_service.get_authorization_url(&state) {
        Ok(auth_url) => {
            info!("Redirecting to Cognito authorization URL with state protection");
            Ok(HttpResponse::Found()
                .append_header(("Location", auth_url))
                .finish())
        }
        Err(e) => {
            oauth_states.consume(&state);
            error!("Failed to generate Cognito authorization URL: {:?}", e);
            Err(AppError::Internal(
                "Failed to initiate authentication".to_string(),
            ))
        }
    }
}

pub async fn cognito_auth_callback(
    query: web::Query<AuthCallbackQuery>,
    cognito_service: Option<web::Data<CognitoService>>,
    oauth_states: web::Data<OAuthStateStore>,
    jwt_service: web::Data<JwtService>,
    users: web::Data<dyn UserStore>,
    server: web::Data<ServerConfig>,
) -> Result<HttpResponse, AppError> {
    let cognito_service = require_cognito(cognito_service)?;

    if let Some(error) = &query.error {
        let error_desc = query
            .error_description
            .as_deref()
            .unwrap_or("Unknown error");
        error!("OAuth error received: {} - {}", error, error_desc);
        return Ok(error_redirect(&server, error, error_desc));
    }

    match &query.state {
        Some(state) if oauth_states.consume(state) => {
            info!("OAuth state validated and consumed");
        }
        Some(_) => {
            error!("Invalid or expired OAuth state");
            return Err(AppError::BadRequest(
                "Invalid authentication state. Possible CSRF attack.".to_string(),
            ));
        }
        None => {
            error!("No state parameter received - possible CSRF attack");
            return Err(AppError::BadRequest(
                "Missing authentication state parameter".to_string(),
            ));
        }
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("No authorization code received".to_string()))?;

    let token_response = match cognito_service.exchange_code_for_tokens(code).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Failed to exchange code for tokens: {:?}", e);
            return Ok(error_redirect(
                &server,
                "token_exchange_failed",
                "Failed to exchange authorization code",
            ));
        }
    };

    let user_info = match cognito_service
        .get_user_info(&token_response.access_token)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            error!("Failed to get user info from Cognito: {:?}", e);
            return Ok(error_redirect(
                &server,
                "userinfo_failed",
                "Failed to get user information",
            ));
        }
    };

    let final_user = match users.get_user_by_cognito_sub(&user_info.sub).await? {
        Some(mut existing) => {
            existing.email = user_info.email.clone();
            existing.picture_url = user_info.picture.clone();
            if user_info.username.is_some() {
                existing.cognito_username = user_info.username.clone();
            }
            existing.cognito_access_token = Some(token_response.access_token);
            if token_response.refresh_token.is_some() {
                existing.cognito_refresh_token = token_response.refresh_token;
            }
            existing.update_last_login();

            users.update_user(&existing).await?;
            info!("Updated existing user: {}", existing.id);
            existing
        }
        None => {
            let mut user = User::new(
                user_info.sub.clone(),
                user_info.email.clone(),
                user_info.display_name(),
            );
            user.cognito_username = user_info.username.clone();
            user.picture_url = user_info.picture.clone();
            user.cognito_access_token = Some(token_response.access_token);
            user.cognito_refresh_token = token_response.refresh_token;

            users.create_user(&user).await?;
            info!("Created new user: {}", user.id);
            user
        }
    };

    let jwt_token = jwt_service
        .generate_token(&AuthUser::from(&final_user))
        .map_err(|e| {
            error!("Failed to generate JWT token: {:?}", e);
            AppError::Internal("Failed to generate authentication token".to_string())
        })?;

    info!("User {} authenticated via Cognito", final_user.id);

    Ok(HttpResponse::Found()
        .cookie(session_cookie(jwt_token, &jwt_service, &server))
        .append_header((
            "Location",
            format!("{}/dashboard", server.base_url.trim_end_matches('/')),
        ))
        .finish())
}

pub async fn cognito_refresh_token(
    cognito_service: Option<web::Data<CognitoService>>,
    jwt_service: web::Data<JwtService>,
    users: web::Data<dyn UserStore>,
    server: web::Data<ServerConfig>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let cognito_service = require_cognito(cognito_service)?;
    let mut db_user = users.get_user(user.0.user_id).await?;

    let refresh_token = db_user
        .cognito_refresh_token
        .clone()
        .ok_or_else(|| AppError::BadRequest("No refresh token available".to_string()))?;

    let token_response = cognito_service
        .refresh_token(&refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to refresh tokens for {}: {:?}", db_user.id, e);
            AppError::Unauthenticated
        })?;

    db_user.cognito_access_token = Some(token_response.access_token);
    if let Some(new_refresh_token) = token_response.refresh_token {
        db_user.cognito_refresh_token = Some(new_refresh_token);
    }
    db_user.updated_at = chrono::Utc::now();
    users.update_user(&db_user).await?;

    let jwt_token = jwt_service
        .refresh_token(&AuthUser::from(&db_user))
        .map_err(|e| {
            error!("Failed to refresh JWT token: {:?}", e);
            AppError::Internal("Failed to refresh authentication token".to_string())
        })?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(jwt_token.clone(), &jwt_service, &server))
        .json(json!({ "token": jwt_token })))
}

pub async fn cognito_logout(
    cognito_service: Option<web::Data<CognitoService>>,
    users: web::Data<dyn UserStore>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    if let Some(mut db_user) = users.get_user_by_id(user.0.user_id).await? {
        if let (Some(cognito), Some(refresh_token)) =
            (cognito_service.as_ref(), db_user.cognito_refresh_token.as_deref())
        {
            if let Err(e) = cognito.revoke_token(refresh_token).await {
                error!("Failed to revoke Cognito tokens: {:?}", e);
            }
        }

        db_user.clear_tokens();
        users.update_user(&db_user).await?;
    }

    info!("User {} logged out", user.0.user_id);

    Ok(HttpResponse::Ok()
        .cookie(expired_session_cookie())
        .json(json!({
            "message": "Logged out successfully"
        })))
}

fn password_change_error(err: CognitoError) -> AppError {
    match err {
        CognitoError::Rejected(reason) => AppError::BadRequest(reason),
        other => {
            error!("Password change failed: {:?}", other);
            AppError::ServiceUnavailable("Password change is unavailable".to_string())
        }
    }
}

pub async fn change_password(
    user: AuthenticatedUser,
    change: web::Json<PasswordChange>,
    cognito_service: Option<web::Data<CognitoService>>,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    change.validate().map_err(AppError::BadRequest)?;
    let cognito_service = require_cognito(cognito_service)?;

    let db_user = users.get_user(user.0.user_id).await?;
    let access_token = db_user
        .cognito_access_token
        .as_deref()
        .ok_or(AppError::Unauthenticated)?;

    cognito_service
        .change_password(access_token, &change.current_password, &change.new_password)
        .await
        .map_err(password_change_error)?;

    info!("User {} changed their password", db_user.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Password updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use actix_web::http::StatusCode;

    #[test]
    fn rejected_password_changes_are_client_errors() {
        let rejected = password_change_error(CognitoError::Rejected(
            "NotAuthorizedException: Incorrect username or password.".to_string(),
        ));
        assert_eq!(rejected.status_code(), StatusCode::BAD_REQUEST);
        assert!(rejected.to_string().contains("Incorrect username or password"));

        let outage = password_change_error(CognitoError::AwsError("throttled".to_string()));
        assert_eq!(outage.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
