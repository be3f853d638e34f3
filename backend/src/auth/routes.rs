use actix_web::{HttpResponse, web};

use crate::db::UserStore;
use crate::error::AppError;

use super::middleware::AuthenticatedUser;
use super::models::AuthUser;

pub async fn me(
    user: AuthenticatedUser,
    users: web::Data<dyn UserStore>,
) -> Result<HttpResponse, AppError> {
    let identity = user.0;
    log::info!("/auth/me endpoint called for user ID: {}", identity.user_id);

    match users.get_user_by_id(identity.user_id).await? {
        Some(user_data) => Ok(HttpResponse::Ok().json(AuthUser::from(&user_data))),
        None => {
            // Token is valid but the record is gone, e.g. after account deletion.
            log::warn!("User not found in database for ID: {}", identity.user_id);
            Err(AppError::Unauthenticated)
        }
    }
}
