use super::gate::{AuthGate, GateDecision, ProviderEvent, classify_path};
use super::jwt::{JwtError, JwtService};
use super::models::Identity;
use crate::error::AppError;
use actix_web::http::header::{self, Header};
use actix_web::{
    Error, HttpMessage, HttpResponse,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{FromRequest, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use chrono::Utc;
use futures::future::{Ready, err, ok};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "cropscan_session";
pub const SIGN_IN_PATH: &str = "/auth/login";

#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

#[derive(Debug)]
enum AuthError {
    NoToken,
    VerificationFailed(JwtError),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::NoToken => format!("No bearer token or session cookie for path: {}", path),
            AuthError::VerificationFailed(e) => {
                format!("JWT token verification failed for path {}: {}", path, e)
            }
        }
    }
}

fn request_token(req: &ServiceRequest) -> Option<String> {
    if let Ok(auth) = Authorization::<Bearer>::parse(req) {
        return Some(auth.into_scheme().token().to_string());
    }
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn request_identity(req: &ServiceRequest, jwt_service: &JwtService) -> Result<Identity, AuthError> {
    let token = request_token(req).ok_or(AuthError::NoToken)?;
    log::debug!("Found session token, verifying...");
    jwt_service
        .verify_identity(&token)
        .map_err(AuthError::VerificationFailed)
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            let path_str = req.path().to_string();
            let access = classify_path(&path_str);

            let mut gate = AuthGate::new(SIGN_IN_PATH);
            let event = match request_identity(&req, &jwt_service) {
                Ok(identity) => ProviderEvent::SignedIn(identity),
                Err(auth_error) => {
                    if !matches!(auth_error, AuthError::NoToken) {
                        log::warn!("{}", auth_error.log_message(&path_str));
                    }
                    ProviderEvent::SignedOut
                }
            };
            gate.notify(event, Utc::now());

            match gate.decide(access) {
                GateDecision::Allow(identity) => {
                    if let Some(identity) = identity {
                        log::debug!("Authenticated {} for path {}", identity.user_id, path_str);
                        req.extensions_mut().insert(identity);
                    }
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                GateDecision::RedirectToSignIn(location) => {
                    log::info!("Redirecting unauthenticated view {} to sign-in", path_str);
                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Found()
                        .insert_header((header::LOCATION, location))
                        .finish()
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
                GateDecision::Reject | GateDecision::Pending => {
                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(serde_json::json!({"error": "Missing or invalid authorization token"}))
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Extractor for the identity the middleware attached to the request.
pub struct AuthenticatedUser(pub Identity);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<Identity>() {
            Some(identity) => ok(AuthenticatedUser(identity.clone())),
            None => {
                log::warn!(
                    "AuthenticatedUser extractor: no identity in request extensions for path: {}",
                    req.path()
                );
                err(AppError::Unauthenticated.into())
            }
        }
    }
}
