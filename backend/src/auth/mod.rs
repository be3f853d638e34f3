pub mod cognito_routes;
pub mod cognito_service;
pub mod gate;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod oauth_state;
pub mod routes;
