use actix_cors::Cors;
use actix_web::{App, HttpServer};
use cropscan_backend::config::AppConfig;
use cropscan_backend::context::AppContext;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let context = AppContext::initialize(config).await.map_err(|e| {
        log::error!("Failed to initialize services: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let server_config = context.config().server.clone();
    log::info!("Classifier: {}", context.config().classifier.base_url);
    log::info!("Login: {}/auth/login", server_config.base_url);
    if let Some(dir) = &server_config.static_dir {
        log::info!("Serving UI bundle from {}", dir.display());
    }

    let bind_address = format!("0.0.0.0:{}", server_config.port);
    log::info!("Starting server on {}", bind_address);

    let app_context = context.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(app_context.auth_middleware())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .configure(|cfg| app_context.configure(cfg))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    context.shutdown();
    Ok(())
}
