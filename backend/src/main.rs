mod config;
mod db;
mod diagnosis;
mod error;
mod inference;
mod routes;
mod storage;
mod vision;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::env;

use config::Config;
use db::DiagnosisRepository;
use diagnosis::DiagnosisEngine;
use routes::configure_routes;
use storage::LocalStorage;
use vision::GeminiClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = Config::from_env();

    // Warm the classifier once; a load failure leaves the process in
    // degraded mode rather than refusing to start.
    if inference::classifier::get_or_load(&config.model_path).is_none() {
        log::warn!(
            "classifier weights unavailable at {}; local predictions degrade to neutral",
            config.model_path
        );
    }

    let vision = config.gemini_api_key.clone().map(GeminiClient::new);
    if vision.is_none() {
        log::warn!("GEMINI_API_KEY not configured; vision analysis disabled, using local classifier only");
    }

    let engine = DiagnosisEngine::new(
        vision,
        config.model_path.clone(),
        config.hallucination_rejects.clone(),
    );

    let storage = LocalStorage::new(&config.upload_dir).map_err(std::io::Error::other)?;
    let repository =
        DiagnosisRepository::open(&config.history_path).map_err(std::io::Error::other)?;

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    let upload_dir = config.upload_dir.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .allowed_header("x-user-id")
                    .max_age(3600),
            )
            .app_data(web::Data::new(engine.clone()))
            .app_data(web::Data::new(storage.clone()))
            .app_data(web::Data::new(repository.clone()))
            .configure(|cfg| configure_routes(cfg, upload_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
