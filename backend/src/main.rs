use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use backend::config::AppConfig;
use backend::explanation::{ConditionTable, ExplanationService};
use backend::inference::Models;
use backend::pipeline::ScanPipeline;
use backend::routes::configure_routes;
use backend::storage::{ImageStore, RetentionPolicy, spawn_sweeper};
use backend::translation::ModalityTranslator;
use std::env;
use std::sync::Arc;

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, e);
    std::io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let models = Models::load(&config.models).map_err(|e| startup_error("Model loading failed", e))?;

    let store = ImageStore::new(
        &config.storage.upload_dir,
        &config.storage.results_dir,
        config.storage.max_upload_bytes,
    )
    .map_err(|e| startup_error("Storage setup failed", e))?;

    let conditions = match &config.conditions_file {
        Some(path) => ConditionTable::from_file(path)
            .map_err(|e| startup_error("Condition table loading failed", e))?,
        None => ConditionTable::builtin(),
    };

    spawn_sweeper(store.clone(), RetentionPolicy::from(&config.storage.retention));

    let pipeline = web::Data::new(ScanPipeline::new(
        store,
        Arc::new(models),
        ModalityTranslator::default(),
    ));
    let explainer = web::Data::new(ExplanationService::from_config(&config.llm, conditions));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .app_data(explainer.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await
}
