use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod analytics;
mod batch;
mod config;
mod controllers;
mod db;
mod integrations;
mod knowledge;
mod middleware;
mod models;
mod notifications;
mod security;
mod webhooks;

use batch::BatchRunner;
use config::Config;
use db::Database;
use integrations::IntegrationRegistry;
use notifications::NotificationDispatcher;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub integrations: Arc<IntegrationRegistry>,
    pub notifier: Arc<NotificationDispatcher>,
    pub batch_runner: Arc<BatchRunner>,
}

/// Register every API route exactly once
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(controllers::health::config)
        .configure(controllers::auth::config)
        .configure(controllers::profile::config)
        .configure(controllers::admin::config)
        .configure(controllers::conversations::config)
        .configure(controllers::tasks::config)
        .configure(controllers::webhooks::config)
        .configure(controllers::integrations::config)
        .configure(controllers::knowledge::config)
        .configure(controllers::subscriptions::config)
        .configure(controllers::notifications::config)
        .configure(controllers::batch::config)
        .configure(controllers::dashboard::config);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };
    let port = config.port;

    for dir in [&config.upload_dir, &config.export_dir] {
        std::fs::create_dir_all(dir)?;
    }

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("Failed to initialize database: {}", e)))?;
    let db = Arc::new(db);

    match db.purge_expired_sessions() {
        Ok(n) if n > 0 => log::info!("Purged {} expired sessions", n),
        Ok(_) => {}
        Err(e) => log::warn!("Failed to purge expired sessions: {}", e),
    }

    let http = integrations::vendor_http_client();

    log::info!("Initializing integration registry");
    let integrations = Arc::new(integrations::create_default_registry(http.clone()));
    log::info!("Registered {} integration adapters", integrations.all().len());

    log::info!("Initializing notification dispatcher");
    let notifier = Arc::new(NotificationDispatcher::from_config(&config, http));
    log::info!("Notification sinks: {:?}", notifier.sink_names());

    let batch_runner = Arc::new(BatchRunner::new(db.clone(), config.export_dir.clone(), notifier.clone()));

    log::info!("Starting Dana AI backend on port {}", port);

    let max_json = config.max_upload_bytes;
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                integrations: Arc::clone(&integrations),
                notifier: Arc::clone(&notifier),
                batch_runner: Arc::clone(&batch_runner),
            }))
            .app_data(web::JsonConfig::default().limit(max_json))
            .app_data(web::PayloadConfig::new(max_json))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(configure_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
