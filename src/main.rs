// src/main.rs
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use log::{info, warn};
use mongodb::Client;
use std::sync::Arc;
use tokio::sync::RwLock;

use stock_alert_bot::alert_event_logger::AlertEventLogger;
use stock_alert_bot::config::AppConfig;
use stock_alert_bot::handlers::{self, AppState, ServiceStatus};
use stock_alert_bot::price_provider::YahooDayLowProvider;
use stock_alert_bot::repository::{MongoTradeRepository, MongoZoneRepository};
use stock_alert_bot::runner::AlertRunner;
use stock_alert_bot::scheduler::run_alert_service;
use stock_alert_bot::telegram_notifier::TelegramNotifier;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env();
    info!(
        "🚀 Stock Alert Bot starting (db={}, interval={}s)",
        config.database, config.check_interval_secs
    );

    let client = Client::with_uri_str(&config.mongo_uri)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let db = client.database(&config.database);

    let zones = Arc::new(MongoZoneRepository::new(&db, &config.zone_collection));
    let trades = Arc::new(MongoTradeRepository::new(&db, &config.trade_collection));

    let provider = Arc::new(
        YahooDayLowProvider::new(config.chart_api_base.clone(), config.fetch_concurrency)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?,
    );

    let notifier = Arc::new(TelegramNotifier::new(
        config.telegram_token.clone(),
        config.telegram_chat_id.clone(),
    ));

    let event_logger = if config.alert_log_enabled {
        match AlertEventLogger::new() {
            Ok(logger) => Some(logger),
            Err(e) => {
                warn!("📝 Alert log disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let runner = Arc::new(AlertRunner::new(
        zones,
        trades,
        provider,
        notifier,
        config.runner_config(),
        event_logger,
    ));

    let status = Arc::new(RwLock::new(ServiceStatus::new()));

    tokio::spawn(run_alert_service(
        Arc::clone(&runner),
        Arc::clone(&status),
        config.check_interval_secs,
    ));

    let bind_addr = format!("{}:{}", config.http_host, config.http_port);
    println!("🔗 Status endpoints:");
    println!("   GET http://{}/health", bind_addr);
    println!("   GET http://{}/status", bind_addr);
    println!("   GET http://{}/alerts/recent", bind_addr);

    let app_state = web::Data::new(AppState {
        status: Arc::clone(&status),
    });

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(app_state.clone())
            .route("/health", web::get().to(handlers::health_check))
            .route("/status", web::get().to(handlers::status))
            .route("/alerts/recent", web::get().to(handlers::recent_alerts))
    })
    .bind(&bind_addr)?
    .run()
    .await
}
