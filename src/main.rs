use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod routes;
mod scan;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::scan::{MySqlStore, ScanPipeline, ScanService};
use crate::utils::qr_code_filter;
use crate::utils::student_cache;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.run_migrations)
        .await
        .map_err(|e| {
            error!(error = %e, "Database initialisation failed");
            std::io::Error::other(format!("{e:#}"))
        })?;

    if let Some(admin) = &config.admin {
        auth::handlers::bootstrap_admin(&pool, admin)
            .await
            .map_err(|e| {
                error!(error = %e, "Admin bootstrap failed");
                std::io::Error::other(format!("{e:#}"))
            })?;
    }

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = qr_code_filter::warmup_qr_code_filter(&pool_for_filter_warmup, 500).await {
            error!(error = %e, "Failed to warm up QR code filter");
        }
    });

    actix_web::rt::spawn(async move {
        // Students added in the last 30 days, in batches of 250
        if let Err(e) = student_cache::warmup_student_cache(&pool_for_cache_warmup, 30, 250).await {
            error!(error = %e, "Failed to warm up student cache");
        }
    });

    // One registry shared by every worker, so a session opened on one
    // worker is visible to requests served by another.
    let pipeline = ScanPipeline::new(
        Arc::new(MySqlStore::new(pool.clone())),
        config.attendance_daily_guard,
    );
    let scans = Data::new(ScanService::new(
        Arc::new(pipeline),
        config.scan_debounce(),
        config.scan_session_idle(),
        config.beep_asset.clone(),
    ));

    info!(
        debounce_ms = config.scan_debounce_ms,
        daily_guard = config.attendance_daily_guard,
        "Scanner ready"
    );

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(scans.clone())
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
