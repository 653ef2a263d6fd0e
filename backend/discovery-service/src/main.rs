use actix_web::{web, App, HttpServer};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use discovery_service::handlers::{self, AppState};
use discovery_service::repository::load_seed_file;
use discovery_service::services::{GenerativeSummaryProvider, SummaryProvider};
use discovery_service::{Config, ContentRepository, InMemoryContentRepository, IndexPolicy};

/// Discovery Service
///
/// Search, related content, catalog statistics and AI summaries for the
/// content marketplace.
///
/// # Routes
///
/// - `GET /api/v1/contents/search` - filtered, sorted, paginated search
/// - `GET /api/v1/contents/{id}/related` - related content
/// - `GET|POST /api/v1/contents/{id}/summary` - cached or regenerated summary
/// - `POST /api/v1/contents/{id}/engagement` - view/like/download counters
/// - `GET /api/v1/stats` - platform statistics
/// - `GET /api/v1/health` - liveness
#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    // JSON lines in production for log aggregation, human-readable otherwise.
    let json_logs = std::env::var("APP_ENV").is_ok_and(|env| env == "production");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,actix_web=info".into()))
        .with(json_logs.then(|| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
        }))
        .with((!json_logs).then(fmt::layer))
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e)
    })?;

    let index_policy = match config.catalog.indexes.as_deref() {
        Some(raw) => IndexPolicy::parse(raw).map_err(|e| {
            error!("Invalid CATALOG_INDEXES: {}", e);
            io::Error::new(io::ErrorKind::InvalidInput, e)
        })?,
        None => IndexPolicy::Unrestricted,
    };

    let records = match config.catalog.seed_path.as_deref() {
        Some(path) => load_seed_file(Path::new(path)).await.map_err(|e| {
            error!("Failed to load catalog seed: {:#}", e);
            io::Error::new(io::ErrorKind::InvalidData, format!("{:#}", e))
        })?,
        None => {
            warn!("CATALOG_SEED_PATH not set - starting with an empty catalog");
            Vec::new()
        }
    };

    let repository: Arc<dyn ContentRepository> =
        Arc::new(InMemoryContentRepository::with_records(records).with_index_policy(index_policy));

    let summary_provider: Option<Arc<dyn SummaryProvider>> = if config.summary.api_key.is_some() {
        match GenerativeSummaryProvider::new(&config.summary) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                warn!("Summary provider disabled: {}", e);
                None
            }
        }
    } else {
        warn!("SUMMARY_API_KEY not set - AI summaries disabled");
        None
    };

    let state = web::Data::new(AppState::new(repository, &config, summary_provider));
    let bind_addr = (config.app.host.clone(), config.app.port);

    info!(
        env = %config.app.env,
        host = %config.app.host,
        port = config.app.port,
        "Starting discovery-service"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
