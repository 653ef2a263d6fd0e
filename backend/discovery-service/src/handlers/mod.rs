//! HTTP handlers for discovery endpoints
//!
//! - Search: filtered, sorted, cursor-paginated catalog browsing
//! - Related: relevance-ranked items for a content page
//! - Content: AI summaries, summary backfill and engagement counters
//! - Stats: platform-wide catalog statistics
pub mod content;
pub mod discovery;
pub mod stats;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::repository::ContentRepository;
use crate::services::{
    DiscoveryService, RelatedContentService, StatsService, SummaryProvider, SummaryService,
};

pub use content::{
    backfill_summaries, get_summary, record_engagement, regenerate_summary, summary_coverage,
};
pub use discovery::{get_related, search_contents};
pub use stats::get_platform_stats;

/// Shared state for every handler.
pub struct AppState {
    pub repository: Arc<dyn ContentRepository>,
    pub discovery: Arc<DiscoveryService>,
    pub related: Arc<RelatedContentService>,
    pub stats: Arc<StatsService>,
    pub summaries: Arc<SummaryService>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        config: &Config,
        summary_provider: Option<Arc<dyn SummaryProvider>>,
    ) -> Self {
        Self {
            discovery: Arc::new(DiscoveryService::new(
                repository.clone(),
                config.discovery.clone(),
            )),
            related: Arc::new(RelatedContentService::new(
                repository.clone(),
                config.related.clone(),
            )),
            stats: Arc::new(StatsService::new(repository.clone())),
            summaries: Arc::new(
                SummaryService::new(repository.clone(), summary_provider).with_backfill(
                    config.summary.backfill_limit,
                    Duration::from_millis(config.summary.backfill_delay_ms),
                ),
            ),
            repository,
        }
    }
}

/// Registers every route under `/api/v1`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health))
            .route("/stats", web::get().to(get_platform_stats))
            .service(
                web::resource("/summaries/backfill")
                    .route(web::get().to(summary_coverage))
                    .route(web::post().to(backfill_summaries)),
            )
            .service(
                web::scope("/contents")
                    .route("/search", web::get().to(search_contents))
                    .route("/{id}/related", web::get().to(get_related))
                    .service(
                        web::resource("/{id}/summary")
                            .route(web::get().to(get_summary))
                            .route(web::post().to(regenerate_summary)),
                    )
                    .route("/{id}/engagement", web::post().to(record_engagement)),
            ),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "discovery-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
