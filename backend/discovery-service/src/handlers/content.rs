use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::error::{AppError, Result};
use crate::models::EngagementEvent;
use crate::repository::RepositoryError;

pub async fn get_summary(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let summary = state.summaries.summary_for(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn regenerate_summary(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let summary = state.summaries.regenerate(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[derive(Debug, Deserialize)]
pub struct BackfillParams {
    pub limit: Option<usize>,
}

/// Generates summaries for recent public records that have none.
pub async fn backfill_summaries(
    query: web::Query<BackfillParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let report = state.summaries.backfill_missing(query.limit).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn summary_coverage(
    query: web::Query<BackfillParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let coverage = state.summaries.coverage(query.limit).await?;
    Ok(HttpResponse::Ok().json(coverage))
}

#[derive(Debug, Deserialize)]
pub struct EngagementRequest {
    pub event: EngagementEvent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCounters {
    pub content_id: String,
    pub views: u64,
    pub likes: u64,
    pub downloads: u64,
    pub comments: u64,
}

pub async fn record_engagement(
    path: web::Path<String>,
    body: web::Json<EngagementRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let content_id = path.into_inner();
    let record = state
        .repository
        .record_engagement(&content_id, body.event)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound(id) => AppError::NotFound(format!("content {}", id)),
            other => AppError::Unavailable(other.to_string()),
        })?;

    info!(content_id = %record.id, event = ?body.event, "Engagement recorded");

    Ok(HttpResponse::Ok().json(EngagementCounters {
        content_id: record.id,
        views: record.views,
        likes: record.likes,
        downloads: record.downloads,
        comments: record.comments,
    }))
}
