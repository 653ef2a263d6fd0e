use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::AppState;
use crate::error::Result;

pub async fn get_platform_stats(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.stats.platform_stats(Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}
