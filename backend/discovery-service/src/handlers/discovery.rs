use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AppState;
use crate::error::Result;
use crate::models::{Category, Criterion, PriceRange, SearchFilter, SortKey};
use crate::pagination::PageCursor;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(alias = "type")]
    pub category: Option<String>,
    pub tool: Option<String>,
    pub price_range: Option<String>,
    /// Comma-separated.
    pub tags: Option<String>,
    pub sort: Option<String>,
    pub page_size: Option<usize>,
    pub cursor: Option<String>,
}

/// Parses an optional filter value. Unknown values are dropped with a
/// warning rather than failing the search.
fn lenient<T>(field: &str, raw: Option<&str>) -> Criterion<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|value| !value.is_empty() && *value != "all") {
        None => Criterion::Unset,
        Some(value) => match value.parse() {
            Ok(parsed) => Criterion::Is(parsed),
            Err(e) => {
                warn!(field, value, error = %e, "Ignoring unrecognised filter value");
                Criterion::Unset
            }
        },
    }
}

impl SearchParams {
    pub fn into_filter(self) -> SearchFilter {
        let tags: Vec<String> = self
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|tag| tag.trim().to_string())
            .collect();

        let mut filter = SearchFilter::new()
            .with_query(self.q.unwrap_or_default())
            .with_tool(self.tool.unwrap_or_default().trim())
            .with_tags(tags)
            .sorted_by(SortKey::parse_lenient(self.sort.as_deref()));
        filter.category = lenient::<Category>("category", self.category.as_deref());
        filter.price_range = lenient::<PriceRange>("priceRange", self.price_range.as_deref());
        filter.page_size = self.page_size;
        filter.cursor = self
            .cursor
            .filter(|cursor| !cursor.is_empty())
            .map(PageCursor::from_raw);
        filter
    }
}

pub async fn search_contents(
    query: web::Query<SearchParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let filter = query.into_inner().into_filter();
    debug!(
        sort = filter.sort.as_str(),
        page_size = ?filter.page_size,
        resuming = filter.cursor.is_some(),
        "Search request"
    );

    let result = state.discovery.discover(&filter).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    pub limit: Option<usize>,
}

pub async fn get_related(
    path: web::Path<String>,
    query: web::Query<RelatedParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let content_id = path.into_inner();
    let related = state.related.top_related(&content_id, query.limit).await?;
    Ok(HttpResponse::Ok().json(related))
}
