//! Discovery orchestrator.
//!
//! Each request is planned in one of two modes:
//!
//! - **Optimized**: visibility, category, tool and (small) tag sets are
//!   pushed into the repository together with the native ordering for the
//!   sort key. Free text, price buckets and popularity ordering run
//!   client-side over an over-fetched window.
//! - **Degraded**: entered when the optimized query needs a composite index
//!   the store does not have. Only visibility is pushed down, in the store's
//!   default order, and every other predicate runs client-side.
//!
//! The page cursor points at the last record the page consumed, so matches
//! past the page boundary are served again by the next page rather than
//! skipped.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::models::{
    Criterion, DiscoveryDiagnostics, DiscoveryResult, FilterStage, QueryMode, SearchFilter,
};
use crate::pagination::{clamp_page_size, CursorState, PageCursor};
use crate::repository::{
    ContentQuery, ContentRepository, Predicate, QueryPage, RepositoryCursor, RepositoryError,
};
use crate::services::{filter, sort, DiscoveryError, Result};

/// A repository query plus what it already takes care of.
#[derive(Debug, Clone)]
struct QueryPlan {
    mode: QueryMode,
    query: ContentQuery,
    server_stages: Vec<FilterStage>,
}

impl QueryPlan {
    fn server_sorted(&self) -> bool {
        self.query.order_by.is_some()
    }

    fn server_filtered(&self) -> bool {
        self.mode == QueryMode::Optimized
            && self
                .server_stages
                .iter()
                .any(|stage| *stage != FilterStage::Visibility)
    }

    /// The part of `filter` still to be evaluated over the fetched window.
    /// Visibility is re-checked regardless.
    fn client_filter(&self, filter: &SearchFilter) -> SearchFilter {
        let mut remaining = filter.clone();
        for stage in &self.server_stages {
            match stage {
                FilterStage::Category => remaining.category = Criterion::Unset,
                FilterStage::Tool => remaining.tool = Criterion::Unset,
                FilterStage::Tags => remaining.tags = Criterion::Unset,
                _ => {}
            }
        }
        remaining
    }
}

pub struct DiscoveryService {
    repository: Arc<dyn ContentRepository>,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(repository: Arc<dyn ContentRepository>, config: DiscoveryConfig) -> Self {
        Self { repository, config }
    }

    /// Run one discovery request and return a single page.
    pub async fn discover(&self, filter: &SearchFilter) -> Result<DiscoveryResult> {
        let page_size = clamp_page_size(
            filter.page_size,
            self.config.page_size,
            self.config.max_page_size,
        );

        let resume = match &filter.cursor {
            Some(cursor) => {
                let state = cursor.decode()?;
                if state.sort != filter.sort {
                    return Err(DiscoveryError::InvalidCursor(format!(
                        "cursor was issued for sort '{}', not '{}'",
                        state.sort.as_str(),
                        filter.sort.as_str()
                    )));
                }
                Some(state)
            }
            None => None,
        };

        let (plan, page) = match resume {
            Some(CursorState {
                mode: QueryMode::Degraded,
                position,
                ..
            }) => self.run_degraded(page_size, Some(position)).await?,
            Some(CursorState { position, .. }) => {
                self.run_optimized(filter, page_size, Some(position))
                    .await?
            }
            None => self.run_optimized(filter, page_size, None).await?,
        };

        self.assemble(filter, plan, page, page_size)
    }

    async fn run_optimized(
        &self,
        filter: &SearchFilter,
        page_size: usize,
        start_after: Option<RepositoryCursor>,
    ) -> Result<(QueryPlan, QueryPage)> {
        let resuming = start_after.is_some();
        let plan = self.optimized_plan(filter, page_size, start_after);

        match self.repository.query(plan.query.clone()).await {
            Ok(page) => Ok((plan, page)),
            Err(RepositoryError::MissingIndex { index }) => {
                warn!(
                    index = %index,
                    sort = filter.sort.as_str(),
                    "Composite index missing, falling back to degraded discovery"
                );
                if resuming {
                    warn!("Optimized cursor cannot be resumed in degraded mode, restarting from the first window");
                }
                self.run_degraded(page_size, None).await
            }
            Err(e) => Err(DiscoveryError::RepositoryUnavailable(e.to_string())),
        }
    }

    async fn run_degraded(
        &self,
        page_size: usize,
        start_after: Option<RepositoryCursor>,
    ) -> Result<(QueryPlan, QueryPage)> {
        let plan = self.degraded_plan(page_size, start_after);
        let page = self
            .repository
            .query(plan.query.clone())
            .await
            .map_err(|e| {
                warn!(error = %e, "Degraded discovery query failed");
                DiscoveryError::RepositoryUnavailable(e.to_string())
            })?;
        Ok((plan, page))
    }

    fn optimized_plan(
        &self,
        filter: &SearchFilter,
        page_size: usize,
        start_after: Option<RepositoryCursor>,
    ) -> QueryPlan {
        let limit = page_size.saturating_mul(self.config.over_fetch_multiplier.max(1));
        let mut query = ContentQuery::new(limit).filter(Predicate::Visibility(true));
        let mut server_stages = vec![FilterStage::Visibility];

        if let Some(category) = filter.category.as_option() {
            query = query.filter(Predicate::CategoryEq(*category));
            server_stages.push(FilterStage::Category);
        }
        if let Some(tool) = filter.tool.as_option() {
            query = query.filter(Predicate::ToolEq(tool.clone()));
            server_stages.push(FilterStage::Tool);
        }
        if let Some(tags) = filter.tags.as_option() {
            if tags.len() <= self.config.max_server_tags {
                query = query.filter(Predicate::TagsAny(tags.clone()));
                server_stages.push(FilterStage::Tags);
            } else {
                debug!(
                    tags = tags.len(),
                    max = self.config.max_server_tags,
                    "Tag set too large for the repository, matching client-side"
                );
            }
        }

        QueryPlan {
            mode: QueryMode::Optimized,
            query: query
                .order_by(sort::native_order(filter.sort))
                .start_after(start_after),
            server_stages,
        }
    }

    fn degraded_plan(&self, page_size: usize, start_after: Option<RepositoryCursor>) -> QueryPlan {
        let limit = page_size.saturating_mul(self.config.fallback_multiplier.max(1));
        QueryPlan {
            mode: QueryMode::Degraded,
            query: ContentQuery::new(limit)
                .filter(Predicate::Visibility(true))
                .start_after(start_after),
            server_stages: vec![FilterStage::Visibility],
        }
    }

    fn assemble(
        &self,
        filter: &SearchFilter,
        plan: QueryPlan,
        page: QueryPage,
        page_size: usize,
    ) -> Result<DiscoveryResult> {
        let fetched = page.records.len();

        if page.records.is_empty() {
            debug!(mode = ?plan.mode, "Repository returned no rows, skipping client stages");
            return Ok(DiscoveryResult {
                items: Vec::new(),
                next_cursor: None,
                diagnostics: DiscoveryDiagnostics {
                    mode: plan.mode,
                    server_filtered: plan.server_filtered(),
                    server_stages: plan.server_stages.clone(),
                    client_stages: Vec::new(),
                    server_sorted: plan.server_sorted(),
                    client_sorted: false,
                    fetched: 0,
                    returned: 0,
                    deferred: 0,
                    short_circuited: true,
                },
            });
        }

        let client_filter = plan.client_filter(filter);
        let (passing, client_stages) = filter::matching_indices(&page.records, &client_filter);

        let take = passing.len().min(page_size);
        let deferred = passing.len() - take;
        let mut items: Vec<_> = passing[..take]
            .iter()
            .map(|&i| page.records[i].clone())
            .collect();

        let position = if deferred > 0 {
            // Resume right after the last record this page consumed.
            Some(RepositoryCursor::at(
                &page.records[passing[take - 1]],
                plan.query.order_by,
            ))
        } else {
            page.next_cursor.clone()
        };

        let client_sorted = !plan.server_sorted();
        if client_sorted {
            sort::sort_records(&mut items, filter.sort);
        }

        let next_cursor = position
            .map(|position| {
                PageCursor::encode(&CursorState {
                    mode: plan.mode,
                    sort: filter.sort,
                    position,
                })
            })
            .transpose()?;

        info!(
            mode = ?plan.mode,
            sort = filter.sort.as_str(),
            fetched,
            returned = items.len(),
            deferred,
            has_more = next_cursor.is_some(),
            "Discovery page assembled"
        );

        Ok(DiscoveryResult {
            diagnostics: DiscoveryDiagnostics {
                mode: plan.mode,
                server_filtered: plan.server_filtered(),
                server_stages: plan.server_stages,
                client_stages,
                server_sorted: !client_sorted,
                client_sorted,
                fetched,
                returned: items.len(),
                deferred,
                short_circuited: false,
            },
            items,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ContentRecord, PriceRange, SortKey};
    use crate::repository::{InMemoryContentRepository, MockContentRepository};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn record(id: &str, category: Category, minutes: i64, price: u64) -> ContentRecord {
        let created = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap() + Duration::minutes(minutes);
        ContentRecord {
            id: id.to_string(),
            creator_id: "creator".to_string(),
            title: format!("Item {}", id),
            description: String::new(),
            category,
            tool: "Midjourney".to_string(),
            tags: vec!["art".to_string()],
            price,
            views: 0,
            likes: 0,
            downloads: 0,
            comments: 0,
            is_public: true,
            created_at: created,
            updated_at: created,
            ai_summary: None,
        }
    }

    fn service(repository: impl ContentRepository + 'static) -> DiscoveryService {
        DiscoveryService::new(Arc::new(repository), DiscoveryConfig::default())
    }

    #[tokio::test]
    async fn test_missing_index_falls_back_to_degraded_mode() {
        let mut hidden = record("p", Category::Image, 9, 0);
        hidden.is_public = false;
        let window = vec![
            record("a", Category::Image, 1, 0),
            record("b", Category::Video, 2, 0),
            record("c", Category::Image, 3, 0),
            hidden,
        ];

        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .withf(|q| q.order_by.is_some())
            .times(1)
            .returning(|_| {
                Err(RepositoryError::MissingIndex {
                    index: "visibility,category|created_at desc".to_string(),
                })
            });
        repository
            .expect_query()
            .withf(|q| q.order_by.is_none() && q.predicates == vec![Predicate::Visibility(true)])
            .times(1)
            .returning(move |q| {
                assert_eq!(q.limit, 36);
                Ok(QueryPage {
                    records: window.clone(),
                    next_cursor: None,
                })
            });

        let filter = SearchFilter::new().with_category(Category::Image);
        let result = service(repository).discover(&filter).await.unwrap();

        let ids: Vec<_> = result.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(result.diagnostics.mode, QueryMode::Degraded);
        assert!(!result.diagnostics.server_filtered);
        assert!(result.diagnostics.client_sorted);
        assert!(result.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_failed_fallback_is_unavailable() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .withf(|q| q.order_by.is_some())
            .times(1)
            .returning(|_| {
                Err(RepositoryError::MissingIndex {
                    index: "visibility|created_at desc".to_string(),
                })
            });
        repository
            .expect_query()
            .withf(|q| q.order_by.is_none())
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("connection reset".to_string())));

        let err = service(repository)
            .discover(&SearchFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::RepositoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("timeout".to_string())));

        let err = service(repository)
            .discover(&SearchFilter::new().with_query("logo"))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::RepositoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_window_short_circuits() {
        let mut repository = MockContentRepository::new();
        repository
            .expect_query()
            .times(1)
            .returning(|_| Ok(QueryPage::default()));

        let filter = SearchFilter::new()
            .with_query("anything")
            .with_price_range(PriceRange::Free);
        let result = service(repository).discover(&filter).await.unwrap();

        assert!(result.items.is_empty());
        assert!(result.is_exhausted());
        assert!(result.diagnostics.short_circuited);
        assert!(result.diagnostics.client_stages.is_empty());
    }

    #[tokio::test]
    async fn test_short_page_does_not_refetch() {
        // Full window, most rows rejected by the client-only price stage.
        let window: Vec<_> = (0..24)
            .map(|i| {
                let price = if i % 8 == 0 { 1_000 } else { 90_000 };
                record(&format!("w{:02}", i), Category::Image, i, price)
            })
            .collect();
        let last = window[23].clone();

        let mut repository = MockContentRepository::new();
        repository.expect_query().times(1).returning(move |q| {
            assert_eq!(q.limit, 24);
            Ok(QueryPage {
                records: window.clone(),
                next_cursor: Some(RepositoryCursor::at(&last, q.order_by)),
            })
        });

        let filter = SearchFilter::new().with_price_range(PriceRange::UpTo5000);
        let result = service(repository).discover(&filter).await.unwrap();

        assert_eq!(result.items.len(), 3);
        assert!(result.next_cursor.is_some());
        assert_eq!(result.diagnostics.fetched, 24);
        assert_eq!(result.diagnostics.deferred, 0);
    }

    #[tokio::test]
    async fn test_pushdown_and_client_stages() {
        let repository = InMemoryContentRepository::with_records(vec![
            record("a", Category::Image, 1, 3_000),
            record("b", Category::Image, 2, 30_000),
            record("c", Category::Code, 3, 3_000),
        ]);
        let filter = SearchFilter::new()
            .with_category(Category::Image)
            .with_price_range(PriceRange::UpTo5000);

        let result = service(repository).discover(&filter).await.unwrap();
        let ids: Vec<_> = result.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let diagnostics = &result.diagnostics;
        assert_eq!(diagnostics.mode, QueryMode::Optimized);
        assert!(diagnostics.server_filtered);
        assert!(diagnostics.server_sorted);
        assert_eq!(
            diagnostics.server_stages,
            vec![FilterStage::Visibility, FilterStage::Category]
        );
        let client: Vec<_> = diagnostics.client_stages.iter().map(|s| s.stage).collect();
        assert_eq!(client, vec![FilterStage::Visibility, FilterStage::PriceRange]);
    }

    #[tokio::test]
    async fn test_matches_past_the_page_are_deferred_not_skipped() {
        let records: Vec<_> = (0..10)
            .map(|i| record(&format!("r{:02}", i), Category::Image, i, 0))
            .collect();
        let service = service(InMemoryContentRepository::with_records(records));

        let filter = SearchFilter::new().with_query("item").with_page_size(4);
        let first = service.discover(&filter).await.unwrap();
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.diagnostics.fetched, 8);
        assert_eq!(first.diagnostics.deferred, 4);

        let mut seen: HashSet<String> = first.items.iter().map(|r| r.id.clone()).collect();
        let mut cursor = first.next_cursor;
        while let Some(next) = cursor {
            let page = service.discover(&filter.clone().after(next)).await.unwrap();
            for item in &page.items {
                assert!(seen.insert(item.id.clone()), "duplicate {}", item.id);
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_cursor_sort_must_match_request() {
        let service = service(InMemoryContentRepository::with_records(vec![
            record("a", Category::Image, 1, 0),
            record("b", Category::Image, 2, 0),
        ]));
        let first = service
            .discover(&SearchFilter::new().with_page_size(1))
            .await
            .unwrap();
        let cursor = first.next_cursor.unwrap();

        let err = service
            .discover(
                &SearchFilter::new()
                    .sorted_by(SortKey::PriceAsc)
                    .with_page_size(1)
                    .after(cursor),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidCursor(_)));

        let err = service
            .discover(&SearchFilter::new().after(PageCursor::from_raw("%%%")))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidCursor(_)));
    }
}
