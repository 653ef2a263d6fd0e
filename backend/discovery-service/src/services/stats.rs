//! Catalog statistics over the public catalog.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::models::{Category, ContentRecord, PriceRange, SortKey};
use crate::repository::{ContentQuery, ContentRepository, Predicate};
use crate::services::{sort, DiscoveryError, Result};

const STATS_BATCH_SIZE: usize = 500;
const RECENT_DAYS: i64 = 7;
const TOP_TAGS: usize = 5;
const TOP_POPULAR: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total_contents: u64,
    pub total_views: u64,
    pub total_downloads: u64,
    pub total_likes: u64,
    /// Uploads in the last 7 days.
    pub recent_uploads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBucketCount {
    pub range: PriceRange,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularContent {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub popularity: u64,
    pub views: u64,
    pub downloads: u64,
    pub likes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUploads {
    pub date: NaiveDate,
    pub uploads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    /// Oldest day first, today last.
    pub daily_uploads: Vec<DailyUploads>,
    /// Share of the catalog uploaded in the last 7 days, in percent.
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub overview: StatsOverview,
    pub categories: BTreeMap<String, u64>,
    pub tools: BTreeMap<String, u64>,
    pub price_distribution: Vec<PriceBucketCount>,
    pub top_tags: Vec<TagCount>,
    pub popular_contents: Vec<PopularContent>,
    pub trends: Trends,
}

impl PlatformStats {
    /// Private records are ignored.
    pub fn from_records(records: &[ContentRecord], now: DateTime<Utc>) -> Self {
        let public: Vec<&ContentRecord> = records.iter().filter(|r| r.is_public).collect();
        let since = now - Duration::days(RECENT_DAYS);

        let mut overview = StatsOverview {
            total_contents: public.len() as u64,
            total_views: 0,
            total_downloads: 0,
            total_likes: 0,
            recent_uploads: 0,
        };
        let mut categories: BTreeMap<String, u64> = BTreeMap::new();
        let mut tools: BTreeMap<String, u64> = BTreeMap::new();
        let mut prices: HashMap<PriceRange, u64> = HashMap::new();
        let mut tags: HashMap<&str, u64> = HashMap::new();

        for record in &public {
            overview.total_views = overview.total_views.saturating_add(record.views);
            overview.total_downloads = overview.total_downloads.saturating_add(record.downloads);
            overview.total_likes = overview.total_likes.saturating_add(record.likes);
            if record.created_at >= since {
                overview.recent_uploads += 1;
            }

            *categories
                .entry(record.category.as_str().to_string())
                .or_default() += 1;
            let tool = if record.tool.trim().is_empty() {
                "other"
            } else {
                record.tool.as_str()
            };
            *tools.entry(tool.to_string()).or_default() += 1;
            *prices.entry(PriceRange::for_price(record.price)).or_default() += 1;
            for tag in &record.tags {
                *tags.entry(tag.as_str()).or_default() += 1;
            }
        }

        let price_distribution = PriceRange::ALL
            .into_iter()
            .map(|range| PriceBucketCount {
                range,
                count: prices.get(&range).copied().unwrap_or(0),
            })
            .collect();

        let mut top_tags: Vec<TagCount> = tags
            .into_iter()
            .map(|(name, count)| TagCount {
                name: name.to_string(),
                count,
            })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        top_tags.truncate(TOP_TAGS);

        let mut by_popularity: Vec<ContentRecord> = public.iter().map(|r| (*r).clone()).collect();
        sort::sort_records(&mut by_popularity, SortKey::Popular);
        let popular_contents = by_popularity
            .into_iter()
            .take(TOP_POPULAR)
            .map(|record| PopularContent {
                popularity: record.popularity(),
                id: record.id,
                title: record.title,
                category: record.category,
                views: record.views,
                downloads: record.downloads,
                likes: record.likes,
            })
            .collect();

        let growth_rate = if overview.total_contents == 0 {
            0.0
        } else {
            let rate = overview.recent_uploads as f64 / overview.total_contents as f64 * 100.0;
            (rate * 10.0).round() / 10.0
        };

        Self {
            trends: Trends {
                daily_uploads: daily_uploads(&public, now),
                growth_rate,
            },
            overview,
            categories,
            tools,
            price_distribution,
            top_tags,
            popular_contents,
        }
    }
}

/// Upload counts per UTC day for the last 7 days, today included.
fn daily_uploads(records: &[&ContentRecord], now: DateTime<Utc>) -> Vec<DailyUploads> {
    let today = now.date_naive();
    (0..RECENT_DAYS)
        .rev()
        .map(|days_ago| {
            let date = today - Duration::days(days_ago);
            let uploads = records
                .iter()
                .filter(|r| r.created_at.date_naive() == date)
                .count() as u64;
            DailyUploads { date, uploads }
        })
        .collect()
}

pub struct StatsService {
    repository: Arc<dyn ContentRepository>,
}

impl StatsService {
    pub fn new(repository: Arc<dyn ContentRepository>) -> Self {
        Self { repository }
    }

    pub async fn platform_stats(&self, now: DateTime<Utc>) -> Result<PlatformStats> {
        let mut records = Vec::new();
        let mut cursor = None;

        loop {
            let query = ContentQuery::new(STATS_BATCH_SIZE)
                .filter(Predicate::Visibility(true))
                .start_after(cursor);
            let page = self
                .repository
                .query(query)
                .await
                .map_err(|e| DiscoveryError::RepositoryUnavailable(e.to_string()))?;
            records.extend(page.records);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let stats = PlatformStats::from_records(&records, now);
        info!(
            total = stats.overview.total_contents,
            recent = stats.overview.recent_uploads,
            "Platform stats computed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryContentRepository;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 15, 0, 0).unwrap()
    }

    fn record(id: &str, days_ago: i64, category: Category, tool: &str, price: u64) -> ContentRecord {
        let created = now() - Duration::days(days_ago);
        ContentRecord {
            id: id.to_string(),
            creator_id: "creator".to_string(),
            title: id.to_string(),
            description: String::new(),
            category,
            tool: tool.to_string(),
            tags: vec![],
            price,
            views: 10,
            likes: 0,
            downloads: 0,
            comments: 0,
            is_public: true,
            created_at: created,
            updated_at: created,
            ai_summary: None,
        }
    }

    fn catalog() -> Vec<ContentRecord> {
        let mut a = record("a", 0, Category::Image, "Midjourney", 0);
        a.tags = vec!["design".into(), "logo".into()];
        a.likes = 3;
        let mut b = record("b", 2, Category::Image, "", 5_000);
        b.tags = vec!["design".into()];
        b.downloads = 9;
        let mut c = record("c", 30, Category::Code, "Cursor", 60_000);
        c.tags = vec!["rust".into(), "logo".into()];
        c.likes = 1;
        let mut hidden = record("hidden", 1, Category::Video, "Sora", 0);
        hidden.is_public = false;
        hidden.likes = 100;
        vec![a, b, c, hidden]
    }

    #[test]
    fn test_overview_and_breakdowns() {
        let stats = PlatformStats::from_records(&catalog(), now());

        assert_eq!(stats.overview.total_contents, 3);
        assert_eq!(stats.overview.total_views, 30);
        assert_eq!(stats.overview.total_likes, 4);
        assert_eq!(stats.overview.recent_uploads, 2);

        assert_eq!(stats.categories.get("image"), Some(&2));
        assert_eq!(stats.categories.get("video"), None);
        assert_eq!(stats.tools.get("other"), Some(&1));

        let prices: Vec<_> = stats.price_distribution.iter().map(|p| p.count).collect();
        assert_eq!(prices, vec![1, 1, 0, 0, 1]);

        let tags: Vec<_> = stats
            .top_tags
            .iter()
            .map(|t| (t.name.as_str(), t.count))
            .collect();
        assert_eq!(tags, vec![("design", 2), ("logo", 2), ("rust", 1)]);

        let popular: Vec<_> = stats.popular_contents.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(popular, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_trends() {
        let stats = PlatformStats::from_records(&catalog(), now());

        let days = &stats.trends.daily_uploads;
        assert_eq!(days.len(), 7);
        assert_eq!(days[6].date, now().date_naive());
        assert_eq!(days[6].uploads, 1);
        assert_eq!(days[4].uploads, 1);
        assert_eq!(days.iter().map(|d| d.uploads).sum::<u64>(), 2);

        assert!((stats.trends.growth_rate - 66.7).abs() < 1e-9);
        assert_eq!(PlatformStats::from_records(&[], now()).trends.growth_rate, 0.0);
    }

    #[tokio::test]
    async fn test_service_pages_through_catalog() {
        let records: Vec<_> = (0..1_203)
            .map(|i| record(&format!("c{:04}", i), 40, Category::Document, "Claude", 0))
            .collect();
        let service = StatsService::new(Arc::new(InMemoryContentRepository::with_records(records)));

        let stats = service.platform_stats(now()).await.unwrap();
        assert_eq!(stats.overview.total_contents, 1_203);
        assert_eq!(stats.trends.growth_rate, 0.0);
    }
}
