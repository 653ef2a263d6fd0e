use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    ContentQuery, ContentRepository, Direction, OrderBy, OrderField, Predicate, QueryField,
    QueryPage, RepositoryCursor, RepositoryError,
};
use crate::models::{ContentRecord, EngagementEvent};

/// A composite index: the filtered fields plus one ordering.
///
/// Textual form is `field,field|order_field direction`, for example
/// `visibility,category|created_at desc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    fields: BTreeSet<QueryField>,
    order_by: OrderBy,
}

impl IndexSpec {
    pub fn new(fields: impl IntoIterator<Item = QueryField>, order_by: OrderBy) -> Self {
        Self {
            fields: fields.into_iter().collect(),
            order_by,
        }
    }

    /// The composite index a query needs, if any. Filtering on one or more
    /// fields while ordering by another needs one; plain filters and plain
    /// orderings are served by automatic single-field indexes.
    pub fn required_for(query: &ContentQuery) -> Option<IndexSpec> {
        let order_by = query.order_by?;
        let fields: BTreeSet<QueryField> = query.predicates.iter().map(Predicate::field).collect();
        if fields.is_empty() {
            None
        } else {
            Some(Self { fields, order_by })
        }
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().map(QueryField::as_str).collect();
        write!(f, "{}|{}", fields.join(","), self.order_by)
    }
}

impl FromStr for IndexSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fields, order) = s
            .split_once('|')
            .ok_or_else(|| format!("index '{}' is missing '|order_field direction'", s))?;

        let fields = fields
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(QueryField::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut parts = order.split_whitespace();
        let field = match parts.next() {
            Some("created_at") => OrderField::CreatedAt,
            Some("price") => OrderField::Price,
            Some("downloads") => OrderField::Downloads,
            other => return Err(format!("unknown order field {:?} in index '{}'", other, s)),
        };
        let direction = match parts.next() {
            Some("asc") | None => Direction::Asc,
            Some("desc") => Direction::Desc,
            Some(other) => return Err(format!("unknown direction '{}' in index '{}'", other, s)),
        };

        Ok(Self {
            fields,
            order_by: OrderBy { field, direction },
        })
    }
}

/// Which compound queries the store will serve.
#[derive(Debug, Clone, Default)]
pub enum IndexPolicy {
    /// Every query shape has an index.
    #[default]
    Unrestricted,
    /// Only the listed composite indexes exist.
    Declared(HashSet<IndexSpec>),
}

impl IndexPolicy {
    /// Parses a `;`-separated list of [`IndexSpec`]s. An empty string
    /// declares no composite indexes at all.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let specs = raw
            .split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(IndexSpec::from_str)
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(IndexPolicy::Declared(specs))
    }

    fn check(&self, query: &ContentQuery) -> Result<(), RepositoryError> {
        let IndexPolicy::Declared(indexes) = self else {
            return Ok(());
        };
        match IndexSpec::required_for(query) {
            Some(required) if !indexes.contains(&required) => Err(RepositoryError::MissingIndex {
                index: required.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// In-process content store with the hosted store's query semantics.
#[derive(Debug, Default)]
pub struct InMemoryContentRepository {
    records: RwLock<Vec<ContentRecord>>,
    index_policy: IndexPolicy,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records replace earlier ones with the same id.
    pub fn with_records(records: Vec<ContentRecord>) -> Self {
        let mut unique: Vec<ContentRecord> = Vec::with_capacity(records.len());
        for record in records {
            match unique.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => unique.push(record),
            }
        }
        Self {
            records: RwLock::new(unique),
            index_policy: IndexPolicy::default(),
        }
    }

    pub fn with_index_policy(mut self, policy: IndexPolicy) -> Self {
        self.index_policy = policy;
        self
    }

    pub async fn upsert(&self, record: ContentRecord) {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Hard delete; there are no tombstones.
    pub async fn delete(&self, id: &str) -> Result<ContentRecord, RepositoryError> {
        let mut records = self.records.write().await;
        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        Ok(records.remove(position))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn compare_in_order(order_by: Option<OrderBy>, a: &ContentRecord, b: &ContentRecord) -> Ordering {
    match order_by {
        None => a.id.cmp(&b.id),
        Some(order) => {
            let (ka, kb) = (order.key_of(a), order.key_of(b));
            let by_key = match order.direction {
                Direction::Asc => ka.cmp(&kb),
                Direction::Desc => kb.cmp(&ka),
            };
            by_key.then_with(|| a.id.cmp(&b.id))
        }
    }
}

fn validate_cursor(
    order_by: Option<OrderBy>,
    cursor: &RepositoryCursor,
) -> Result<(), RepositoryError> {
    match (order_by, cursor.key) {
        (None, None) | (Some(_), Some(_)) => Ok(()),
        _ => Err(RepositoryError::Unavailable(
            "start_after cursor does not match the query ordering".to_string(),
        )),
    }
}

fn is_after(order_by: Option<OrderBy>, cursor: &RepositoryCursor, record: &ContentRecord) -> bool {
    match (order_by, cursor.key) {
        (Some(order), Some(key)) => {
            let record_key = order.key_of(record);
            let by_key = match order.direction {
                Direction::Asc => record_key.cmp(&key),
                Direction::Desc => key.cmp(&record_key),
            };
            by_key.then_with(|| record.id.cmp(&cursor.id)) == Ordering::Greater
        }
        _ => record.id > cursor.id,
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn query(&self, query: ContentQuery) -> Result<QueryPage, RepositoryError> {
        self.index_policy.check(&query)?;
        if let Some(cursor) = &query.start_after {
            validate_cursor(query.order_by, cursor)?;
        }

        let records = self.records.read().await;
        let mut matched: Vec<&ContentRecord> = records
            .iter()
            .filter(|record| query.predicates.iter().all(|p| p.matches(record)))
            .collect();
        matched.sort_by(|a, b| compare_in_order(query.order_by, a, b));

        let start = match &query.start_after {
            Some(cursor) => matched
                .iter()
                .position(|record| is_after(query.order_by, cursor, record))
                .unwrap_or(matched.len()),
            None => 0,
        };

        let page: Vec<ContentRecord> = matched[start..]
            .iter()
            .take(query.limit)
            .map(|record| (*record).clone())
            .collect();

        let next_cursor = if query.limit > 0 && page.len() == query.limit {
            page.last()
                .map(|record| RepositoryCursor::at(record, query.order_by))
        } else {
            None
        };

        debug!(
            predicates = query.predicates.len(),
            matched = matched.len(),
            returned = page.len(),
            has_more = next_cursor.is_some(),
            "In-memory query served"
        );

        Ok(QueryPage {
            records: page,
            next_cursor,
        })
    }

    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn record_engagement(
        &self,
        id: &str,
        event: EngagementEvent,
    ) -> Result<ContentRecord, RepositoryError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.apply_engagement(event);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn store_summary(&self, id: &str, summary: &str) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.ai_summary = Some(summary.to_string());
        Ok(())
    }
}

/// Load a JSON array of records used to seed the in-memory catalog.
pub async fn load_seed_file(path: &Path) -> anyhow::Result<Vec<ContentRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog seed {}", path.display()))?;
    let records: Vec<ContentRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog seed {}", path.display()))?;

    info!(path = %path.display(), records = records.len(), "Loaded catalog seed");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, minutes: i64, price: u64) -> ContentRecord {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        ContentRecord {
            id: id.to_string(),
            creator_id: "creator".to_string(),
            title: id.to_string(),
            description: String::new(),
            category: Category::Image,
            tool: "Midjourney".to_string(),
            tags: vec!["ai".to_string()],
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

    #[tokio::test]
    async fn test_ordered_query_pages_without_overlap() {
        let repo = InMemoryContentRepository::with_records(vec![
            record("a", 1, 100),
            record("b", 3, 100),
            record("c", 2, 100),
            record("d", 3, 100),
        ]);
        let order = Some(OrderBy::desc(OrderField::CreatedAt));

        let first = repo
            .query(ContentQuery::new(2).order_by(order))
            .await
            .unwrap();
        let ids: Vec<_> = first.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
        assert!(first.next_cursor.is_some());

        let second = repo
            .query(ContentQuery::new(2).order_by(order).start_after(first.next_cursor))
            .await
            .unwrap();
        let ids: Vec<_> = second.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_short_page_has_no_cursor() {
        let repo = InMemoryContentRepository::with_records(vec![record("a", 1, 0)]);
        let page = repo.query(ContentQuery::new(5)).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_declared_indexes_reject_compound_queries() {
        let policy = IndexPolicy::parse("visibility|created_at desc").unwrap();
        let repo =
            InMemoryContentRepository::with_records(vec![record("a", 1, 0)]).with_index_policy(policy);

        let served = repo
            .query(
                ContentQuery::new(5)
                    .filter(Predicate::Visibility(true))
                    .order_by(Some(OrderBy::desc(OrderField::CreatedAt))),
            )
            .await;
        assert!(served.is_ok());

        let err = repo
            .query(
                ContentQuery::new(5)
                    .filter(Predicate::Visibility(true))
                    .filter(Predicate::CategoryEq(Category::Image))
                    .order_by(Some(OrderBy::desc(OrderField::CreatedAt))),
            )
            .await
            .unwrap_err();
        assert!(err.is_missing_index());
        assert_eq!(
            err,
            RepositoryError::MissingIndex {
                index: "visibility,category|created_at desc".to_string()
            }
        );

        // Equality-only queries never need a composite index.
        let plain = repo
            .query(
                ContentQuery::new(5)
                    .filter(Predicate::Visibility(true))
                    .filter(Predicate::CategoryEq(Category::Image)),
            )
            .await;
        assert!(plain.is_ok());
    }

    #[test]
    fn test_index_spec_parse_errors() {
        assert!(IndexPolicy::parse("visibility").is_err());
        assert!(IndexPolicy::parse("colour|created_at desc").is_err());
        assert!(IndexPolicy::parse("visibility|views desc").is_err());
        assert!(matches!(
            IndexPolicy::parse("").unwrap(),
            IndexPolicy::Declared(set) if set.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_cursor_must_match_ordering() {
        let repo = InMemoryContentRepository::with_records(vec![record("a", 1, 0)]);
        let err = repo
            .query(ContentQuery::new(5).start_after(Some(RepositoryCursor {
                id: "a".to_string(),
                key: Some(1),
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_engagement_and_summary_updates() {
        let repo = InMemoryContentRepository::with_records(vec![record("a", 1, 0)]);

        let updated = repo.record_engagement("a", EngagementEvent::Like).await.unwrap();
        assert_eq!(updated.likes, 1);
        repo.record_engagement("a", EngagementEvent::Unlike).await.unwrap();
        let updated = repo.record_engagement("a", EngagementEvent::Unlike).await.unwrap();
        assert_eq!(updated.likes, 0);

        repo.store_summary("a", "short summary").await.unwrap();
        let stored = repo.get("a").await.unwrap().unwrap();
        assert_eq!(stored.ai_summary.as_deref(), Some("short summary"));

        assert!(matches!(
            repo.record_engagement("missing", EngagementEvent::View).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_then_hard_delete() {
        let repo = InMemoryContentRepository::new();
        assert!(repo.is_empty().await);

        repo.upsert(record("a", 1, 0)).await;
        repo.upsert(record("a", 2, 5)).await;
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.get("a").await.unwrap().unwrap().price, 5);

        let removed = repo.delete("a").await.unwrap();
        assert_eq!(removed.price, 5);
        assert!(repo.is_empty().await);
        assert!(repo.get("a").await.unwrap().is_none());
    }
}
