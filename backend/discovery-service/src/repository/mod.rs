//! Content repository boundary.
//!
//! The hosted document store supports equality predicates, any-match on the
//! tag array, single-field ordering and start-after cursors. It has no
//! full-text search, and compound queries fail with a distinguishable
//! missing-index error unless a composite index was declared for them.

mod memory;

pub use memory::{load_seed_file, IndexPolicy, IndexSpec, InMemoryContentRepository};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Category, ContentRecord, EngagementEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("query requires a composite index: {index}")]
    MissingIndex { index: String },

    #[error("repository unavailable: {0}")]
    Unavailable(String),

    #[error("content not found: {0}")]
    NotFound(String),
}

impl RepositoryError {
    pub fn is_missing_index(&self) -> bool {
        matches!(self, RepositoryError::MissingIndex { .. })
    }
}

/// Fields the repository can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryField {
    Visibility,
    Category,
    Tool,
    Creator,
    Tags,
}

impl QueryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryField::Visibility => "visibility",
            QueryField::Category => "category",
            QueryField::Tool => "tool",
            QueryField::Creator => "creator",
            QueryField::Tags => "tags",
        }
    }
}

impl FromStr for QueryField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "visibility" => Ok(QueryField::Visibility),
            "category" => Ok(QueryField::Category),
            "tool" => Ok(QueryField::Tool),
            "creator" => Ok(QueryField::Creator),
            "tags" => Ok(QueryField::Tags),
            other => Err(format!("unknown query field '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Visibility(bool),
    CategoryEq(Category),
    ToolEq(String),
    CreatorEq(String),
    /// Matches when the record carries at least one of the tags.
    TagsAny(Vec<String>),
}

impl Predicate {
    pub fn field(&self) -> QueryField {
        match self {
            Predicate::Visibility(_) => QueryField::Visibility,
            Predicate::CategoryEq(_) => QueryField::Category,
            Predicate::ToolEq(_) => QueryField::Tool,
            Predicate::CreatorEq(_) => QueryField::Creator,
            Predicate::TagsAny(_) => QueryField::Tags,
        }
    }

    pub fn matches(&self, record: &ContentRecord) -> bool {
        match self {
            Predicate::Visibility(is_public) => record.is_public == *is_public,
            Predicate::CategoryEq(category) => record.category == *category,
            Predicate::ToolEq(tool) => record.tool == *tool,
            Predicate::CreatorEq(creator) => record.creator_id == *creator,
            Predicate::TagsAny(tags) => tags.iter().any(|tag| record.tags.contains(tag)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    Price,
    Downloads,
}

impl OrderField {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::Price => "price",
            OrderField::Downloads => "downloads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

impl OrderBy {
    pub fn desc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }

    pub fn asc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    /// Sort key of a record under this ordering.
    pub fn key_of(&self, record: &ContentRecord) -> i64 {
        match self.field {
            OrderField::CreatedAt => record.created_at.timestamp_millis(),
            OrderField::Price => i64::try_from(record.price).unwrap_or(i64::MAX),
            OrderField::Downloads => i64::try_from(record.downloads).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        write!(f, "{} {}", self.field.as_str(), direction)
    }
}

/// Start-after position: the id of the last record seen and, for ordered
/// queries, its order key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCursor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<i64>,
}

impl RepositoryCursor {
    pub fn at(record: &ContentRecord, order_by: Option<OrderBy>) -> Self {
        Self {
            id: record.id.clone(),
            key: order_by.map(|order| order.key_of(record)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentQuery {
    pub predicates: Vec<Predicate>,
    /// `None` is the store's default order (document id ascending).
    pub order_by: Option<OrderBy>,
    pub limit: usize,
    pub start_after: Option<RepositoryCursor>,
}

impl ContentQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, order_by: Option<OrderBy>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn start_after(mut self, cursor: Option<RepositoryCursor>) -> Self {
        self.start_after = cursor;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub records: Vec<ContentRecord>,
    /// Set when the page was full, so more rows may exist.
    pub next_cursor: Option<RepositoryCursor>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn query(&self, query: ContentQuery) -> Result<QueryPage, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, RepositoryError>;

    /// Apply a counter update and return the updated record.
    async fn record_engagement(
        &self,
        id: &str,
        event: EngagementEvent,
    ) -> Result<ContentRecord, RepositoryError>;

    /// Replace the cached AI summary of a record.
    async fn store_summary(&self, id: &str, summary: &str) -> Result<(), RepositoryError>;
}
