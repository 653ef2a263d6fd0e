use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::pagination::PageCursor;
use crate::services::DiscoveryError;

/// Content category as stored on the record (`type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Video,
    Music,
    Code,
    Document,
    #[serde(rename = "ppt", alias = "presentation")]
    Presentation,
    #[serde(rename = "excel", alias = "spreadsheet")]
    Spreadsheet,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Video => "video",
            Category::Music => "music",
            Category::Code => "code",
            Category::Document => "document",
            Category::Presentation => "ppt",
            Category::Spreadsheet => "excel",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Category::Image),
            "video" => Ok(Category::Video),
            "music" => Ok(Category::Music),
            "code" => Ok(Category::Code),
            "document" => Ok(Category::Document),
            "ppt" | "presentation" => Ok(Category::Presentation),
            "excel" | "spreadsheet" => Ok(Category::Spreadsheet),
            "other" => Ok(Category::Other),
            other => Err(DiscoveryError::InvalidFilter(format!(
                "unknown category '{}'",
                other
            ))),
        }
    }
}

/// A marketplace item as seen by discovery.
///
/// Counters are unsigned, so the non-negativity invariants hold by
/// construction. `is_public = false` records must never leave discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub comments: u64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// At most one cached AI summary per record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

impl ContentRecord {
    /// likes + downloads
    pub fn popularity(&self) -> u64 {
        self.likes.saturating_add(self.downloads)
    }

    pub fn apply_engagement(&mut self, event: EngagementEvent) {
        match event {
            EngagementEvent::View => self.views = self.views.saturating_add(1),
            EngagementEvent::Like => self.likes = self.likes.saturating_add(1),
            EngagementEvent::Unlike => self.likes = self.likes.saturating_sub(1),
            EngagementEvent::Download => self.downloads = self.downloads.saturating_add(1),
            EngagementEvent::Comment => self.comments = self.comments.saturating_add(1),
        }
    }
}

/// Counter side effects of user activity on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementEvent {
    View,
    Like,
    Unlike,
    Download,
    Comment,
}

/// Price buckets offered by the search UI.
///
/// Lower bounds are exclusive, upper bounds inclusive: 5000 belongs to
/// `UpTo5000`, and 0 only ever belongs to `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceRange {
    #[serde(rename = "free")]
    Free,
    #[serde(rename = "0-5000")]
    UpTo5000,
    #[serde(rename = "5000-20000")]
    UpTo20000,
    #[serde(rename = "20000-50000")]
    UpTo50000,
    #[serde(rename = "50000+")]
    Above50000,
}

impl PriceRange {
    pub const ALL: [PriceRange; 5] = [
        PriceRange::Free,
        PriceRange::UpTo5000,
        PriceRange::UpTo20000,
        PriceRange::UpTo50000,
        PriceRange::Above50000,
    ];

    pub fn contains(&self, price: u64) -> bool {
        match self {
            PriceRange::Free => price == 0,
            PriceRange::UpTo5000 => price > 0 && price <= 5_000,
            PriceRange::UpTo20000 => price > 5_000 && price <= 20_000,
            PriceRange::UpTo50000 => price > 20_000 && price <= 50_000,
            PriceRange::Above50000 => price > 50_000,
        }
    }

    /// The single bucket a price falls into.
    pub fn for_price(price: u64) -> PriceRange {
        Self::ALL
            .into_iter()
            .find(|range| range.contains(price))
            .unwrap_or(PriceRange::Above50000)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceRange::Free => "free",
            PriceRange::UpTo5000 => "0-5000",
            PriceRange::UpTo20000 => "5000-20000",
            PriceRange::UpTo50000 => "20000-50000",
            PriceRange::Above50000 => "50000+",
        }
    }
}

impl FromStr for PriceRange {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceRange::ALL
            .into_iter()
            .find(|range| range.as_str() == s.trim())
            .ok_or_else(|| DiscoveryError::InvalidFilter(format!("unknown price range '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Latest,
    Popular,
    Downloads,
    #[serde(alias = "price-low")]
    PriceAsc,
    #[serde(alias = "price-high")]
    PriceDesc,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Latest => "latest",
            SortKey::Popular => "popular",
            SortKey::Downloads => "downloads",
            SortKey::PriceAsc => "price-asc",
            SortKey::PriceDesc => "price-desc",
        }
    }

    /// Parses a client-supplied sort key, falling back to `Latest` when the
    /// value is missing or unrecognised.
    pub fn parse_lenient(raw: Option<&str>) -> SortKey {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => SortKey::default(),
            Some(value) => value.parse().unwrap_or_else(|e: DiscoveryError| {
                warn!(sort = value, error = %e, "Unrecognised sort key, using latest");
                SortKey::default()
            }),
        }
    }
}

impl FromStr for SortKey {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(SortKey::Latest),
            "popular" => Ok(SortKey::Popular),
            "downloads" => Ok(SortKey::Downloads),
            "price-asc" | "price-low" => Ok(SortKey::PriceAsc),
            "price-desc" | "price-high" => Ok(SortKey::PriceDesc),
            other => Err(DiscoveryError::InvalidFilter(format!(
                "unknown sort key '{}'",
                other
            ))),
        }
    }
}

/// One optional filter field. `Unset` always matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion<T> {
    Unset,
    Is(T),
}

impl<T> Default for Criterion<T> {
    fn default() -> Self {
        Criterion::Unset
    }
}

impl<T> Criterion<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Criterion::Is(_))
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Criterion::Unset => None,
            Criterion::Is(value) => Some(value),
        }
    }

    pub fn matches(&self, predicate: impl FnOnce(&T) -> bool) -> bool {
        match self {
            Criterion::Unset => true,
            Criterion::Is(value) => predicate(value),
        }
    }
}

impl<T> From<Option<T>> for Criterion<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Criterion::Unset, Criterion::Is)
    }
}

/// Request-scoped search descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Free text; blank matches everything.
    pub query: String,
    pub category: Criterion<Category>,
    pub tool: Criterion<String>,
    pub price_range: Criterion<PriceRange>,
    /// Any-match tag set. Never `Is(vec![])`.
    pub tags: Criterion<Vec<String>>,
    pub sort: SortKey,
    /// `None` uses the configured default page size.
    pub page_size: Option<usize>,
    pub cursor: Option<PageCursor>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Criterion::Is(category);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        let tool = tool.into();
        self.tool = if tool.is_empty() {
            Criterion::Unset
        } else {
            Criterion::Is(tool)
        };
        self
    }

    pub fn with_price_range(mut self, range: PriceRange) -> Self {
        self.price_range = Criterion::Is(range);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags
            .into_iter()
            .map(Into::into)
            .filter(|tag| !tag.is_empty())
            .collect();
        self.tags = if tags.is_empty() {
            Criterion::Unset
        } else {
            Criterion::Is(tags)
        };
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn after(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Trimmed, lower-cased free text, or `None` when blank.
    pub fn normalized_query(&self) -> Option<String> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    pub fn has_predicates(&self) -> bool {
        self.normalized_query().is_some()
            || self.category.is_set()
            || self.tool.is_set()
            || self.price_range.is_set()
            || self.tags.is_set()
    }
}

/// Filter stages in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Visibility,
    Text,
    Category,
    Tool,
    PriceRange,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Repository-capable predicates and native ordering pushed down.
    Optimized,
    /// Visibility-only repository query; everything else client-side.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: FilterStage,
    pub dropped: usize,
}

/// Observability only; nothing downstream depends on these numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDiagnostics {
    pub mode: QueryMode,
    /// True when category, tool or tag predicates ran in the repository.
    pub server_filtered: bool,
    pub server_stages: Vec<FilterStage>,
    pub client_stages: Vec<StageReport>,
    pub server_sorted: bool,
    pub client_sorted: bool,
    pub fetched: usize,
    pub returned: usize,
    /// Matches beyond the page boundary, served again by the next page.
    pub deferred: usize,
    pub short_circuited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub items: Vec<ContentRecord>,
    pub next_cursor: Option<PageCursor>,
    pub diagnostics: DiscoveryDiagnostics,
}

impl DiscoveryResult {
    pub fn is_exhausted(&self) -> bool {
        self.next_cursor.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bucket_boundaries() {
        assert!(PriceRange::Free.contains(0));
        assert!(!PriceRange::UpTo5000.contains(0));
        assert!(PriceRange::UpTo5000.contains(5_000));
        assert!(!PriceRange::UpTo20000.contains(5_000));
        assert!(PriceRange::UpTo20000.contains(5_001));
        assert!(PriceRange::UpTo50000.contains(50_000));
        assert!(PriceRange::Above50000.contains(50_001));

        assert_eq!(PriceRange::for_price(0), PriceRange::Free);
        assert_eq!(PriceRange::for_price(5_000), PriceRange::UpTo5000);
        assert_eq!(PriceRange::for_price(20_001), PriceRange::UpTo50000);
    }

    #[test]
    fn test_every_price_in_exactly_one_bucket() {
        for price in [0, 1, 4_999, 5_000, 5_001, 20_000, 20_001, 50_000, 50_001, 1_000_000] {
            let hits = PriceRange::ALL.iter().filter(|r| r.contains(price)).count();
            assert_eq!(hits, 1, "price {} matched {} buckets", price, hits);
        }
    }

    #[test]
    fn test_sort_key_aliases_and_fallback() {
        assert_eq!("price-low".parse::<SortKey>().unwrap(), SortKey::PriceAsc);
        assert_eq!("price-high".parse::<SortKey>().unwrap(), SortKey::PriceDesc);
        assert!("trending".parse::<SortKey>().is_err());

        assert_eq!(SortKey::parse_lenient(Some("trending")), SortKey::Latest);
        assert_eq!(SortKey::parse_lenient(None), SortKey::Latest);
        assert_eq!(SortKey::parse_lenient(Some("popular")), SortKey::Popular);
    }

    #[test]
    fn test_category_wire_names() {
        let parsed: Category = serde_json::from_str("\"presentation\"").unwrap();
        assert_eq!(parsed, Category::Presentation);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"ppt\"");
        assert_eq!("excel".parse::<Category>().unwrap(), Category::Spreadsheet);
        assert!("hologram".parse::<Category>().is_err());
    }

    #[test]
    fn test_empty_tags_stay_unset() {
        let filter = SearchFilter::new().with_tags(Vec::<String>::new());
        assert_eq!(filter.tags, Criterion::Unset);
        assert!(!filter.has_predicates());

        let filter = SearchFilter::new().with_query("   ");
        assert!(filter.normalized_query().is_none());
    }

    #[test]
    fn test_unlike_never_goes_negative() {
        let now = Utc::now();
        let mut record = ContentRecord {
            id: "c1".to_string(),
            creator_id: "u1".to_string(),
            title: "t".to_string(),
            description: String::new(),
            category: Category::Image,
            tool: "Midjourney".to_string(),
            tags: vec![],
            price: 0,
            views: 0,
            likes: 0,
            downloads: 0,
            comments: 0,
            is_public: true,
            created_at: now,
            updated_at: now,
            ai_summary: None,
        };

        record.apply_engagement(EngagementEvent::Unlike);
        assert_eq!(record.likes, 0);
        record.apply_engagement(EngagementEvent::Like);
        record.apply_engagement(EngagementEvent::Download);
        assert_eq!(record.popularity(), 2);
    }
}
