//! Sort comparator shared by every discovery path.

use std::cmp::Ordering;

use crate::models::{ContentRecord, SortKey};
use crate::repository::{OrderBy, OrderField};

/// Ordering of two records under `key`. `Equal` means "keep prior order".
pub fn compare(a: &ContentRecord, b: &ContentRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Latest => b.created_at.cmp(&a.created_at),
        SortKey::Popular => b.popularity().cmp(&a.popularity()),
        SortKey::Downloads => b.downloads.cmp(&a.downloads),
        SortKey::PriceAsc => a.price.cmp(&b.price),
        SortKey::PriceDesc => b.price.cmp(&a.price),
    }
}

/// Stable in-place sort.
pub fn sort_records(records: &mut [ContentRecord], key: SortKey) {
    records.sort_by(|a, b| compare(a, b, key));
}

pub fn sorted(mut records: Vec<ContentRecord>, key: SortKey) -> Vec<ContentRecord> {
    sort_records(&mut records, key);
    records
}

/// Repository ordering equivalent to `key`, if the store can order by it.
/// Popularity is a derived sum and has none.
pub fn native_order(key: SortKey) -> Option<OrderBy> {
    match key {
        SortKey::Latest => Some(OrderBy::desc(OrderField::CreatedAt)),
        SortKey::Downloads => Some(OrderBy::desc(OrderField::Downloads)),
        SortKey::PriceAsc => Some(OrderBy::asc(OrderField::Price)),
        SortKey::PriceDesc => Some(OrderBy::desc(OrderField::Price)),
        SortKey::Popular => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, minutes: i64, likes: u64, downloads: u64, price: u64) -> ContentRecord {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes);
        ContentRecord {
            id: id.to_string(),
            creator_id: "creator".to_string(),
            title: id.to_string(),
            description: String::new(),
            category: Category::Code,
            tool: "Cursor".to_string(),
            tags: vec![],
            price,
            views: 0,
            likes,
            downloads,
            comments: 0,
            is_public: true,
            created_at: created,
            updated_at: created,
            ai_summary: None,
        }
    }

    fn ids(records: &[ContentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample() -> Vec<ContentRecord> {
        vec![
            record("a", 1, 5, 0, 300),
            record("b", 3, 1, 4, 100),
            record("c", 2, 0, 9, 300),
            record("d", 3, 2, 1, 0),
        ]
    }

    #[test]
    fn test_latest_keeps_ties_in_input_order() {
        assert_eq!(ids(&sorted(sample(), SortKey::Latest)), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_popular_sums_likes_and_downloads() {
        // a=5, b=5, c=9, d=3
        assert_eq!(ids(&sorted(sample(), SortKey::Popular)), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_downloads_and_price_orders() {
        assert_eq!(ids(&sorted(sample(), SortKey::Downloads)), vec!["c", "b", "d", "a"]);
        assert_eq!(ids(&sorted(sample(), SortKey::PriceAsc)), vec!["d", "b", "a", "c"]);
        assert_eq!(ids(&sorted(sample(), SortKey::PriceDesc)), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_sorting_twice_is_idempotent() {
        for key in [
            SortKey::Latest,
            SortKey::Popular,
            SortKey::Downloads,
            SortKey::PriceAsc,
            SortKey::PriceDesc,
        ] {
            let once = sorted(sample(), key);
            let twice = sorted(once.clone(), key);
            assert_eq!(once, twice, "{:?} not idempotent", key);
        }
    }

    #[test]
    fn test_native_order_mapping() {
        assert_eq!(native_order(SortKey::Popular), None);
        assert_eq!(
            native_order(SortKey::Latest),
            Some(OrderBy::desc(OrderField::CreatedAt))
        );
        assert_eq!(
            native_order(SortKey::PriceAsc),
            Some(OrderBy::asc(OrderField::Price))
        );
    }
}
