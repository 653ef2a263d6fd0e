#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use discovery_service::models::Category;
use discovery_service::ContentRecord;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
}

pub fn record(id: &str, category: Category, minutes: i64) -> ContentRecord {
    let created = base_time() + Duration::minutes(minutes);
    ContentRecord {
        id: id.to_string(),
        creator_id: "creator-1".to_string(),
        title: format!("Item {}", id),
        description: format!("Generated {} content", category),
        category,
        tool: "ChatGPT".to_string(),
        tags: vec!["ai".to_string()],
        price: 0,
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

/// 14 public decks, 6 public images and 5 private decks.
pub fn marketplace() -> Vec<ContentRecord> {
    let mut records = Vec::new();
    for i in 0..14 {
        let mut deck = record(&format!("deck-{:02}", i), Category::Presentation, i);
        deck.price = (i as u64 % 4) * 4_000;
        deck.likes = (i as u64 * 7) % 11;
        deck.downloads = (i as u64 * 3) % 5;
        if i % 3 == 0 {
            deck.tags.push("sales".to_string());
        }
        records.push(deck);
    }
    for i in 0..6 {
        let mut image = record(&format!("img-{:02}", i), Category::Image, 100 + i);
        image.tool = "Midjourney".to_string();
        image.price = 12_000;
        records.push(image);
    }
    for i in 0..5 {
        let mut hidden = record(&format!("private-{:02}", i), Category::Presentation, 200 + i);
        hidden.is_public = false;
        records.push(hidden);
    }
    records
}
