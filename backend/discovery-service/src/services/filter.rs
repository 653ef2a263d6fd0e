//! Filter evaluator.
//!
//! Pure predicate evaluation over records already in memory. Visibility is
//! always evaluated first and cannot be switched off; every other stage runs
//! only when its filter field is set. Stages are conjunctive.

use tracing::debug;

use crate::models::{ContentRecord, FilterStage, SearchFilter, StageReport};

/// Stages the filter activates, in evaluation order.
pub fn active_stages(filter: &SearchFilter) -> Vec<FilterStage> {
    let mut stages = vec![FilterStage::Visibility];
    if filter.normalized_query().is_some() {
        stages.push(FilterStage::Text);
    }
    if filter.category.is_set() {
        stages.push(FilterStage::Category);
    }
    if filter.tool.is_set() {
        stages.push(FilterStage::Tool);
    }
    if filter.price_range.is_set() {
        stages.push(FilterStage::PriceRange);
    }
    if filter.tags.is_set() {
        stages.push(FilterStage::Tags);
    }
    stages
}

fn stage_matches(
    stage: FilterStage,
    record: &ContentRecord,
    filter: &SearchFilter,
    needle: Option<&str>,
) -> bool {
    match stage {
        FilterStage::Visibility => record.is_public,
        FilterStage::Text => needle.map_or(true, |needle| text_matches(record, needle)),
        FilterStage::Category => filter.category.matches(|c| record.category == *c),
        FilterStage::Tool => filter.tool.matches(|t| record.tool == *t),
        FilterStage::PriceRange => filter.price_range.matches(|r| r.contains(record.price)),
        FilterStage::Tags => filter
            .tags
            .matches(|tags| tags.iter().any(|tag| record.tags.contains(tag))),
    }
}

/// `needle` must already be lower-cased.
fn text_matches(record: &ContentRecord, needle: &str) -> bool {
    record.title.to_lowercase().contains(needle)
        || record.description.to_lowercase().contains(needle)
        || record
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

/// True when the record passes every active stage.
pub fn matches(record: &ContentRecord, filter: &SearchFilter) -> bool {
    let needle = filter.normalized_query();
    active_stages(filter)
        .into_iter()
        .all(|stage| stage_matches(stage, record, filter, needle.as_deref()))
}

/// Indices of the matching records, in input order, plus how many records
/// each stage dropped.
pub fn matching_indices(
    records: &[ContentRecord],
    filter: &SearchFilter,
) -> (Vec<usize>, Vec<StageReport>) {
    let needle = filter.normalized_query();
    let mut survivors: Vec<usize> = (0..records.len()).collect();
    let mut reports = Vec::new();

    for stage in active_stages(filter) {
        let before = survivors.len();
        survivors.retain(|&i| stage_matches(stage, &records[i], filter, needle.as_deref()));
        let dropped = before - survivors.len();
        debug!(stage = ?stage, dropped, remaining = survivors.len(), "Filter stage applied");
        reports.push(StageReport { stage, dropped });
    }

    (survivors, reports)
}

pub fn apply(records: &[ContentRecord], filter: &SearchFilter) -> Vec<ContentRecord> {
    apply_with_report(records, filter).0
}

pub fn apply_with_report(
    records: &[ContentRecord],
    filter: &SearchFilter,
) -> (Vec<ContentRecord>, Vec<StageReport>) {
    let (indices, reports) = matching_indices(records, filter);
    let kept = indices.into_iter().map(|i| records[i].clone()).collect();
    (kept, reports)
}
