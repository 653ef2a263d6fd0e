// ============================================
// Related Content Scorer
// ============================================
//
// Additive affinity between a reference record and a candidate:
// - same category
// - same tool
// - same creator
// - shared tags (per tag)
// - popularity (likes + downloads, scaled down)
//
// Candidates come from three small repository pools (same category, same
// tool, same creator) merged in that order. Category and tool pools hold the
// newest matches.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RelatedConfig;
use crate::models::ContentRecord;
use crate::repository::{
    ContentQuery, ContentRepository, OrderBy, OrderField, Predicate, QueryPage, RepositoryError,
};
use crate::services::{DiscoveryError, Result};

/// Configurable weights for relevance scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    /// Bonus for the same category
    pub category: f64,
    /// Bonus for the same tool
    pub tool: f64,
    /// Bonus for the same creator
    pub creator: f64,
    /// Bonus per tag present on both records
    pub shared_tag: f64,
    /// likes + downloads are divided by this
    pub popularity_divisor: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            category: 3.0,
            tool: 2.0,
            creator: 1.0,
            shared_tag: 0.5,
            popularity_divisor: 100.0,
        }
    }
}

/// A related record with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredContent {
    #[serde(flatten)]
    pub record: ContentRecord,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: RelevanceWeights,
}

impl RelevanceScorer {
    pub fn new(weights: RelevanceWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, reference: &ContentRecord, candidate: &ContentRecord) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if candidate.category == reference.category {
            score += w.category;
        }
        if candidate.tool == reference.tool {
            score += w.tool;
        }
        if candidate.creator_id == reference.creator_id {
            score += w.creator;
        }

        let candidate_tags: HashSet<&str> = candidate.tags.iter().map(String::as_str).collect();
        let shared = candidate_tags
            .iter()
            .filter(|tag| reference.tags.iter().any(|r| r == *tag))
            .count();
        score += w.shared_tag * shared as f64;

        if w.popularity_divisor > 0.0 {
            score += candidate.popularity() as f64 / w.popularity_divisor;
        }

        score
    }

    /// Best `limit` candidates by score. The reference itself and private
    /// records never qualify; repeated ids keep their first occurrence, and
    /// equal scores keep pool order.
    pub fn top_related(
        &self,
        reference: &ContentRecord,
        pool: impl IntoIterator<Item = ContentRecord>,
        limit: usize,
    ) -> Vec<ScoredContent> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut scored: Vec<ScoredContent> = pool
            .into_iter()
            .filter(|candidate| candidate.id != reference.id && candidate.is_public)
            .filter(|candidate| seen.insert(candidate.id.clone()))
            .map(|record| ScoredContent {
                score: self.score(reference, &record),
                record,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Pool sources, queried concurrently.
#[derive(Debug, Clone, Copy)]
enum PoolSource {
    Category,
    Tool,
    Creator,
}

pub struct RelatedContentService {
    repository: Arc<dyn ContentRepository>,
    scorer: RelevanceScorer,
    config: RelatedConfig,
}

impl RelatedContentService {
    pub fn new(repository: Arc<dyn ContentRepository>, config: RelatedConfig) -> Self {
        Self {
            repository,
            scorer: RelevanceScorer::new(config.weights),
            config,
        }
    }

    /// Related content for the record `reference_id`.
    pub async fn top_related(
        &self,
        reference_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredContent>> {
        let limit = limit.unwrap_or(self.config.default_limit);

        let reference = self
            .repository
            .get(reference_id)
            .await
            .map_err(|e| DiscoveryError::RepositoryUnavailable(e.to_string()))?
            .filter(|record| record.is_public)
            .ok_or_else(|| DiscoveryError::NotFound(reference_id.to_string()))?;

        if limit == 0 {
            return Ok(Vec::new());
        }

        let pool = self.candidate_pool(&reference).await?;
        let related = self.scorer.top_related(&reference, pool, limit);

        info!(
            reference_id,
            returned = related.len(),
            "Related content ranked"
        );

        Ok(related)
    }

    async fn candidate_pool(&self, reference: &ContentRecord) -> Result<Vec<ContentRecord>> {
        // One extra row per pool since the reference usually matches its own query.
        let newest = Some(OrderBy::desc(OrderField::CreatedAt));
        let category_query = ContentQuery::new(self.config.category_pool + 1)
            .filter(Predicate::Visibility(true))
            .filter(Predicate::CategoryEq(reference.category))
            .order_by(newest);
        let tool_query = ContentQuery::new(self.config.tool_pool + 1)
            .filter(Predicate::Visibility(true))
            .filter(Predicate::ToolEq(reference.tool.clone()))
            .order_by(newest);
        let creator_query = ContentQuery::new(self.config.creator_pool + 1)
            .filter(Predicate::Visibility(true))
            .filter(Predicate::CreatorEq(reference.creator_id.clone()));

        let (by_category, by_tool, by_creator) = tokio::join!(
            self.load_pool(PoolSource::Category, category_query),
            self.load_pool(PoolSource::Tool, tool_query),
            self.load_pool(PoolSource::Creator, creator_query),
        );

        let mut pool = Vec::new();
        let mut failures: Vec<RepositoryError> = Vec::new();

        for (source, outcome) in [
            (PoolSource::Category, by_category),
            (PoolSource::Tool, by_tool),
            (PoolSource::Creator, by_creator),
        ] {
            match outcome {
                Ok(page) => {
                    debug!(source = ?source, candidates = page.records.len(), "Related pool loaded");
                    pool.extend(page.records);
                }
                Err(e) => {
                    warn!(source = ?source, error = %e, "Related pool source failed");
                    failures.push(e);
                }
            }
        }

        if failures.len() == 3 {
            let reason = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DiscoveryError::RepositoryUnavailable(reason));
        }

        Ok(pool)
    }

    /// An ordered pool that needs a missing composite index is retried once
    /// in the store's default order.
    async fn load_pool(
        &self,
        source: PoolSource,
        query: ContentQuery,
    ) -> std::result::Result<QueryPage, RepositoryError> {
        match self.repository.query(query.clone()).await {
            Err(e) if e.is_missing_index() && query.order_by.is_some() => {
                warn!(source = ?source, error = %e, "Related pool index missing, retrying unordered");
                self.repository.query(query.order_by(None)).await
            }
            outcome => outcome,
        }
    }
}
