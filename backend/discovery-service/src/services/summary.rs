// ============================================
// AI Summaries
// ============================================
//
// A record carries at most one cached summary. The provider is only called
// when the cache is empty, a regeneration is requested, or a backfill run
// finds public records that were never summarized.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SummaryConfig;
use crate::models::ContentRecord;
use crate::repository::{
    ContentQuery, ContentRepository, OrderBy, OrderField, Predicate, QueryPage, RepositoryError,
};
use crate::services::{DiscoveryError, Result};

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("summary provider is not configured")]
    NotConfigured,

    #[error("summary request failed: {0}")]
    Request(String),

    #[error("summary provider returned no text")]
    EmptyResponse,

    #[error("unexpected summary response: {0}")]
    InvalidResponse(String),
}

/// Fields a summary is generated from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tool: String,
    pub tags: Vec<String>,
}

impl From<&ContentRecord> for SummaryRequest {
    fn from(record: &ContentRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            category: record.category.as_str().to_string(),
            tool: record.tool.clone(),
            tags: record.tags.clone(),
        }
    }
}

impl SummaryRequest {
    fn prompt(&self) -> String {
        let tags = if self.tags.is_empty() {
            "none".to_string()
        } else {
            self.tags.join(", ")
        };
        format!(
            "Summarize the following marketplace item in two or three sentences for a potential buyer.\n\
             Title: {}\nCategory: {}\nTool: {}\nTags: {}\nDescription: {}",
            self.title, self.category, self.tool, tags, self.description
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<String, SummaryError>;
}

// ============================================
// Generative Language Provider
// ============================================

pub struct GenerativeSummaryProvider {
    client: HttpClient,
    api_url: String,
    api_key: String,
    model: String,
}

impl GenerativeSummaryProvider {
    pub fn new(config: &SummaryConfig) -> std::result::Result<Self, SummaryError> {
        let api_key = config.api_key.clone().ok_or(SummaryError::NotConfigured)?;
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummaryError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GenerateContent {
    parts: Vec<GeneratePart>,
}

#[derive(Serialize, Deserialize)]
struct GeneratePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Deserialize)]
struct GenerateCandidate {
    content: Option<GenerateContent>,
}

#[async_trait]
impl SummaryProvider for GenerativeSummaryProvider {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<String, SummaryError> {
        let body = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart {
                    text: request.prompt(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 500,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.api_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SummaryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SummaryError::Request(format!("{}: {}", status, error_text)));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .map(|part| part.text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(SummaryError::EmptyResponse);
        }
        Ok(text)
    }
}

// ============================================
// Summary Service
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub content_id: String,
    pub summary: String,
    /// False when the text was generated by this call.
    pub cached: bool,
}

/// Result of one record in a backfill run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillOutcome {
    pub content_id: String,
    pub title: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// Public records scanned.
    pub total_contents: usize,
    pub needs_summary: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<BackfillOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCoverage {
    pub total_contents: usize,
    pub with_summary: usize,
    pub without_summary: usize,
    /// Rounded percentage, 0 for an empty scan.
    pub completion_rate: u32,
}

fn has_summary(record: &ContentRecord) -> bool {
    record
        .ai_summary
        .as_deref()
        .is_some_and(|summary| !summary.trim().is_empty())
}

pub struct SummaryService {
    repository: Arc<dyn ContentRepository>,
    provider: Option<Arc<dyn SummaryProvider>>,
    backfill_limit: usize,
    backfill_delay: Duration,
}

impl SummaryService {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        provider: Option<Arc<dyn SummaryProvider>>,
    ) -> Self {
        let defaults = SummaryConfig::default();
        Self {
            repository,
            provider,
            backfill_limit: defaults.backfill_limit,
            backfill_delay: Duration::from_millis(defaults.backfill_delay_ms),
        }
    }

    /// Scan size and pause between provider calls for backfill runs.
    pub fn with_backfill(mut self, limit: usize, delay: Duration) -> Self {
        self.backfill_limit = limit;
        self.backfill_delay = delay;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// The cached summary, generating and storing one if there is none.
    pub async fn summary_for(&self, content_id: &str) -> Result<ContentSummary> {
        let record = self.load(content_id).await?;
        if let Some(summary) = record.ai_summary.as_ref().filter(|_| has_summary(&record)) {
            debug!(content_id, "Serving cached summary");
            return Ok(ContentSummary {
                content_id: record.id.clone(),
                summary: summary.clone(),
                cached: true,
            });
        }
        self.generate(&record).await
    }

    /// Always calls the provider and replaces the cached summary.
    pub async fn regenerate(&self, content_id: &str) -> Result<ContentSummary> {
        let record = self.load(content_id).await?;
        self.generate(&record).await
    }

    /// Generates summaries for the newest public records that have none.
    /// Per-record failures are reported in the outcome list and do not stop
    /// the run.
    pub async fn backfill_missing(&self, limit: Option<usize>) -> Result<BackfillReport> {
        let provider = self.provider.as_ref().ok_or(SummaryError::NotConfigured)?;
        let scanned = self.newest_public(limit.unwrap_or(self.backfill_limit)).await?;
        let pending: Vec<&ContentRecord> = scanned.iter().filter(|r| !has_summary(r)).collect();

        info!(
            scanned = scanned.len(),
            pending = pending.len(),
            "Summary backfill started"
        );

        let mut results = Vec::with_capacity(pending.len());
        for (i, record) in pending.iter().enumerate() {
            if i > 0 && !self.backfill_delay.is_zero() {
                tokio::time::sleep(self.backfill_delay).await;
            }

            let outcome = match provider.summarize(&SummaryRequest::from(*record)).await {
                Ok(summary) => match self.repository.store_summary(&record.id, &summary).await {
                    Ok(()) => Ok(summary),
                    Err(e) => Err(e.to_string()),
                },
                Err(e) => Err(e.to_string()),
            };

            results.push(match outcome {
                Ok(summary) => BackfillOutcome {
                    content_id: record.id.clone(),
                    title: record.title.clone(),
                    success: true,
                    summary: Some(summary),
                    error: None,
                },
                Err(error) => {
                    warn!(content_id = %record.id, error = %error, "Summary backfill failed for record");
                    BackfillOutcome {
                        content_id: record.id.clone(),
                        title: record.title.clone(),
                        success: false,
                        summary: None,
                        error: Some(error),
                    }
                }
            });
        }

        let success_count = results.iter().filter(|r| r.success).count();
        let report = BackfillReport {
            total_contents: scanned.len(),
            needs_summary: pending.len(),
            success_count,
            error_count: results.len() - success_count,
            results,
        };

        info!(
            succeeded = report.success_count,
            failed = report.error_count,
            "Summary backfill finished"
        );
        Ok(report)
    }

    /// How many of the newest public records already carry a summary.
    pub async fn coverage(&self, limit: Option<usize>) -> Result<SummaryCoverage> {
        let scanned = self.newest_public(limit.unwrap_or(self.backfill_limit)).await?;
        let with_summary = scanned.iter().filter(|r| has_summary(r)).count();
        let completion_rate = if scanned.is_empty() {
            0
        } else {
            (with_summary as f64 / scanned.len() as f64 * 100.0).round() as u32
        };

        Ok(SummaryCoverage {
            total_contents: scanned.len(),
            with_summary,
            without_summary: scanned.len() - with_summary,
            completion_rate,
        })
    }

    async fn newest_public(&self, limit: usize) -> Result<Vec<ContentRecord>> {
        let query = ContentQuery::new(limit)
            .filter(Predicate::Visibility(true))
            .order_by(Some(OrderBy::desc(OrderField::CreatedAt)));

        let page: std::result::Result<QueryPage, RepositoryError> =
            match self.repository.query(query.clone()).await {
                Err(e) if e.is_missing_index() => {
                    warn!(error = %e, "Newest-first scan needs a missing index, scanning in default order");
                    self.repository.query(query.order_by(None)).await
                }
                outcome => outcome,
            };

        page.map(|page| page.records)
            .map_err(|e| DiscoveryError::RepositoryUnavailable(e.to_string()))
    }

    async fn load(&self, content_id: &str) -> Result<ContentRecord> {
        self.repository
            .get(content_id)
            .await
            .map_err(|e| DiscoveryError::RepositoryUnavailable(e.to_string()))?
            .filter(|record| record.is_public)
            .ok_or_else(|| DiscoveryError::NotFound(content_id.to_string()))
    }

    async fn generate(&self, record: &ContentRecord) -> Result<ContentSummary> {
        let provider = self.provider.as_ref().ok_or(SummaryError::NotConfigured)?;
        let summary = provider.summarize(&SummaryRequest::from(record)).await?;

        self.repository
            .store_summary(&record.id, &summary)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(id) => DiscoveryError::NotFound(id),
                other => DiscoveryError::RepositoryUnavailable(other.to_string()),
            })?;

        info!(content_id = %record.id, chars = summary.len(), "Summary generated and cached");
        Ok(ContentSummary {
            content_id: record.id.clone(),
            summary,
            cached: false,
        })
    }
}
