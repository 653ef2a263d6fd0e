//! Discovery services
//!
//! - **filter / sort**: the single shared filter evaluator and sort
//!   comparator every call site goes through
//! - **discovery**: query planning, repository push-down, degraded fallback
//! - **related**: relevance scoring for "related content"
//! - **session**: last-request-wins sequencing and "load more" accumulation
//! - **stats / summary**: catalog statistics and cached AI summaries
pub mod discovery;
pub mod filter;
pub mod related;
pub mod session;
pub mod sort;
pub mod stats;
pub mod summary;

pub use discovery::DiscoveryService;
pub use related::{RelatedContentService, RelevanceScorer, RelevanceWeights, ScoredContent};
pub use session::{Applied, DiscoverySession, RequestTicket};
pub use stats::{PlatformStats, StatsService};
pub use summary::{
    BackfillOutcome, BackfillReport, ContentSummary, GenerativeSummaryProvider, SummaryCoverage,
    SummaryError, SummaryProvider, SummaryRequest, SummaryService,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Content repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Summary generation failed: {0}")]
    Summary(#[from] SummaryError),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
