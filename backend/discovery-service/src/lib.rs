//! Content discovery for an AI-content marketplace.
//!
//! Two entry points serve the UI: [`DiscoveryService::discover`] for
//! filtered, sorted, paginated search and
//! [`RelatedContentService::top_related`] for "related content". Both sit on
//! the [`ContentRepository`] boundary; [`InMemoryContentRepository`] models
//! the hosted store, including its missing-index failures.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod repository;
pub mod services;

pub use config::Config;
pub use models::{ContentRecord, DiscoveryResult, SearchFilter, SortKey};
pub use pagination::{PageAccumulator, PageCursor};
pub use repository::{ContentRepository, InMemoryContentRepository, IndexPolicy};
pub use services::{
    DiscoveryError, DiscoveryService, DiscoverySession, RelatedContentService, StatsService,
    SummaryService,
};
