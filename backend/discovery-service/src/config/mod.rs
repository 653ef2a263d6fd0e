/// Configuration management for Discovery Service
///
/// Everything is read from environment variables; `main` loads a `.env`
/// file first when one exists.
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::pagination::DEFAULT_PAGE_SIZE;
use crate::services::RelevanceWeights;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Query planning and page sizes
    pub discovery: DiscoveryConfig,
    /// Related content pools and weights
    pub related: RelatedConfig,
    /// Generative summary endpoint
    pub summary: SummaryConfig,
    /// Catalog seed data and declared indexes
    pub catalog: CatalogConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8085,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub page_size: usize,
    pub max_page_size: usize,
    /// Repository rows requested per page in optimized mode, as a multiple
    /// of the page size.
    pub over_fetch_multiplier: usize,
    /// Same, for the visibility-only fallback query.
    pub fallback_multiplier: usize,
    /// Larger tag sets are matched client-side.
    pub max_server_tags: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 60,
            over_fetch_multiplier: 2,
            fallback_multiplier: 3,
            max_server_tags: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedConfig {
    pub default_limit: usize,
    pub category_pool: usize,
    pub tool_pool: usize,
    pub creator_pool: usize,
    pub weights: RelevanceWeights,
}

impl Default for RelatedConfig {
    fn default() -> Self {
        Self {
            default_limit: 4,
            category_pool: 8,
            tool_pool: 6,
            creator_pool: 4,
            weights: RelevanceWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub api_url: String,
    /// Summaries are disabled when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Newest public records scanned per backfill run.
    pub backfill_limit: usize,
    /// Pause between provider calls during a backfill run.
    pub backfill_delay_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 30,
            backfill_limit: 100,
            backfill_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON array of content records loaded at startup.
    pub seed_path: Option<String>,
    /// `;`-separated composite index list. `None` serves every query shape.
    pub indexes: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let discovery_defaults = DiscoveryConfig::default();
        let discovery = DiscoveryConfig {
            page_size: parse_env_or_default("DISCOVERY_PAGE_SIZE", discovery_defaults.page_size)?,
            max_page_size: parse_env_or_default(
                "DISCOVERY_MAX_PAGE_SIZE",
                discovery_defaults.max_page_size,
            )?,
            over_fetch_multiplier: parse_env_or_default(
                "DISCOVERY_OVER_FETCH_MULTIPLIER",
                discovery_defaults.over_fetch_multiplier,
            )?,
            fallback_multiplier: parse_env_or_default(
                "DISCOVERY_FALLBACK_MULTIPLIER",
                discovery_defaults.fallback_multiplier,
            )?,
            max_server_tags: parse_env_or_default(
                "DISCOVERY_MAX_SERVER_TAGS",
                discovery_defaults.max_server_tags,
            )?,
        };
        discovery.validate()?;

        let related_defaults = RelatedConfig::default();
        let weight_defaults = related_defaults.weights;
        let related = RelatedConfig {
            default_limit: parse_env_or_default(
                "RELATED_DEFAULT_LIMIT",
                related_defaults.default_limit,
            )?,
            category_pool: parse_env_or_default(
                "RELATED_CATEGORY_POOL",
                related_defaults.category_pool,
            )?,
            tool_pool: parse_env_or_default("RELATED_TOOL_POOL", related_defaults.tool_pool)?,
            creator_pool: parse_env_or_default(
                "RELATED_CREATOR_POOL",
                related_defaults.creator_pool,
            )?,
            weights: RelevanceWeights {
                category: parse_env_or_default(
                    "RELATED_CATEGORY_WEIGHT",
                    weight_defaults.category,
                )?,
                tool: parse_env_or_default("RELATED_TOOL_WEIGHT", weight_defaults.tool)?,
                creator: parse_env_or_default("RELATED_CREATOR_WEIGHT", weight_defaults.creator)?,
                shared_tag: parse_env_or_default(
                    "RELATED_SHARED_TAG_WEIGHT",
                    weight_defaults.shared_tag,
                )?,
                popularity_divisor: parse_env_or_default(
                    "RELATED_POPULARITY_DIVISOR",
                    weight_defaults.popularity_divisor,
                )?,
            },
        };
        if related.weights.popularity_divisor <= 0.0 {
            return Err("RELATED_POPULARITY_DIVISOR must be positive".to_string());
        }

        let summary_defaults = SummaryConfig::default();
        let summary = SummaryConfig {
            api_url: std::env::var("SUMMARY_API_URL").unwrap_or(summary_defaults.api_url),
            api_key: std::env::var("SUMMARY_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: std::env::var("SUMMARY_MODEL").unwrap_or(summary_defaults.model),
            timeout_secs: parse_env_or_default(
                "SUMMARY_TIMEOUT_SECS",
                summary_defaults.timeout_secs,
            )?,
            backfill_limit: parse_env_or_default(
                "SUMMARY_BACKFILL_LIMIT",
                summary_defaults.backfill_limit,
            )?,
            backfill_delay_ms: parse_env_or_default(
                "SUMMARY_BACKFILL_DELAY_MS",
                summary_defaults.backfill_delay_ms,
            )?,
        };

        Ok(Config {
            app: AppConfig {
                env: app_env,
                host: std::env::var("DISCOVERY_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("DISCOVERY_SERVICE_PORT", 8085)?,
            },
            discovery,
            related,
            summary,
            catalog: CatalogConfig {
                seed_path: std::env::var("CATALOG_SEED_PATH").ok(),
                indexes: std::env::var("CATALOG_INDEXES").ok(),
            },
        })
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 || self.max_page_size == 0 {
            return Err("DISCOVERY_PAGE_SIZE and DISCOVERY_MAX_PAGE_SIZE must be positive".to_string());
        }
        if self.page_size > self.max_page_size {
            return Err(format!(
                "DISCOVERY_PAGE_SIZE ({}) exceeds DISCOVERY_MAX_PAGE_SIZE ({})",
                self.page_size, self.max_page_size
            ));
        }
        if self.over_fetch_multiplier == 0 || self.fallback_multiplier == 0 {
            return Err("discovery fetch multipliers must be at least 1".to_string());
        }
        Ok(())
    }
}

fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, val, e)),
        Err(_) => Ok(default),
    }
}
