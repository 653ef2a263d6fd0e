//! Page cursors and "load more" accumulation.
//!
//! A [`PageCursor`] is opaque to callers. Internally it records the query
//! mode and sort it was issued under, and the repository position of the
//! last record the page consumed.
//!
//! There is no snapshot isolation: a record inserted or re-ordered between
//! two page fetches may be skipped or seen twice. [`PageAccumulator`] drops
//! repeats by id; skips are an accepted limitation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::models::{ContentRecord, DiscoveryResult, QueryMode, SortKey};
use crate::repository::RepositoryCursor;
use crate::services::{DiscoveryError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CursorState {
    pub mode: QueryMode,
    pub sort: SortKey,
    pub position: RepositoryCursor,
}

impl PageCursor {
    /// Wraps a cursor string received from a client. Validity is checked
    /// when the cursor is used.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn encode(state: &CursorState) -> Result<Self> {
        let json = serde_json::to_vec(state)
            .map_err(|e| DiscoveryError::InvalidCursor(format!("failed to encode cursor: {}", e)))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(json)))
    }

    pub(crate) fn decode(&self) -> Result<CursorState> {
        let bytes = URL_SAFE_NO_PAD
            .decode(self.0.as_bytes())
            .map_err(|_| DiscoveryError::InvalidCursor("invalid cursor format".to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| DiscoveryError::InvalidCursor("invalid cursor value".to_string()))
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clamp a requested page size to `[1, max]`, defaulting when absent.
pub fn clamp_page_size(requested: Option<usize>, default: usize, max: usize) -> usize {
    let max = max.max(1);
    requested.unwrap_or(default).clamp(1, max)
}

/// Running result list for infinite-scroll style pagination.
#[derive(Debug, Default)]
pub struct PageAccumulator {
    items: Vec<ContentRecord>,
    seen: HashSet<String>,
    next_cursor: Option<PageCursor>,
    pages: usize,
}

impl PageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with a first page.
    pub fn replace(&mut self, result: DiscoveryResult) -> usize {
        self.items.clear();
        self.seen.clear();
        self.pages = 0;
        self.append(result)
    }

    /// Append a page, skipping ids already present. Returns how many records
    /// were added.
    pub fn append(&mut self, result: DiscoveryResult) -> usize {
        let before = self.items.len();
        for record in result.items {
            if self.seen.insert(record.id.clone()) {
                self.items.push(record);
            }
        }
        self.next_cursor = result.next_cursor;
        self.pages += 1;
        self.items.len() - before
    }

    pub fn items(&self) -> &[ContentRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn next_cursor(&self) -> Option<&PageCursor> {
        self.next_cursor.as_ref()
    }

    /// True once a page has been loaded and no continuation exists.
    pub fn is_exhausted(&self) -> bool {
        self.pages > 0 && self.next_cursor.is_none()
    }
}
