// ============================================
// Discovery Session
// ============================================
//
// Per-client discovery state with last-request-wins sequencing.
//
// - Every request gets a ticket with a monotonically increasing sequence.
// - A new search starts a new generation; load-more continues the current one.
// - A result is applied only if its ticket belongs to the current generation
//   and nothing newer has been applied. Superseded requests are not aborted;
//   their results are simply discarded.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{ContentRecord, DiscoveryDiagnostics, DiscoveryResult, SearchFilter};
use crate::pagination::PageAccumulator;
use crate::services::{DiscoveryService, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Search,
    LoadMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub sequence: u64,
    pub generation: u64,
    pub kind: RequestKind,
}

/// What applying a result did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A search result replaced the list.
    Replaced { items: usize },
    /// A load-more page added this many new records.
    Appended { added: usize },
    /// Superseded; the session was left untouched.
    Stale,
}

#[derive(Debug, Default)]
struct SessionState {
    filter: SearchFilter,
    generation: u64,
    next_sequence: u64,
    applied_sequence: u64,
    /// Generation the accumulator currently holds.
    loaded_generation: Option<u64>,
    accumulator: PageAccumulator,
    diagnostics: Option<DiscoveryDiagnostics>,
}

impl SessionState {
    fn issue(&mut self, kind: RequestKind) -> RequestTicket {
        self.next_sequence += 1;
        RequestTicket {
            sequence: self.next_sequence,
            generation: self.generation,
            kind,
        }
    }

    fn is_current(&self, ticket: &RequestTicket) -> bool {
        ticket.generation == self.generation && ticket.sequence > self.applied_sequence
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub filter: SearchFilter,
    pub items: Vec<ContentRecord>,
    pub pages: usize,
    pub exhausted: bool,
    pub diagnostics: Option<DiscoveryDiagnostics>,
}

pub struct DiscoverySession {
    service: Arc<DiscoveryService>,
    state: Mutex<SessionState>,
}

impl DiscoverySession {
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self {
            service,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Start a new search. Any request issued earlier becomes stale.
    pub async fn begin_search(&self, filter: SearchFilter) -> (RequestTicket, SearchFilter) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.filter = SearchFilter {
            cursor: None,
            ..filter
        };
        let ticket = state.issue(RequestKind::Search);
        debug!(sequence = ticket.sequence, generation = ticket.generation, "Search issued");
        (ticket, state.filter.clone())
    }

    /// Continue the current search from its last cursor. `None` when nothing
    /// has been loaded for the current search yet or it is exhausted.
    pub async fn begin_load_more(&self) -> Option<(RequestTicket, SearchFilter)> {
        let mut state = self.state.lock().await;
        if state.loaded_generation != Some(state.generation) {
            return None;
        }
        let cursor = state.accumulator.next_cursor()?.clone();
        let filter = state.filter.clone().after(cursor);
        let ticket = state.issue(RequestKind::LoadMore);
        debug!(sequence = ticket.sequence, generation = ticket.generation, "Load more issued");
        Some((ticket, filter))
    }

    /// Apply the outcome of a ticketed request. Failures of stale requests
    /// are swallowed; failures of current ones are returned unchanged.
    pub async fn apply(
        &self,
        ticket: RequestTicket,
        outcome: Result<DiscoveryResult>,
    ) -> Result<Applied> {
        let mut state = self.state.lock().await;
        if !state.is_current(&ticket) {
            debug!(
                sequence = ticket.sequence,
                generation = ticket.generation,
                current_generation = state.generation,
                "Discarding stale discovery result"
            );
            return Ok(Applied::Stale);
        }

        let result = outcome?;
        state.applied_sequence = ticket.sequence;
        state.diagnostics = Some(result.diagnostics.clone());

        let applied = match ticket.kind {
            RequestKind::Search => {
                let items = state.accumulator.replace(result);
                state.loaded_generation = Some(ticket.generation);
                Applied::Replaced { items }
            }
            RequestKind::LoadMore => Applied::Appended {
                added: state.accumulator.append(result),
            },
        };
        Ok(applied)
    }

    pub async fn search(&self, filter: SearchFilter) -> Result<Applied> {
        let (ticket, filter) = self.begin_search(filter).await;
        let outcome = self.service.discover(&filter).await;
        self.apply(ticket, outcome).await
    }

    /// `Ok(None)` when there is nothing more to load.
    pub async fn load_more(&self) -> Result<Option<Applied>> {
        let Some((ticket, filter)) = self.begin_load_more().await else {
            return Ok(None);
        };
        let outcome = self.service.discover(&filter).await;
        self.apply(ticket, outcome).await.map(Some)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            filter: state.filter.clone(),
            items: state.accumulator.items().to_vec(),
            pages: state.accumulator.pages(),
            exhausted: state.accumulator.is_exhausted(),
            diagnostics: state.diagnostics.clone(),
        }
    }
}
