//! Search query construction, term debouncing and request staleness
//!
//! Paged results come back from the network in whatever order the network
//! likes. This module decides *which* responses are allowed to land:
//!
//! ```text
//! term edit ──▶ Debouncer (300ms quiet) ──┐
//! filter / page / size change ────────────┼──▶ FetchController::issue ──▶ ticket
//!                                         │        (identical query? suppressed)
//! response(ticket) ──▶ FetchController::accept ──▶ only the latest ticket lands
//! ```

use crate::model::{Filter, PageSize};
use tokio::time::{Duration, Instant};

/// Sort order requested from the search service (fixed)
pub const SORT_ORDER: &str = "timestamp:desc";

// ─────────────────────────────────────────────────────────────────────────────
// SearchQuery
// ─────────────────────────────────────────────────────────────────────────────

/// A single paged search request as a plain value
///
/// Two queries that compare equal are the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub filters: Vec<Filter>,
    /// 1-based
    pub page: u32,
    pub page_size: PageSize,
}

impl SearchQuery {
    pub fn new(term: &str, filters: &[Filter], page: u32, page_size: PageSize) -> Self {
        Self {
            term: term.to_string(),
            filters: filters.to_vec(),
            page: page.max(1),
            page_size,
        }
    }

    /// Query-string parameters in wire order
    ///
    /// `q` is omitted for an empty term; filters follow in insertion order and
    /// may repeat a key.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.filters.len() + 4);
        if !self.term.is_empty() {
            params.push(("q".to_string(), self.term.clone()));
        }
        for filter in &self.filters {
            params.push((filter.key.clone(), filter.value.clone()));
        }
        params.push(("page".to_string(), self.page.to_string()));
        params.push(("page_size".to_string(), self.page_size.to_string()));
        params.push(("sort".to_string(), SORT_ORDER.to_string()));
        params
    }
}

/// Number of pages for a server-side hit count
pub fn total_pages(server_total: u64, page_size: PageSize) -> u64 {
    server_total.div_ceil(page_size.get() as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Debouncer
// ─────────────────────────────────────────────────────────────────────────────

/// Retriggerable quiet-period timer holding the latest pending value
///
/// Every `schedule` replaces the pending value and pushes the deadline out.
/// The value is released by `fire` once `now` reaches the deadline.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.quiet));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    pub fn fire(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, at)) if now >= at => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FetchController
// ─────────────────────────────────────────────────────────────────────────────

/// Tag carried by an in-flight search so its response can be validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: u64,
    /// Mode epoch the request was issued under
    pub mode_epoch: u64,
}

/// Issues search tickets and enforces last-request-wins
#[derive(Debug, Default)]
pub struct FetchController {
    next_id: u64,
    /// Latest issued ticket and the query it carries
    latest: Option<(FetchTicket, SearchQuery)>,
    /// Query of the latest ticket, kept until the ticket fails or is invalidated
    last_issued: Option<SearchQuery>,
}

impl FetchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for `query`, unless it equals the last issued query
    pub fn issue(&mut self, query: SearchQuery, mode_epoch: u64) -> Option<FetchTicket> {
        if self.last_issued.as_ref() == Some(&query) {
            tracing::trace!(page = query.page, "search suppressed: identical to last request");
            return None;
        }
        self.next_id += 1;
        let ticket = FetchTicket {
            id: self.next_id,
            mode_epoch,
        };
        self.last_issued = Some(query.clone());
        self.latest = Some((ticket, query));
        Some(ticket)
    }

    /// Whether a response for `ticket` may be applied
    pub fn accept(&self, ticket: &FetchTicket) -> bool {
        matches!(&self.latest, Some((latest, _)) if latest == ticket)
    }

    /// Query carried by `ticket`, if it is still the latest
    pub fn query_for(&self, ticket: &FetchTicket) -> Option<&SearchQuery> {
        match &self.latest {
            Some((latest, query)) if latest == ticket => Some(query),
            _ => None,
        }
    }

    /// Record a failed request so an identical follow-up is not suppressed
    pub fn fail(&mut self, ticket: &FetchTicket) {
        if self.accept(ticket) {
            self.last_issued = None;
        }
    }

    /// Drop every in-flight ticket and forget the last query
    pub fn invalidate(&mut self) {
        self.latest = None;
        self.last_issued = None;
    }

}
