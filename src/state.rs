//! Console state container
//!
//! Single owner of everything the console displays: search inputs, paging,
//! the active view, selection, context and the chat session. All mutation
//! goes through methods on [`ConsoleState`]; none of them perform I/O.
//! Instead they return [`Effect`]s for the event loop to carry out, and every
//! async completion comes back tagged with the ticket/epoch/session it was
//! started under so it can be checked against current state before it lands.
//!
//! ```text
//! user command ──▶ ConsoleState::op() ──▶ Vec<Effect> ──▶ event loop (I/O)
//!                        ▲                                    │
//!                        └──── on_*(tag, result) ◀────────────┘
//! ```

use crate::chat::{ChatSession, ChatTimings, SubmitError, TokenOutcome};
use crate::mode::{Mode, ModeArbiter, ModeTransition};
use crate::model::{Filter, FilterSet, LogRecord, PageSize, SearchPage, Suggestions};
use crate::query::{total_pages, Debouncer, FetchController, FetchTicket, SearchQuery};
use crate::selection::{add_selection_to_context, ContextSet, SelectionSet};
use crate::tail::{TailBuffer, DEFAULT_TAIL_CAPACITY};
use crate::transport::TransportError;
use tokio::time::{Duration, Instant};

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Work the event loop must perform on behalf of the state
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch {
        ticket: FetchTicket,
        query: SearchQuery,
    },
    FetchSuggestions {
        ticket: FetchTicket,
    },
    OpenTail {
        epoch: u64,
    },
    CloseTail,
    OpenChat {
        session: u64,
    },
    CloseChat,
    SendChat {
        session: u64,
        request: crate::chat::ChatRequest,
    },
}

/// Tunables, usually derived from [`crate::config::Config`]
#[derive(Debug, Clone, Copy)]
pub struct StateSettings {
    pub search_debounce: Duration,
    pub tail_capacity: usize,
    pub page_size: PageSize,
    pub chat: ChatTimings,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            tail_capacity: DEFAULT_TAIL_CAPACITY,
            page_size: PageSize::default(),
            chat: ChatTimings::default(),
        }
    }
}

/// Rows on screen; which variant is active follows the mode
#[derive(Debug, Clone)]
pub enum ViewState {
    Paged(Vec<LogRecord>),
    Live(TailBuffer),
}

impl ViewState {
    pub fn row(&self, index: usize) -> Option<&LogRecord> {
        match self {
            ViewState::Paged(rows) => rows.get(index),
            ViewState::Live(tail) => tail.get(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ViewState::Paged(rows) => rows.len(),
            ViewState::Live(tail) => tail.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Vec<&LogRecord> {
        match self {
            ViewState::Paged(rows) => rows.iter().collect(),
            ViewState::Live(tail) => tail.iter().collect(),
        }
    }

    fn to_vec(&self) -> Vec<LogRecord> {
        self.rows().into_iter().cloned().collect()
    }
}

pub struct ConsoleState {
    settings: StateSettings,

    // Search inputs
    term_input: String,
    term: String,
    term_debounce: Debouncer<String>,
    filters: FilterSet,
    page: u32,
    page_size: PageSize,

    // Results
    total_hits: u64,
    total_pages: u64,
    suggestions: Suggestions,
    arbiter: ModeArbiter,
    fetch: FetchController,
    view: ViewState,
    tail_connected: bool,

    // Row gestures
    selection: SelectionSet,
    context: ContextSet,

    // Chat
    chat: ChatSession,
    chat_session: u64,
}

impl ConsoleState {
    pub fn new(settings: StateSettings) -> Self {
        Self {
            settings,
            term_input: String::new(),
            term: String::new(),
            term_debounce: Debouncer::new(settings.search_debounce),
            filters: FilterSet::new(),
            page: 1,
            page_size: settings.page_size,
            total_hits: 0,
            total_pages: 0,
            suggestions: Suggestions::default(),
            arbiter: ModeArbiter::new(),
            fetch: FetchController::new(),
            view: ViewState::Paged(Vec::new()),
            tail_connected: false,
            selection: SelectionSet::new(),
            context: ContextSet::new(),
            chat: ChatSession::new(settings.chat),
            chat_session: 0,
        }
    }

    /// Initial load
    pub fn start(&mut self) -> Vec<Effect> {
        self.refresh()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.arbiter.mode()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn term_input(&self) -> &str {
        &self.term_input
    }

    /// Term the current results were (or will be) fetched with
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn suggestions(&self) -> &Suggestions {
        &self.suggestions
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn context(&self) -> &ContextSet {
        &self.context
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn tail_connected(&self) -> bool {
        self.tail_connected
    }

    pub fn current_query(&self) -> SearchQuery {
        SearchQuery::new(&self.term, self.filters.as_slice(), self.page, self.page_size)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search inputs
    // ─────────────────────────────────────────────────────────────────────

    /// Search box edit; fetched once the term has been stable for the quiet period
    pub fn set_term(&mut self, text: &str, now: Instant) {
        self.term_input = text.to_string();
        self.term_debounce.schedule(text.to_string(), now);
    }

    /// Add a filter and clear the search box
    ///
    /// The cleared term is committed in the same request as the new filter.
    pub fn add_filter(&mut self, filter: Filter) -> Vec<Effect> {
        if !self.filters.add(filter.clone()) {
            tracing::debug!(filter = %filter, "filter already active");
        }
        self.term_input.clear();
        self.term.clear();
        self.term_debounce.cancel();
        self.refresh()
    }

    pub fn remove_filter(&mut self, index: usize) -> Vec<Effect> {
        match self.filters.remove(index) {
            Some(_) => self.refresh(),
            None => Vec::new(),
        }
    }

    pub fn set_page(&mut self, page: u32) -> Vec<Effect> {
        self.page = page.max(1);
        self.refresh()
    }

    /// Change page size; always returns to the first page
    pub fn set_page_size(&mut self, page_size: PageSize) -> Vec<Effect> {
        self.page_size = page_size;
        self.page = 1;
        self.refresh()
    }

    /// Filter on a clickable metadata field of a displayed row
    pub fn promote_metadata(&mut self, row: usize, key: &str) -> Vec<Effect> {
        let filter = self
            .view
            .row(row)
            .and_then(|record| record.metadata.get(key))
            .and_then(|value| Filter::from_metadata(key, value));
        match filter {
            Some(filter) => self.add_filter(filter),
            None => {
                tracing::debug!(row, key, "metadata field not promotable");
                Vec::new()
            }
        }
    }

    /// Add the `index`-th suggested filter
    pub fn apply_suggestion(&mut self, index: usize) -> Vec<Effect> {
        match self.suggestions.filters().into_iter().nth(index) {
            Some(filter) => self.add_filter(filter),
            None => Vec::new(),
        }
    }

    fn refresh(&mut self) -> Vec<Effect> {
        if self.arbiter.is_live() {
            return Vec::new();
        }
        let query = self.current_query();
        match self.fetch.issue(query.clone(), self.arbiter.epoch()) {
            Some(ticket) => {
                tracing::debug!(ticket = ticket.id, term = %query.term, page = query.page, "issuing search");
                vec![Effect::Fetch { ticket, query }]
            }
            None => Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mode
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_live(&mut self, live: bool) -> Vec<Effect> {
        match self.arbiter.set_live(live) {
            Some(ModeTransition::EnteredLive { epoch }) => {
                self.fetch.invalidate();
                self.view = ViewState::Live(TailBuffer::seeded(
                    self.settings.tail_capacity,
                    &self.view.to_vec(),
                ));
                self.selection.clear();
                tracing::info!(epoch, "live tail enabled");
                vec![Effect::OpenTail { epoch }]
            }
            Some(ModeTransition::EnteredPaged { epoch }) => {
                self.fetch.invalidate();
                self.tail_connected = false;
                self.view = ViewState::Paged(self.view.to_vec());
                self.selection.clear();
                tracing::info!(epoch, page = self.page, "live tail disabled");
                let mut effects = vec![Effect::CloseTail];
                effects.extend(self.refresh());
                effects
            }
            None => Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection & context
    // ─────────────────────────────────────────────────────────────────────

    /// Flip selection of a displayed row; rows past the end are ignored
    pub fn toggle_selection(&mut self, index: usize) -> bool {
        if index >= self.view.len() {
            return false;
        }
        self.selection.toggle(index);
        true
    }

    pub fn add_selection_to_context(&mut self) -> usize {
        let view = &self.view;
        add_selection_to_context(&mut self.selection, &mut self.context, |i| view.row(i))
    }

    /// Add one displayed row to the context set
    pub fn add_row_to_context(&mut self, index: usize) -> bool {
        match self.view.row(index) {
            Some(record) => self.context.add(record.clone()),
            None => false,
        }
    }

    pub fn remove_from_context(&mut self, index: usize) -> Option<LogRecord> {
        self.context.remove(index)
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────

    pub fn open_chat(&mut self) -> Vec<Effect> {
        if !self.chat.connect() {
            return Vec::new();
        }
        self.chat_session += 1;
        vec![Effect::OpenChat {
            session: self.chat_session,
        }]
    }

    pub fn close_chat(&mut self) -> Vec<Effect> {
        // Anything still in flight from this session is now stale
        self.chat_session += 1;
        if self.chat.close() {
            vec![Effect::CloseChat]
        } else {
            Vec::new()
        }
    }

    pub fn submit_chat(&mut self, question: &str, now: Instant) -> Result<Vec<Effect>, SubmitError> {
        let request = self
            .chat
            .submit(question, self.context.as_slice(), &self.filters, now)?;
        Ok(vec![Effect::SendChat {
            session: self.chat_session,
            request,
        }])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Async completions
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_search_result(
        &mut self,
        ticket: FetchTicket,
        result: Result<SearchPage, TransportError>,
    ) -> Vec<Effect> {
        let Some(query) = self.fetch.query_for(&ticket).cloned() else {
            tracing::debug!(ticket = ticket.id, "discarding stale search response");
            return Vec::new();
        };
        if !self.arbiter.is_current(Mode::Paged, ticket.mode_epoch) {
            tracing::debug!(ticket = ticket.id, "discarding search response from previous mode");
            return Vec::new();
        }

        match result {
            Ok(page) => {
                self.total_hits = page.total;
                self.total_pages = total_pages(page.total, query.page_size);
                self.view = ViewState::Paged(page.results);
                self.selection.clear();
                if self.filters.is_empty() {
                    vec![Effect::FetchSuggestions { ticket }]
                } else {
                    self.suggestions = Suggestions::default();
                    Vec::new()
                }
            }
            Err(e) => {
                self.fetch.fail(&ticket);
                tracing::warn!(error = %e, "search failed; keeping previous results");
                Vec::new()
            }
        }
    }

    pub fn on_suggestions(
        &mut self,
        ticket: FetchTicket,
        result: Result<Suggestions, TransportError>,
    ) {
        if !self.fetch.accept(&ticket) || !self.arbiter.is_current(Mode::Paged, ticket.mode_epoch)
        {
            tracing::debug!(ticket = ticket.id, "discarding stale suggestions");
            return;
        }
        match result {
            Ok(suggestions) if self.filters.is_empty() => self.suggestions = suggestions,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "suggested filters unavailable"),
        }
    }

    pub fn on_tail_opened(&mut self, epoch: u64) {
        if self.arbiter.is_current(Mode::Live, epoch) {
            self.tail_connected = true;
        }
    }

    pub fn on_tail_message(&mut self, epoch: u64, payload: &str) {
        if !self.arbiter.is_current(Mode::Live, epoch) {
            tracing::trace!(epoch, "dropping tail push from closed channel");
            return;
        }
        let ViewState::Live(tail) = &mut self.view else {
            return;
        };
        match tail.ingest(payload) {
            Ok(()) => self.selection.shift_for_prepend(tail.len()),
            Err(e) => tracing::debug!(error = %e, "dropping malformed tail payload"),
        }
    }

    pub fn on_tail_closed(&mut self, epoch: u64, reason: Option<&str>) {
        if !self.arbiter.is_current(Mode::Live, epoch) {
            return;
        }
        self.tail_connected = false;
        tracing::warn!(reason = reason.unwrap_or("closed"), "live tail disconnected");
    }

    pub fn on_chat_opened(&mut self, session: u64) {
        if session == self.chat_session {
            self.chat.on_connected();
        }
    }

    pub fn on_chat_token(&mut self, session: u64, token: &str, now: Instant) -> Option<TokenOutcome> {
        if session != self.chat_session {
            return None;
        }
        Some(self.chat.on_token(token, now))
    }

    pub fn on_chat_closed(&mut self, session: u64, reason: Option<&str>) {
        if session != self.chat_session {
            return;
        }
        self.chat.on_disconnected();
        tracing::warn!(reason = reason.unwrap_or("closed"), "chat disconnected");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────

    /// Earliest pending timer across debounce and chat
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.term_debounce.deadline(), self.chat.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn poll_timers(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(term) = self.term_debounce.fire(now) {
            self.term = term;
            effects.extend(self.refresh());
        }
        if let Some(end) = self.chat.poll_timers(now) {
            tracing::debug!(reason = end.as_str(), "chat turn ended");
        }
        effects
    }

    /// Close every channel and cancel every timer
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.term_debounce.cancel();
        if self.arbiter.is_live() {
            // Bump the epoch so late tail pushes are dropped
            self.arbiter.disable_live();
            self.tail_connected = false;
            effects.push(Effect::CloseTail);
        }
        self.fetch.invalidate();
        effects.extend(self.close_chat());
        effects
    }
}
