//! Console event loop
//!
//! Owns the [`ConsoleState`] and carries out the effects it asks for. All I/O
//! happens in spawned tasks that report back through one mpsc channel, so the
//! state is only ever touched from this loop:
//!
//! ```text
//!   commands ─┐
//!   events ───┼──▶ tokio::select! ──▶ ConsoleState ──▶ effects ──▶ spawn / sockets
//!   timers ───┘                                                       │
//!      ▲                                                              │
//!      └────────────────────── ConsoleEvent ◀─────────────────────────┘
//! ```

use crate::chat::TokenOutcome;
use crate::command::{Command, ShowTarget};
use crate::events::ConsoleEvent;
use crate::logging::DiagnosticBuffer;
use crate::render;
use crate::state::{ConsoleState, Effect};
use crate::transport::{Connector, SearchBackend, SocketChannel, SocketHandle};
use anyhow::Result;
use std::io::Write;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Capacity of the internal event channel
const EVENT_BUFFER: usize = 256;

/// What the caller should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Show(ShowTarget),
    Quit,
}

pub struct Console<B: SearchBackend, C: Connector> {
    state: ConsoleState,
    backend: B,
    connector: C,
    events_tx: mpsc::Sender<ConsoleEvent>,
    events_rx: mpsc::Receiver<ConsoleEvent>,
    /// Open tail socket and the epoch it belongs to
    tail: Option<(u64, SocketHandle)>,
    /// Open chat socket and the session it belongs to
    chat: Option<(u64, SocketHandle)>,
}

impl<B: SearchBackend, C: Connector> Console<B, C> {
    pub fn new(state: ConsoleState, backend: B, connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            state,
            backend,
            connector,
            events_tx,
            events_rx,
            tail: None,
            chat: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &ConsoleState {
        &self.state
    }

    /// Issue the initial search
    pub fn start(&mut self) {
        let effects = self.state.start();
        self.apply(effects);
    }

    pub fn handle(&mut self, command: Command) -> Flow {
        let now = Instant::now();
        let effects = match command {
            Command::SetTerm(term) => {
                self.state.set_term(&term, now);
                Vec::new()
            }
            Command::AddFilter(filter) => self.state.add_filter(filter),
            Command::RemoveFilter(index) => self.state.remove_filter(index),
            Command::SetPage(page) => self.state.set_page(page),
            Command::SetPageSize(size) => self.state.set_page_size(size),
            Command::SetLive(live) => self.state.set_live(live),
            Command::ToggleSelection(row) => {
                if !self.state.toggle_selection(row) {
                    tracing::warn!(row, "no such row");
                }
                Vec::new()
            }
            Command::AddSelectionToContext => {
                let added = self.state.add_selection_to_context();
                tracing::info!(added, "selection added to context");
                Vec::new()
            }
            Command::AddRowToContext(row) => {
                if !self.state.add_row_to_context(row) {
                    tracing::debug!(row, "row missing or already in context");
                }
                Vec::new()
            }
            Command::RemoveFromContext(index) => {
                if self.state.remove_from_context(index).is_none() {
                    tracing::warn!(index, "no such context entry");
                }
                Vec::new()
            }
            Command::ClearContext => {
                self.state.clear_context();
                Vec::new()
            }
            Command::Promote { row, key } => self.state.promote_metadata(row, &key),
            Command::ApplySuggestion(index) => self.state.apply_suggestion(index),
            Command::OpenChat => self.state.open_chat(),
            Command::CloseChat => self.state.close_chat(),
            Command::Ask(question) => match self.state.submit_chat(&question, now) {
                Ok(effects) => effects,
                Err(e) => {
                    tracing::warn!(error = %e, "question not sent");
                    Vec::new()
                }
            },
            Command::Show(target) => return Flow::Show(target),
            Command::Quit => return Flow::Quit,
        };
        self.apply(effects);
        Flow::Continue
    }

    pub fn on_event(&mut self, event: ConsoleEvent) {
        tracing::trace!(kind = event.kind(), "console event");
        match event {
            ConsoleEvent::SearchCompleted { ticket, result } => {
                let effects = self.state.on_search_result(ticket, result);
                self.apply(effects);
            }
            ConsoleEvent::SuggestionsCompleted { ticket, result } => {
                self.state.on_suggestions(ticket, result);
            }
            ConsoleEvent::TailOpened { epoch } => self.state.on_tail_opened(epoch),
            ConsoleEvent::TailMessage { epoch, payload } => {
                self.state.on_tail_message(epoch, &payload);
            }
            ConsoleEvent::TailClosed { epoch, reason } => {
                // Pump has already exited; just forget the handle
                if matches!(self.tail, Some((open, _)) if open == epoch) {
                    self.tail = None;
                }
                self.state.on_tail_closed(epoch, reason.as_deref());
            }
            ConsoleEvent::ChatOpened { session } => self.state.on_chat_opened(session),
            ConsoleEvent::ChatToken { session, token } => {
                if let Some(TokenOutcome::EndOfStream) =
                    self.state.on_chat_token(session, &token, Instant::now())
                {
                    tracing::debug!(session, "chat answer complete");
                }
            }
            ConsoleEvent::ChatClosed { session, reason } => {
                if matches!(self.chat, Some((open, _)) if open == session) {
                    self.chat = None;
                }
                self.state.on_chat_closed(session, reason.as_deref());
            }
        }
    }

    /// Fire whichever timers are due now
    pub fn fire_timers(&mut self) {
        let effects = self.state.poll_timers(Instant::now());
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch { ticket, query } => {
                    let backend = self.backend.clone();
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend.search(query).await;
                        let _ = tx.send(ConsoleEvent::SearchCompleted { ticket, result }).await;
                    });
                }
                Effect::FetchSuggestions { ticket } => {
                    let backend = self.backend.clone();
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = backend.suggested_filters().await;
                        let _ = tx
                            .send(ConsoleEvent::SuggestionsCompleted { ticket, result })
                            .await;
                    });
                }
                Effect::OpenTail { epoch } => {
                    if let Some((_, old)) = self.tail.take() {
                        old.close();
                    }
                    let handle = self
                        .connector
                        .open(SocketChannel::Tail { epoch }, self.events_tx.clone());
                    self.tail = Some((epoch, handle));
                }
                Effect::CloseTail => {
                    if let Some((_, handle)) = self.tail.take() {
                        handle.close();
                    }
                }
                Effect::OpenChat { session } => {
                    if let Some((_, old)) = self.chat.take() {
                        old.close();
                    }
                    let handle = self
                        .connector
                        .open(SocketChannel::Chat { session }, self.events_tx.clone());
                    self.chat = Some((session, handle));
                }
                Effect::CloseChat => {
                    if let Some((_, handle)) = self.chat.take() {
                        handle.close();
                    }
                }
                Effect::SendChat { session, request } => match &self.chat {
                    Some((open, handle)) if *open == session => match request.to_json() {
                        Ok(json) => {
                            if !handle.send(json) {
                                tracing::warn!(session, "chat socket is gone; question dropped");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to encode chat request"),
                    },
                    _ => tracing::warn!(session, "no chat socket for question"),
                },
            }
        }
    }

    /// Wait for one event or timer and apply it
    #[cfg(test)]
    pub async fn step(&mut self) {
        let deadline = self.state.next_deadline();
        tokio::select! {
            Some(event) = self.events_rx.recv() => self.on_event(event),
            _ = sleep_until_deadline(deadline) => self.fire_timers(),
        }
    }

    /// Drive the console until `quit` or until the command stream ends
    pub async fn run<W: Write>(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
        diagnostics: &DiagnosticBuffer,
        out: &mut W,
    ) -> Result<()> {
        self.start();
        let mut answered = self.state.chat().turns_completed();

        loop {
            let deadline = self.state.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => match self.handle(command) {
                        Flow::Continue => {}
                        Flow::Show(target) => render::show(out, target, &self.state, diagnostics)?,
                        Flow::Quit => break,
                    },
                    // Input closed
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
                _ = sleep_until_deadline(deadline) => self.fire_timers(),
            }

            let turns = self.state.chat().turns_completed();
            if turns > answered {
                answered = turns;
                render::answer(out, self.state.chat())?;
            }
            out.flush()?;
        }

        self.shutdown();
        Ok(())
    }

    /// Close every socket and cancel every timer
    pub fn shutdown(&mut self) {
        let effects = self.state.shutdown();
        self.apply(effects);
        tracing::debug!("console shut down");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ConnectionState;
    use crate::mode::Mode;
    use crate::model::{Bucket, BucketList, LogRecord, SearchPage, Suggestions};
    use crate::query::SearchQuery;
    use crate::state::StateSettings;
    use crate::transport::{Outbound, TransportError};
    use serde_json::json;
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use tokio::time::Duration;

    // ─────────────────────────────────────────────────────────────────────
    // Fakes
    // ─────────────────────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct FakeBackend {
        calls: Arc<Mutex<Vec<SearchQuery>>>,
    }

    impl FakeBackend {
        fn terms(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|q| q.term.clone()).collect()
        }
    }

    impl SearchBackend for FakeBackend {
        fn search(
            &self,
            query: SearchQuery,
        ) -> impl Future<Output = Result<SearchPage, TransportError>> + Send {
            let calls = self.calls.clone();
            async move {
                calls.lock().unwrap().push(query.clone());
                let delay = if query.term == "slow" { 500 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if query.term == "boom" {
                    return Err(TransportError::Status(500));
                }
                let record = LogRecord::new(
                    "info",
                    &format!("{}:{}", query.term, query.page),
                    "2024-01-15T10:00:00Z",
                )
                .with_metadata("user_id", json!("u-1"));
                Ok(SearchPage {
                    results: vec![record],
                    total: 120,
                })
            }
        }

        fn suggested_filters(
            &self,
        ) -> impl Future<Output = Result<Suggestions, TransportError>> + Send {
            async {
                Ok(Suggestions {
                    common_levels: Some(BucketList {
                        buckets: vec![Bucket {
                            key: "error".into(),
                            doc_count: 3,
                        }],
                    }),
                    common_user_ids: None,
                })
            }
        }
    }

    struct FakeSocket {
        channel: SocketChannel,
        events: mpsc::Sender<ConsoleEvent>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        sockets: Arc<Mutex<Vec<FakeSocket>>>,
    }

    impl FakeConnector {
        fn socket(&self, index: usize) -> (SocketChannel, mpsc::Sender<ConsoleEvent>) {
            let sockets = self.sockets.lock().unwrap();
            (sockets[index].channel, sockets[index].events.clone())
        }

        fn outbound(&self, index: usize) -> Vec<Outbound> {
            let mut sockets = self.sockets.lock().unwrap();
            let mut frames = Vec::new();
            while let Ok(frame) = sockets[index].outbound.try_recv() {
                frames.push(frame);
            }
            frames
        }

        fn opened(&self) -> usize {
            self.sockets.lock().unwrap().len()
        }
    }

    impl Connector for FakeConnector {
        fn open(&self, channel: SocketChannel, events: mpsc::Sender<ConsoleEvent>) -> SocketHandle {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sockets.lock().unwrap().push(FakeSocket {
                channel,
                events,
                outbound: rx,
            });
            SocketHandle::new(tx, tokio::spawn(async {}))
        }
    }

    fn console() -> (Console<FakeBackend, FakeConnector>, FakeBackend, FakeConnector) {
        let backend = FakeBackend::default();
        let connector = FakeConnector::default();
        let state = ConsoleState::new(StateSettings::default());
        (
            Console::new(state, backend.clone(), connector.clone()),
            backend,
            connector,
        )
    }

    /// Process events and timers until nothing happens for five (virtual) seconds
    async fn settle(console: &mut Console<FakeBackend, FakeConnector>) {
        while tokio::time::timeout(Duration::from_secs(5), console.step())
            .await
            .is_ok()
        {}
    }

    fn first_message(console: &Console<FakeBackend, FakeConnector>) -> Option<String> {
        console.state().view().row(0).map(|r| r.message.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_fetches_page_and_suggestions() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        assert_eq!(backend.terms(), vec![""]);
        assert_eq!(first_message(&console).as_deref(), Some(":1"));
        assert_eq!(console.state().total_pages(), 3);
        assert!(!console.state().suggestions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_term_edits_are_debounced() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::SetTerm("d".into()));
        tokio::time::advance(Duration::from_millis(100)).await;
        console.handle(Command::SetTerm("di".into()));
        tokio::time::advance(Duration::from_millis(100)).await;
        console.handle(Command::SetTerm("disk".into()));
        settle(&mut console).await;

        assert_eq!(backend.terms(), vec!["", "disk"]);
        assert_eq!(first_message(&console).as_deref(), Some("disk:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_request_wins() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::SetTerm("slow".into()));
        tokio::time::advance(Duration::from_millis(300)).await;
        console.fire_timers();
        console.handle(Command::SetTerm("fast".into()));
        tokio::time::advance(Duration::from_millis(300)).await;
        console.fire_timers();
        settle(&mut console).await;

        // Both went out; only the newer one may land, whatever the arrival order
        assert_eq!(backend.terms(), vec!["", "slow", "fast"]);
        assert_eq!(first_message(&console).as_deref(), Some("fast:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_query_is_not_refetched() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::SetPage(1));
        settle(&mut console).await;
        assert_eq!(backend.terms().len(), 1);

        console.handle(Command::SetPage(2));
        settle(&mut console).await;
        assert_eq!(first_message(&console).as_deref(), Some(":2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_search_keeps_rows_and_allows_retry() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::SetTerm("boom".into()));
        settle(&mut console).await;
        assert_eq!(first_message(&console).as_deref(), Some(":1"));

        // Same query again is retried, not suppressed
        console.handle(Command::SetPage(1));
        settle(&mut console).await;
        assert_eq!(backend.terms(), vec!["", "boom", "boom"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promote_and_suggestion_add_filters() {
        let (mut console, backend, _) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::Promote {
            row: 0,
            key: "user_id".into(),
        });
        settle(&mut console).await;
        let calls = backend.calls.lock().unwrap().clone();
        let last = calls.last().unwrap();
        assert_eq!(last.filters[0].key, "metadata.user_id");
        assert_eq!(last.filters[0].value, "u-1");
        // Filters active: suggestions are cleared
        assert!(console.state().suggestions().is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Live tail
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_round_trip() {
        let (mut console, backend, connector) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::SetLive(true));
        assert_eq!(connector.opened(), 1);
        let (channel, events) = connector.socket(0);
        let SocketChannel::Tail { epoch } = channel else {
            panic!("expected tail socket, got {:?}", channel);
        };

        let push = json!({"level": "warn", "message": "pushed", "timestamp": "t", "metadata": {}});
        events.send(ConsoleEvent::TailOpened { epoch }).await.unwrap();
        events
            .send(ConsoleEvent::TailMessage {
                epoch,
                payload: push.to_string(),
            })
            .await
            .unwrap();
        settle(&mut console).await;

        assert!(console.state().tail_connected());
        assert_eq!(console.state().view().len(), 2);
        assert_eq!(first_message(&console).as_deref(), Some("pushed"));
        // No searches while live
        assert_eq!(backend.terms().len(), 1);

        console.handle(Command::SetLive(false));
        assert_eq!(connector.outbound(0), vec![Outbound::Close]);

        // Late push from the closed socket is ignored
        events
            .send(ConsoleEvent::TailMessage {
                epoch,
                payload: push.to_string(),
            })
            .await
            .unwrap();
        settle(&mut console).await;

        assert_eq!(console.state().mode(), Mode::Paged);
        assert_eq!(backend.terms().len(), 2);
        assert_eq!(first_message(&console).as_deref(), Some(":1"));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────

    async fn open_chat(
        console: &mut Console<FakeBackend, FakeConnector>,
        connector: &FakeConnector,
    ) -> (u64, mpsc::Sender<ConsoleEvent>) {
        console.handle(Command::OpenChat);
        let index = connector.opened() - 1;
        let (channel, events) = connector.socket(index);
        let SocketChannel::Chat { session } = channel else {
            panic!("expected chat socket, got {:?}", channel);
        };
        events.send(ConsoleEvent::ChatOpened { session }).await.unwrap();
        settle(console).await;
        (session, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_turn_assembles_tokens() {
        let (mut console, _, connector) = console();
        console.start();
        settle(&mut console).await;

        console.handle(Command::AddRowToContext(0));
        let (session, events) = open_chat(&mut console, &connector).await;
        assert_eq!(console.state().chat().connection(), ConnectionState::Connected);

        console.handle(Command::Ask("  why did it fail?  ".into()));
        let frames = connector.outbound(0);
        let Some(Outbound::Text(payload)) = frames.first() else {
            panic!("expected a question frame, got {:?}", frames);
        };
        let payload: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(payload["question"], "why did it fail?");
        assert_eq!(payload["context_logs"].as_array().unwrap().len(), 1);

        for token in ["Hel", "lo wor", "ld"] {
            events
                .send(ConsoleEvent::ChatToken {
                    session,
                    token: token.into(),
                })
                .await
                .unwrap();
        }
        settle(&mut console).await;

        let chat = console.state().chat();
        assert!(!chat.is_streaming());
        assert_eq!(chat.turns_completed(), 1);
        assert_eq!(chat.messages().last().unwrap().content, "Hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn test_question_before_connect_is_rejected() {
        let (mut console, _, connector) = console();
        console.handle(Command::OpenChat);
        console.handle(Command::Ask("anyone there?".into()));

        assert!(connector.outbound(0).is_empty());
        assert!(console.state().chat().messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_chat_close_forgets_socket() {
        let (mut console, _, connector) = console();
        let (session, events) = open_chat(&mut console, &connector).await;

        events
            .send(ConsoleEvent::ChatClosed {
                session,
                reason: Some("server restart".into()),
            })
            .await
            .unwrap();
        settle(&mut console).await;

        assert!(console.chat.is_none());
        assert_eq!(
            console.state().chat().connection(),
            ConnectionState::Disconnected
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_sockets() {
        let (mut console, _, connector) = console();
        console.handle(Command::SetLive(true));
        console.handle(Command::OpenChat);
        console.shutdown();

        assert_eq!(connector.outbound(0), vec![Outbound::Close]);
        assert_eq!(connector.outbound(1), vec![Outbound::Close]);
        assert!(console.tail.is_none());
        assert!(console.chat.is_none());
        assert!(console.state().next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_renders_and_quits() {
        let (mut console, _, _) = console();
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(Command::AddFilter(crate::model::Filter::new("level", "error")))
            .await
            .unwrap();
        tx.send(Command::Show(ShowTarget::Filters)).await.unwrap();
        tx.send(Command::Quit).await.unwrap();

        let mut out = Vec::new();
        console
            .run(&mut rx, &DiagnosticBuffer::new(), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("level: error"), "output was: {}", text);
    }
}
