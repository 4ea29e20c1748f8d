// Chat stream reconstructor
//
// Reassembles a token-by-token assistant reply into one message. The wire has
// no reliable "done" frame, so the end of a turn is inferred:
//
//   - an empty / whitespace-only token is an explicit end-of-stream
//   - 3s without a token ends the turn (idle timer, re-armed per token)
//   - 30s after the question was sent ends the turn regardless (ceiling)
//
// State Diagram:
//
//   [Disconnected] ──connect──▶ [Connecting] ──opened──▶ [Connected/Idle]
//         ▲                                                │        ▲
//         │                                         submit │        │ end token
//         │                                                ▼        │ idle / ceiling
//         └────────── closed / error ───────────── [Connected/Streaming]
//
// Timers are plain deadlines. The owner sleeps until `next_deadline()` and
// then calls `poll_timers(now)`; dropping a deadline is cancelling the timer.

use crate::model::{FilterSet, LogRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::{Duration, Instant};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_STREAM_CEILING: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Outbound payload, one per question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub context_logs: Vec<LogRecord>,
    pub active_filters: BTreeMap<String, String>,
}

impl ChatRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a question was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    EmptyQuestion,
    NotConnected,
    /// A reply is still streaming; turns are not queued
    Busy,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuestion => write!(f, "question is empty"),
            Self::NotConnected => write!(f, "chat is not connected"),
            Self::Busy => write!(f, "previous answer is still streaming"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// What an inbound token did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    Appended,
    EndOfStream,
    /// Arrived while idle (late token); dropped
    Ignored,
}

/// Why a streaming turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEnd {
    EndToken,
    Silence,
    Ceiling,
    Disconnected,
    Closed,
}

impl TurnEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndToken => "end token",
            Self::Silence => "idle timeout",
            Self::Ceiling => "stream ceiling",
            Self::Disconnected => "connection lost",
            Self::Closed => "session closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTimings {
    pub idle: Duration,
    pub ceiling: Duration,
}

impl Default for ChatTimings {
    fn default() -> Self {
        Self {
            idle: DEFAULT_IDLE_TIMEOUT,
            ceiling: DEFAULT_STREAM_CEILING,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    connection: ConnectionState,
    stream: StreamState,
    /// Raw concatenation of this turn's tokens
    accumulator: String,
    /// Index of the assistant message receiving tokens
    open_message: Option<usize>,
    idle_deadline: Option<Instant>,
    ceiling_deadline: Option<Instant>,
    timings: ChatTimings,
    next_id: u64,
    turns_completed: u64,
}

impl ChatSession {
    pub fn new(timings: ChatTimings) -> Self {
        Self {
            timings,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    #[cfg(test)]
    pub fn stream(&self) -> StreamState {
        self.stream
    }

    pub fn is_streaming(&self) -> bool {
        self.stream == StreamState::Streaming
    }

    /// Message currently receiving tokens
    pub fn open_message(&self) -> Option<&ChatMessage> {
        self.open_message.and_then(|i| self.messages.get(i))
    }

    /// Number of streaming turns that have ended, by any cause
    pub fn turns_completed(&self) -> u64 {
        self.turns_completed
    }

    /// Earliest pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.idle_deadline, self.ceiling_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Begin opening the channel; false if already connecting or connected
    pub fn connect(&mut self) -> bool {
        if self.connection != ConnectionState::Disconnected {
            return false;
        }
        self.connection = ConnectionState::Connecting;
        true
    }

    pub fn on_connected(&mut self) {
        if self.connection == ConnectionState::Connecting {
            self.connection = ConnectionState::Connected;
            tracing::debug!("chat channel connected");
        }
    }

    /// Channel closed or errored from either side
    pub fn on_disconnected(&mut self) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        self.connection = ConnectionState::Disconnected;
        self.end_turn(TurnEnd::Disconnected);
    }

    /// Tear the session down; returns true if a channel was open and must be closed
    pub fn close(&mut self) -> bool {
        let was_open = self.connection != ConnectionState::Disconnected;
        self.connection = ConnectionState::Disconnected;
        self.end_turn(TurnEnd::Closed);
        // Timers go even if no turn was streaming
        self.idle_deadline = None;
        self.ceiling_deadline = None;
        was_open
    }

    // ─────────────────────────────────────────────────────────────────────
    // Turns
    // ─────────────────────────────────────────────────────────────────────

    /// Send a question; appends the user message and an empty assistant placeholder
    pub fn submit(
        &mut self,
        question: &str,
        context: &[LogRecord],
        filters: &FilterSet,
        now: Instant,
    ) -> Result<ChatRequest, SubmitError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SubmitError::EmptyQuestion);
        }
        if self.connection != ConnectionState::Connected {
            return Err(SubmitError::NotConnected);
        }
        if self.stream == StreamState::Streaming {
            return Err(SubmitError::Busy);
        }

        self.push_message(Sender::User, question.to_string());
        let placeholder = self.push_message(Sender::Assistant, String::new());
        self.open_message = Some(placeholder);
        self.accumulator.clear();
        self.stream = StreamState::Streaming;
        self.idle_deadline = None;
        self.ceiling_deadline = Some(now + self.timings.ceiling);

        Ok(ChatRequest {
            question: question.to_string(),
            context_logs: context.to_vec(),
            active_filters: filters.flatten(),
        })
    }

    /// Apply one inbound token
    pub fn on_token(&mut self, token: &str, now: Instant) -> TokenOutcome {
        if self.stream != StreamState::Streaming {
            tracing::debug!(len = token.len(), "dropping chat token received while idle");
            return TokenOutcome::Ignored;
        }
        if token.trim().is_empty() {
            self.end_turn(TurnEnd::EndToken);
            return TokenOutcome::EndOfStream;
        }

        self.accumulator.push_str(token);
        if let Some(message) = self.open_message.and_then(|i| self.messages.get_mut(i)) {
            message.content = self.accumulator.trim_start().to_string();
        }
        self.idle_deadline = Some(now + self.timings.idle);
        TokenOutcome::Appended
    }

    /// Fire due timers; returns how the turn ended if one did
    pub fn poll_timers(&mut self, now: Instant) -> Option<TurnEnd> {
        if self.stream != StreamState::Streaming {
            return None;
        }
        if self.ceiling_deadline.is_some_and(|at| now >= at) {
            self.end_turn(TurnEnd::Ceiling);
            return Some(TurnEnd::Ceiling);
        }
        if self.idle_deadline.is_some_and(|at| now >= at) {
            self.end_turn(TurnEnd::Silence);
            return Some(TurnEnd::Silence);
        }
        None
    }

    fn end_turn(&mut self, reason: TurnEnd) {
        if self.stream != StreamState::Streaming {
            return;
        }
        self.stream = StreamState::Idle;
        self.open_message = None;
        self.idle_deadline = None;
        self.ceiling_deadline = None;
        self.turns_completed += 1;
        tracing::debug!(
            reason = reason.as_str(),
            chars = self.accumulator.len(),
            "chat turn finished"
        );
    }

    fn push_message(&mut self, sender: Sender, content: String) -> usize {
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id: self.next_id,
            content,
            sender,
            timestamp: Utc::now(),
        });
        self.messages.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Filter;

    fn connected() -> ChatSession {
        let mut chat = ChatSession::new(ChatTimings::default());
        assert!(chat.connect());
        chat.on_connected();
        chat
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_tokens_then_silence() {
        let start = Instant::now();
        let mut chat = connected();
        chat.submit("what broke?", &[], &FilterSet::new(), start)
            .unwrap();

        for (i, token) in ["Hel", "lo wor", "ld"].iter().enumerate() {
            assert_eq!(
                chat.on_token(token, start + ms(100 * i as u64)),
                TokenOutcome::Appended
            );
        }
        // Last token at 200ms: not idle yet at 3100ms
        assert_eq!(chat.poll_timers(start + ms(3100)), None);
        assert_eq!(chat.poll_timers(start + ms(3200)), Some(TurnEnd::Silence));
        assert_eq!(chat.poll_timers(start + ms(9000)), None);

        assert_eq!(chat.stream(), StreamState::Idle);
        assert_eq!(chat.turns_completed(), 1);
        let reply = chat.messages().last().unwrap();
        assert_eq!(reply.sender, Sender::Assistant);
        assert_eq!(reply.content, "Hello world");
    }

    #[test]
    fn test_leading_whitespace_stripped_trailing_kept() {
        let now = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), now).unwrap();
        chat.on_token("\n  The", now);
        chat.on_token(" disk ", now);
        assert_eq!(chat.open_message().unwrap().content, "The disk ");
    }

    #[test]
    fn test_whitespace_token_ends_stream() {
        let now = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), now).unwrap();
        chat.on_token("Done", now);
        assert_eq!(chat.on_token("\n\n", now), TokenOutcome::EndOfStream);
        assert!(!chat.is_streaming());
        assert!(chat.next_deadline().is_none());
        assert!(chat.open_message().is_none());
    }

    #[test]
    fn test_late_tokens_ignored() {
        let now = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), now).unwrap();
        chat.on_token("answer", now);
        chat.on_token("", now);

        assert_eq!(chat.on_token(" more", now), TokenOutcome::Ignored);
        assert_eq!(chat.messages().last().unwrap().content, "answer");
    }

    #[test]
    fn test_ceiling_ends_busy_stream() {
        let start = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), start).unwrap();

        // A token every second keeps the idle timer from firing
        for s in 1..30 {
            chat.on_token("x", start + Duration::from_secs(s));
            assert_eq!(chat.poll_timers(start + Duration::from_secs(s)), None);
        }
        assert_eq!(
            chat.poll_timers(start + Duration::from_secs(30)),
            Some(TurnEnd::Ceiling)
        );
    }

    #[test]
    fn test_ceiling_without_any_token() {
        let start = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), start).unwrap();
        assert_eq!(chat.next_deadline(), Some(start + DEFAULT_STREAM_CEILING));
        assert_eq!(
            chat.poll_timers(start + DEFAULT_STREAM_CEILING),
            Some(TurnEnd::Ceiling)
        );
    }

    #[test]
    fn test_submit_guards() {
        let now = Instant::now();
        let mut chat = ChatSession::new(ChatTimings::default());
        assert_eq!(
            chat.submit("q", &[], &FilterSet::new(), now),
            Err(SubmitError::NotConnected)
        );

        chat.connect();
        assert_eq!(
            chat.submit("q", &[], &FilterSet::new(), now),
            Err(SubmitError::NotConnected)
        );

        chat.on_connected();
        assert_eq!(
            chat.submit("   ", &[], &FilterSet::new(), now),
            Err(SubmitError::EmptyQuestion)
        );

        chat.submit("first", &[], &FilterSet::new(), now).unwrap();
        assert_eq!(
            chat.submit("second", &[], &FilterSet::new(), now),
            Err(SubmitError::Busy)
        );
        // Rejected submits append nothing
        assert_eq!(chat.messages().len(), 2);
    }

    #[test]
    fn test_payload_snapshot() {
        let now = Instant::now();
        let mut chat = connected();
        let mut filters = FilterSet::new();
        filters.add(Filter::new("level", "error"));
        filters.add(Filter::new("level", "warn"));
        let context = vec![LogRecord::new("error", "boom", "2024-01-15T10:00:00Z")];

        let request = chat.submit("  why?  ", &context, &filters, now).unwrap();
        assert_eq!(request.question, "why?");
        assert_eq!(request.context_logs, context);
        assert_eq!(request.active_filters["level"], "warn");

        let json: serde_json::Value =
            serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["active_filters"]["level"], "warn");
        assert_eq!(json["context_logs"][0]["message"], "boom");

        assert_eq!(chat.messages()[0].sender, Sender::User);
        assert_eq!(chat.messages()[0].content, "why?");
        assert_eq!(chat.messages()[1].content, "");
        assert!(chat.messages()[0].id < chat.messages()[1].id);
    }

    #[test]
    fn test_disconnect_mid_stream() {
        let now = Instant::now();
        let mut chat = connected();
        chat.submit("q", &[], &FilterSet::new(), now).unwrap();
        chat.on_token("partial", now);
        chat.on_disconnected();

        assert_eq!(chat.connection(), ConnectionState::Disconnected);
        assert!(!chat.is_streaming());
        assert!(chat.next_deadline().is_none());
        assert_eq!(chat.on_token("late", now), TokenOutcome::Ignored);
    }

    #[test]
    fn test_close_cancels_timers_across_cycles() {
        let now = Instant::now();
        let mut chat = ChatSession::new(ChatTimings::default());
        for _ in 0..3 {
            assert!(chat.connect());
            chat.on_connected();
            chat.submit("q", &[], &FilterSet::new(), now).unwrap();
            chat.on_token("a", now);
            assert!(chat.close());
            assert_eq!(chat.next_deadline(), None);
        }
        assert!(!chat.close());
        assert_eq!(chat.turns_completed(), 3);
    }

    #[test]
    fn test_new_turn_replaces_ceiling() {
        let start = Instant::now();
        let mut chat = connected();
        chat.submit("one", &[], &FilterSet::new(), start).unwrap();
        chat.on_token("", start + ms(10));

        let second = start + Duration::from_secs(20);
        chat.submit("two", &[], &FilterSet::new(), second).unwrap();
        // The first turn's ceiling (t=30s) must not cut the second turn short
        assert_eq!(chat.poll_timers(start + Duration::from_secs(30)), None);
        assert!(chat.is_streaming());
    }
}
