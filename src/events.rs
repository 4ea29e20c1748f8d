// Events that flow from background tasks into the console loop
//
// Request tasks and socket pumps never touch console state. They report what
// happened here, tagged with the ticket, epoch or session that was current when
// the work started, and the console decides whether the result still matters.

use crate::model::{SearchPage, Suggestions};
use crate::query::FetchTicket;
use crate::transport::TransportError;

#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    /// A paged search finished
    SearchCompleted {
        ticket: FetchTicket,
        result: Result<SearchPage, TransportError>,
    },

    /// A suggested-filters request finished
    SuggestionsCompleted {
        ticket: FetchTicket,
        result: Result<Suggestions, TransportError>,
    },

    /// Tail socket handshake completed
    TailOpened { epoch: u64 },

    /// One push from the tail socket (a JSON-encoded log record)
    TailMessage { epoch: u64, payload: String },

    /// Tail socket ended from the remote side or failed to connect
    TailClosed { epoch: u64, reason: Option<String> },

    ChatOpened { session: u64 },

    /// One streamed answer token
    ChatToken { session: u64, token: String },

    ChatClosed { session: u64, reason: Option<String> },
}

impl ConsoleEvent {
    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SearchCompleted { .. } => "search_completed",
            Self::SuggestionsCompleted { .. } => "suggestions_completed",
            Self::TailOpened { .. } => "tail_opened",
            Self::TailMessage { .. } => "tail_message",
            Self::TailClosed { .. } => "tail_closed",
            Self::ChatOpened { .. } => "chat_opened",
            Self::ChatToken { .. } => "chat_token",
            Self::ChatClosed { .. } => "chat_closed",
        }
    }
}
