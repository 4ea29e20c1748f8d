//! Transport adapters for the remote log service
//!
//! The console state never touches the network. Everything it asks for goes
//! through one of two seams:
//!
//! ```text
//! SearchBackend trait (request/response)
//! └── HttpBackend   GET /v1/search, GET /v1/aggregations/suggested_filters
//!
//! Connector trait (persistent sockets)
//! └── WsConnector   /v1/ws/tail, /v1/ws/chat
//! ```
//!
//! Socket pumps push [`ConsoleEvent`]s tagged with the epoch or session the
//! socket was opened under, so a late frame from a closed socket is recognisable.

mod http;
mod ws;

pub use http::HttpBackend;
pub use ws::WsConnector;

use crate::events::ConsoleEvent;
use crate::model::{SearchPage, Suggestions};
use crate::query::SearchQuery;
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SEARCH_PATH: &str = "/v1/search";
pub const SUGGESTIONS_PATH: &str = "/v1/aggregations/suggested_filters";
pub const TAIL_PATH: &str = "/v1/ws/tail";
pub const CHAT_PATH: &str = "/v1/ws/chat";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the search service or its sockets
///
/// None of these are fatal; the console logs them and keeps the last good view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset...
    Network(String),
    /// Request exceeded the configured timeout
    Timeout,
    /// Non-2xx response
    Status(u16),
    /// Body was not the expected JSON
    Decode(String),
    /// Websocket handshake or framing error
    Socket(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Status(code) => write!(f, "Server returned HTTP {}", code),
            Self::Decode(msg) => write!(f, "Malformed response: {}", msg),
            Self::Socket(msg) => write!(f, "Socket error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/response seam
// ─────────────────────────────────────────────────────────────────────────────

/// Paged search and filter suggestions
///
/// Implementations are cheap to clone; the console clones one into every
/// spawned request task.
pub trait SearchBackend: Clone + Send + Sync + 'static {
    fn search(
        &self,
        query: SearchQuery,
    ) -> impl Future<Output = Result<SearchPage, TransportError>> + Send;

    fn suggested_filters(&self) -> impl Future<Output = Result<Suggestions, TransportError>> + Send;
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket seam
// ─────────────────────────────────────────────────────────────────────────────

/// Which persistent channel a socket serves, and the tag its events carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketChannel {
    Tail { epoch: u64 },
    Chat { session: u64 },
}

impl SocketChannel {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Tail { .. } => TAIL_PATH,
            Self::Chat { .. } => CHAT_PATH,
        }
    }

    pub fn opened(&self) -> ConsoleEvent {
        match *self {
            Self::Tail { epoch } => ConsoleEvent::TailOpened { epoch },
            Self::Chat { session } => ConsoleEvent::ChatOpened { session },
        }
    }

    pub fn message(&self, text: String) -> ConsoleEvent {
        match *self {
            Self::Tail { epoch } => ConsoleEvent::TailMessage {
                epoch,
                payload: text,
            },
            Self::Chat { session } => ConsoleEvent::ChatToken {
                session,
                token: text,
            },
        }
    }

    pub fn closed(&self, reason: Option<String>) -> ConsoleEvent {
        match *self {
            Self::Tail { epoch } => ConsoleEvent::TailClosed { epoch, reason },
            Self::Chat { session } => ConsoleEvent::ChatClosed { session, reason },
        }
    }
}

/// Frames the console sends down a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Owning handle to a socket pump task
///
/// `close()` asks the pump to send a close frame and exit. Dropping an
/// unclosed handle aborts the pump.
#[derive(Debug)]
pub struct SocketHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl SocketHandle {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, task: JoinHandle<()>) -> Self {
        Self {
            outbound,
            task: Some(task),
        }
    }

    /// Queue a text frame; false if the pump has already exited
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    pub fn close(mut self) {
        let _ = self.outbound.send(Outbound::Close);
        // Detach: the pump finishes the close handshake on its own
        self.task.take();
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens persistent sockets
pub trait Connector: Send + Sync + 'static {
    fn open(&self, channel: SocketChannel, events: mpsc::Sender<ConsoleEvent>) -> SocketHandle;
}
