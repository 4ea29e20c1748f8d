// Logging module - in-memory capture of recent warnings and errors
//
// Failed fetches, dropped sockets and rejected chat submits are never fatal;
// they are logged and the console carries on. This layer keeps the latest of
// those events so `show diag` can print them without scrolling back through
// stderr or the log file.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Maximum number of diagnostics kept in memory
pub const MAX_DIAGNOSTICS: usize = 200;

/// A single captured warning or error
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub target: String,
    /// Message followed by any structured fields as `key=value`
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warn,
}

impl Severity {
    fn from_level(level: &Level) -> Option<Self> {
        match *level {
            Level::ERROR => Some(Severity::Error),
            Level::WARN => Some(Severity::Warn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
        }
    }
}

/// Bounded ring of recent diagnostics, shared between the layer and the console
#[derive(Clone)]
pub struct DiagnosticBuffer {
    entries: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
}

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_DIAGNOSTICS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Diagnostic>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append, dropping the oldest entry when full
    pub fn add(&self, entry: Diagnostic) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All entries, oldest first
    pub fn get_all(&self) -> Vec<Diagnostic> {
        self.lock().iter().cloned().collect()
    }
}

impl Default for DiagnosticBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracing layer that copies WARN and ERROR events into a [`DiagnosticBuffer`]
pub struct DiagnosticLayer {
    buffer: DiagnosticBuffer,
}

impl DiagnosticLayer {
    pub fn new(buffer: DiagnosticBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for DiagnosticLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let Some(level) = Severity::from_level(metadata.level()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.add(Diagnostic {
            timestamp: Utc::now(),
            level,
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Collects the message plus structured fields of a tracing event
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field.name(), &format!("{:?}", value));
        }
    }
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: &str) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}
