// Live tail buffer - bounded, newest-first view of the push feed
//
// Each push is one JSON-encoded log record. Records are prepended and the
// oldest fall off the back once the buffer is full. No deduplication: the
// feed is at-least-once, and every delivery is shown.

use crate::model::LogRecord;
use std::collections::VecDeque;

/// Default number of tail entries kept on screen
pub const DEFAULT_TAIL_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct TailBuffer {
    entries: VecDeque<LogRecord>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Start from rows already on screen (newest first), trimmed to capacity
    pub fn seeded(capacity: usize, rows: &[LogRecord]) -> Self {
        let mut buffer = Self::new(capacity);
        buffer
            .entries
            .extend(rows.iter().take(buffer.capacity).cloned());
        buffer
    }

    /// Prepend a record; returns true if the oldest entry was dropped
    pub fn push(&mut self, record: LogRecord) -> bool {
        self.entries.push_front(record);
        if self.entries.len() > self.capacity {
            self.entries.truncate(self.capacity);
            true
        } else {
            false
        }
    }

    /// Parse one push payload and prepend it
    pub fn ingest(&mut self, payload: &str) -> Result<(), serde_json::Error> {
        let record: LogRecord = serde_json::from_str(payload)?;
        self.push(record);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&LogRecord> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_CAPACITY)
    }
}
