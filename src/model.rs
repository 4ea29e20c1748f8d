// Wire types shared by every part of the console
//
// Log records arrive from three places (search pages, tail pushes, and the
// records echoed back into chat payloads), so their shape and their identity
// rule live here rather than next to any one consumer.
//
// Identity: the search service assigns no id. Two records are the same log
// iff timestamp AND message match exactly. Distinct events sharing both
// fields collapse into one; that is the observed wire behavior and is kept.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata keys that can be promoted to a search filter from a row
pub const CLICKABLE_METADATA_KEYS: [&str; 3] = ["user_id", "trace_id", "source_ip"];

// ─────────────────────────────────────────────────────────────────────────────
// Log records
// ─────────────────────────────────────────────────────────────────────────────

/// A single log line as returned by the search service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub level: String,
    pub message: String,
    /// ISO-8601, kept verbatim so identity comparisons stay exact
    pub timestamp: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Owned identity of a log record: `(timestamp, message)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub timestamp: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: &str, message: &str, timestamp: &str) -> Self {
        Self {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: timestamp.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata field (builder style)
    #[cfg(test)]
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            timestamp: self.timestamp.clone(),
            message: self.message.clone(),
        }
    }

    pub fn severity(&self) -> LogLevel {
        LogLevel::classify(&self.level)
    }

    /// One-line summary used by the headless console
    pub fn summary(&self) -> String {
        format!(
            "{} {:<5} {}",
            self.timestamp,
            self.severity().as_str(),
            self.message
        )
    }
}

/// Severity buckets for the free-form `level` string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Other,
}

impl LogLevel {
    pub fn classify(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" | "err" | "fatal" | "critical" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
            Self::Other => "-",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filters
// ─────────────────────────────────────────────────────────────────────────────

/// A `key=value` search filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Promote a clickable metadata field to a `metadata.<key>` filter
    ///
    /// Returns `None` for keys that are not clickable. String values are used
    /// as-is, anything else by its JSON text.
    pub fn from_metadata(key: &str, value: &serde_json::Value) -> Option<Self> {
        if !CLICKABLE_METADATA_KEYS.contains(&key) {
            return None;
        }
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(Self::new(format!("metadata.{}", key), value))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// Active filters, deduplicated by exact `(key, value)` and kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; returns false if an identical one is already active
    pub fn add(&mut self, filter: Filter) -> bool {
        if self.filters.contains(&filter) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<Filter> {
        if index < self.filters.len() {
            Some(self.filters.remove(index))
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Collapse to a key→value mapping; a repeated key keeps its last value
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.filters
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paging
// ─────────────────────────────────────────────────────────────────────────────

/// Allowed page sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PageSize {
    Ten,
    #[default]
    Fifty,
    Hundred,
    FiveHundred,
}

impl PageSize {
    pub const ALL: [PageSize; 4] = [
        PageSize::Ten,
        PageSize::Fifty,
        PageSize::Hundred,
        PageSize::FiveHundred,
    ];

    pub fn get(self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Fifty => 50,
            Self::Hundred => 100,
            Self::FiveHundred => 500,
        }
    }

    pub fn from_u32(n: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|size| size.get() == n)
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok().and_then(Self::from_u32)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /v1/search` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<LogRecord>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    #[serde(default)]
    pub doc_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketList {
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

/// `GET /v1/aggregations/suggested_filters` response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_levels: Option<BucketList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_user_ids: Option<BucketList>,
}

impl Suggestions {
    /// Suggested filters, levels first, in bucket order
    pub fn filters(&self) -> Vec<Filter> {
        let levels = self
            .common_levels
            .iter()
            .flat_map(|list| list.buckets.iter())
            .map(|b| Filter::new("level", b.key.clone()));
        let users = self
            .common_user_ids
            .iter()
            .flat_map(|list| list.buckets.iter())
            .map(|b| Filter::new("metadata.user_id", b.key.clone()));
        levels.chain(users).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters().is_empty()
    }
}
