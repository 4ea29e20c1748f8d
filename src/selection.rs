//! Row selection and the chat context working set
//!
//! - `SelectionSet`: indices into the *currently displayed* rows. Indices only
//!   mean something relative to the row sequence that produced them, so the
//!   owner clears (or remaps) the set whenever that sequence changes.
//! - `ContextSet`: log records attached to chat questions. Ordered by insertion,
//!   deduplicated by log identity, uncapped.

use crate::model::{LogRecord, RecordKey};
use std::collections::{BTreeSet, HashSet};

// ─────────────────────────────────────────────────────────────────────────────
// SelectionSet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    indices: BTreeSet<usize>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `index`; returns true if it is now selected
    pub fn toggle(&mut self, index: usize) -> bool {
        if self.indices.remove(&index) {
            false
        } else {
            self.indices.insert(index);
            true
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Selected indices in display order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// Follow the rows after one record was prepended to a list capped at `row_count`
    pub fn shift_for_prepend(&mut self, row_count: usize) {
        self.indices = self
            .indices
            .iter()
            .map(|i| i + 1)
            .filter(|i| *i < row_count)
            .collect();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ContextSet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ContextSet {
    records: Vec<LogRecord>,
    keys: HashSet<RecordKey>,
}

impl ContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, record: &LogRecord) -> bool {
        self.keys.contains(&record.key())
    }

    /// Append `record` unless the same log is already present
    pub fn add(&mut self, record: LogRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Remove whatever currently sits at `index`
    pub fn remove(&mut self, index: usize) -> Option<LogRecord> {
        if index >= self.records.len() {
            return None;
        }
        let record = self.records.remove(index);
        self.keys.remove(&record.key());
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.keys.clear();
    }

    pub fn as_slice(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Move every selected row into the context set, then clear the selection
///
/// Rows already in context are skipped, new ones are appended in display
/// order, and indices past the end of `rows` are ignored. Both sets are
/// borrowed mutably for the whole call so no caller can observe one updated
/// without the other. Returns the number of records added.
pub fn add_selection_to_context<'a, F>(
    selection: &mut SelectionSet,
    context: &mut ContextSet,
    row: F,
) -> usize
where
    F: Fn(usize) -> Option<&'a LogRecord>,
{
    let mut added = 0;
    for index in selection.iter() {
        if let Some(record) = row(index) {
            if context.add(record.clone()) {
                added += 1;
            }
        }
    }
    selection.clear();
    added
}
