//! Pages and the multi-key accumulator.

use std::collections::HashMap;

use super::cursor::Cursor;

/// One decoded response from a collection endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    /// Records grouped by key, in server order within each key.
    pub per_key: HashMap<String, Vec<R>>,
    /// Continuation token; `None` ends the pagination.
    pub next_cursor: Option<Cursor>,
}

impl<R> Page<R> {
    /// Total records in this page across every key.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.per_key.values().map(Vec::len).sum()
    }
}

/// Final result of a multi-key pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulated<R> {
    /// Records per key, concatenated across all pages.
    pub per_key: HashMap<String, Vec<R>>,
    /// Empty when pagination was exhausted; otherwise the cursor to resume
    /// from.
    pub cursor: Cursor,
}

impl<R> Accumulated<R> {
    /// Take one key's records, yielding an empty sequence when the key never
    /// appeared in any page.
    #[must_use]
    pub fn take_key(&mut self, key: &str) -> Vec<R> {
        self.per_key.remove(key).unwrap_or_default()
    }

    /// Total records across every key.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.per_key.values().map(Vec::len).sum()
    }
}

/// Append-only per-key accumulator.
#[derive(Debug, Clone)]
pub struct Accumulator<R> {
    per_key: HashMap<String, Vec<R>>,
}

impl<R> Default for Accumulator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Accumulator<R> {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            per_key: HashMap::new(),
        }
    }

    /// Create an empty accumulator sized for `keys` keys.
    #[must_use]
    pub fn with_capacity(keys: usize) -> Self {
        Self {
            per_key: HashMap::with_capacity(keys),
        }
    }

    /// Append every key's records from `per_key`, preserving their order.
    ///
    /// Returns the number of records merged.
    pub fn merge(&mut self, per_key: HashMap<String, Vec<R>>) -> usize {
        let mut merged = 0;
        for (key, records) in per_key {
            merged += records.len();
            self.per_key.entry(key).or_default().extend(records);
        }
        merged
    }

    /// Records accumulated for `key` so far.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[R]> {
        self.per_key.get(key).map(Vec::as_slice)
    }

    /// Finish accumulation with the cursor at the stopping point.
    #[must_use]
    pub fn finish(self, cursor: Cursor) -> Accumulated<R> {
        Accumulated {
            per_key: self.per_key,
            cursor,
        }
    }
}
