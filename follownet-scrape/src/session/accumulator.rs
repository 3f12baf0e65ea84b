//! Ordered, de-duplicated record collection for one session

use std::collections::HashSet;

use follownet_common::{Record, RecordKey};

/// Records accepted so far, in first-accepted order
///
/// Identity is `(platform, username)`. Once closed, no further record is
/// accepted, so every snapshot taken afterwards is final.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    records: Vec<Record>,
    keys: HashSet<RecordKey>,
    closed: bool,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` unless its identity was already seen
    ///
    /// Returns `true` only when the record was newly accepted.
    pub fn append(&mut self, record: Record) -> bool {
        if self.closed || !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Stop accepting records
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Copy of the accepted records; later appends do not affect it
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }
}
