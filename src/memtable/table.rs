//! MemTable implementation
//!
//! BTreeMap-based memtable keyed by record key.

use std::collections::BTreeMap;

use crate::record::Record;

/// In-memory table for recent writes
#[derive(Debug, Default)]
pub struct MemTable {
    /// Latest record per key
    data: BTreeMap<String, Record>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the latest buffered record for a key
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.data.get(key)
    }

    /// Buffer a record, replacing any earlier one for the same key
    ///
    /// Returns the new record count.
    pub fn insert(&mut self, record: Record) -> usize {
        self.data.insert(record.key().to_string(), record);
        self.data.len()
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate records in key order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.data.values()
    }
}
