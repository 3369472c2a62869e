//! Index Module
//!
//! In-memory map from key to the on-disk location of its latest record.
//!
//! Every entry names the segment it points into, so a lookup is always a
//! single positioned read. Entries for tombstones are kept: the segment read
//! then reports the key as removed.

use std::collections::{HashMap, HashSet};

use crate::segment::SegmentId;

/// Where a record's frame lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    /// Segment holding the frame
    pub segment: SegmentId,

    /// Byte offset of the frame start (header included)
    pub offset: u64,

    /// Full frame length in bytes (header included)
    pub len: u32,
}

/// Key -> location of the latest persisted record
#[derive(Debug, Default)]
pub struct Index {
    entries: HashMap<String, RecordLocation>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<RecordLocation> {
        self.entries.get(key).copied()
    }

    /// Point a key at a newer record, returning the previous location
    pub fn insert(&mut self, key: String, location: RecordLocation) -> Option<RecordLocation> {
        self.entries.insert(key, location)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys whose latest record lives in `segment`
    pub fn live_in(&self, segment: SegmentId) -> usize {
        self.entries
            .values()
            .filter(|loc| loc.segment == segment)
            .count()
    }

    /// Move keys out of compacted segments into the rewritten one
    ///
    /// Only keys that currently point into one of `inputs` are touched; a key
    /// already pointing at a newer segment keeps its entry. A key pointing
    /// into an input but missing from `relocated` sat past a corrupt frame,
    /// and its entry is dropped. Returns the number of entries rewritten.
    pub fn relocate<I>(&mut self, inputs: &[SegmentId], relocated: I) -> usize
    where
        I: IntoIterator<Item = (String, RecordLocation)>,
    {
        let inputs: HashSet<SegmentId> = inputs.iter().copied().collect();
        let mut relocated: HashMap<String, RecordLocation> = relocated.into_iter().collect();
        let mut moved = 0;

        self.entries.retain(|key, entry| {
            if !inputs.contains(&entry.segment) {
                return true;
            }
            match relocated.remove(key) {
                Some(location) => {
                    *entry = location;
                    moved += 1;
                    true
                }
                None => false,
            }
        });

        moved
    }
}
