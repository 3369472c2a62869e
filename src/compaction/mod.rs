//! Compaction Module
//!
//! Rewrites sealed segments so each key keeps only its latest record.
//!
//! ## Two granularities
//! - **Segment**: a freshly rotated segment is deduplicated on its own by the
//!   worker pool, off the write path.
//! - **Merge**: a scheduled cycle folds every sealed segment into one once
//!   their count passes the merge threshold. The newest record for a key wins.
//!
//! Tombstones are latest records too, so both forms keep them; only
//! overwritten records are dropped and `get` answers the same before and
//! after a rewrite.
//!
//! Output is written to a temp file with no engine lock held, then swapped in
//! by the engine under its state and structural locks.

mod compactor;
mod scheduler;

pub use compactor::{rewrite, CompactionOutput};
pub use scheduler::{CompactionRunner, CompactionScheduler};

use crate::segment::SegmentId;

/// Which compaction form produced a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionKind {
    /// Single sealed segment, deduplicated in place
    Segment,

    /// Several sealed segments merged into the newest one's slot
    Merge,
}

/// Summary of an installed rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub kind: CompactionKind,

    /// Segment id now holding the output
    pub target: SegmentId,

    /// Segments consumed, oldest first
    pub inputs: Vec<SegmentId>,

    pub records_in: u64,
    pub records_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    /// Index entries moved to the rewritten segment
    pub relocated: usize,
}
