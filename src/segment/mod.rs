//! Segment Module
//!
//! Append-only segment files holding framed records.
//!
//! ## Responsibilities
//! - Name segments so creation order survives restarts
//! - Append flush batches to the current segment
//! - Positioned reads for index lookups
//! - Rotation: seal the current segment and open a fresh one
//! - Startup replay into the index
//! - Atomic installation of compacted segments
//!
//! ## On-Disk Layout
//! ```text
//! {data_dir}/
//!   ├── data_00000000000000000001.table   sealed, read-only
//!   ├── data_00000000000000000002.table   sealed, read-only
//!   ├── data.table                        current, open for appends
//!   └── data_00000000000000000002.1.tmp   compaction output (transient)
//! ```
//!
//! Segment ids only grow. The current segment owns id `max(sealed) + 1` and
//! keeps it when it is sealed, so index entries survive rotation unchanged.

mod file;
mod store;

use std::fmt;
use std::path::Path;

pub use file::{ActiveSegment, ScannedRecord, SealedSegment, SegmentScanner};
pub(crate) use file::remove_if_exists;
pub use store::{ReplayStats, SegmentSnapshot, SegmentStore};

/// File name of the current segment
pub const CURRENT_SEGMENT_FILE: &str = "data.table";

const SEGMENT_PREFIX: &str = "data_";
const SEGMENT_EXTENSION: &str = "table";
const TEMP_EXTENSION: &str = "tmp";

/// Creation-ordered segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn next(self) -> SegmentId {
        SegmentId(self.0 + 1)
    }

    /// "data_00000000000000000042.table"
    pub fn sealed_file_name(self) -> String {
        format!("{}{:020}.{}", SEGMENT_PREFIX, self.0, SEGMENT_EXTENSION)
    }

    /// "data_00000000000000000042.7.tmp"
    ///
    /// `attempt` keeps concurrent rewrites aimed at the same id apart.
    pub fn temp_file_name(self, attempt: u64) -> String {
        format!("{}{:020}.{}.{}", SEGMENT_PREFIX, self.0, attempt, TEMP_EXTENSION)
    }

    /// Parse a sealed segment id from its path
    pub fn from_sealed_path(path: &Path) -> Option<SegmentId> {
        if path.extension()?.to_str()? != SEGMENT_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let digits = stem.strip_prefix(SEGMENT_PREFIX)?;
        digits.parse().ok().map(SegmentId)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Leftover compaction output from an interrupted run
pub(crate) fn is_temp_file(path: &Path) -> bool {
    let is_tmp = path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION);
    let ours = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(SEGMENT_PREFIX));
    is_tmp && ours
}
