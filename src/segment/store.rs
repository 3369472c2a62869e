//! Segment Store
//!
//! Owns the current segment and every sealed segment in the data directory.
//!
//! ## Responsibilities
//! - Discover sealed segments on startup and derive the current segment id
//! - Replay all segments, oldest first, into the index
//! - Route positioned reads to the right file
//! - Rotate the current segment once it is full
//! - Swap compacted output in for its input segments

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{
    is_temp_file, remove_if_exists, ActiveSegment, SealedSegment, SegmentId, SegmentScanner,
    CURRENT_SEGMENT_FILE,
};
use crate::error::{CinderError, Result};
use crate::index::{Index, RecordLocation};
use crate::record::{decode_frame, Record};

/// Point-in-time view of a sealed segment, taken before compacting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSnapshot {
    pub id: SegmentId,
    pub path: PathBuf,
    pub generation: u64,
    pub len: u64,
}

/// Outcome of a startup replay
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    /// Segments scanned (sealed + current)
    pub segments: usize,

    /// Records applied to the index
    pub records: u64,

    /// Segments whose scan stopped at a corrupt record
    pub corrupted_segments: usize,

    /// Bytes cut from the tail of the current segment
    pub truncated_bytes: u64,
}

/// Manages the segment files of one data directory
///
/// ## Concurrency:
/// - Mutating methods take `&mut self`; the engine calls them under its
///   exclusive state lock (and its structural lock for rotate/install)
/// - `read` takes `&self`; segment files carry their own read mutex
pub struct SegmentStore {
    /// Directory holding every segment file
    dir: PathBuf,

    /// Segment receiving appends
    current: ActiveSegment,

    /// Read-only segments, ordered oldest -> newest
    sealed: BTreeMap<SegmentId, SealedSegment>,

    /// Next generation handed to a sealed or rewritten segment
    next_generation: u64,
}

impl SegmentStore {
    /// Open or create the segment store in `dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Delete compaction output left by an interrupted run
    /// 3. Open readers for every sealed segment
    /// 4. Open the current segment with id = newest sealed + 1
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            if is_temp_file(&path) {
                tracing::info!(path = %path.display(), "Removing stale compaction output");
                fs::remove_file(&path)?;
                continue;
            }

            if let Some(id) = SegmentId::from_sealed_path(&path) {
                ids.push(id);
            }
        }
        ids.sort();

        let mut next_generation = 1;
        let mut sealed = BTreeMap::new();
        for id in ids {
            let path = dir.join(id.sealed_file_name());
            sealed.insert(id, SealedSegment::open(&path, id, next_generation)?);
            next_generation += 1;
        }

        let current_id = sealed
            .keys()
            .next_back()
            .map(|id: &SegmentId| id.next())
            .unwrap_or(SegmentId(1));
        let current = ActiveSegment::open(&dir.join(CURRENT_SEGMENT_FILE), current_id)?;

        tracing::debug!(
            sealed = sealed.len(),
            current = %current_id,
            "Opened segment store at {}",
            dir.display()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            current,
            sealed,
            next_generation,
        })
    }

    /// Rebuild `index` from disk
    ///
    /// Segments are replayed oldest first, so the last occurrence of a key
    /// wins. A corrupt frame ends the scan of its segment; everything before
    /// it is kept. A corrupt tail on the current segment is truncated so new
    /// appends stay reachable by the next replay.
    pub fn replay(&mut self, index: &mut Index) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();

        for segment in self.sealed.values() {
            let outcome = replay_segment(segment.path(), segment.id(), index)?;
            stats.segments += 1;
            stats.records += outcome.records;
            if outcome.corrupt {
                stats.corrupted_segments += 1;
            }
        }

        let outcome = replay_segment(self.current.path(), self.current.id(), index)?;
        stats.segments += 1;
        stats.records += outcome.records;
        if outcome.corrupt {
            stats.corrupted_segments += 1;
            let dropped = self.current.len() - outcome.valid_len;
            self.current.truncate(outcome.valid_len)?;
            stats.truncated_bytes = dropped;
            tracing::warn!(
                segment = %self.current.id(),
                "Truncated {} corrupt bytes from current segment",
                dropped
            );
        }

        Ok(stats)
    }

    // =========================================================================
    // Reads and Appends
    // =========================================================================

    /// Append encoded frames to the current segment
    pub fn append_batch(&mut self, frames: &[Bytes]) -> Result<Vec<RecordLocation>> {
        self.current.append_batch(frames)
    }

    /// fsync the current segment
    pub fn sync(&mut self) -> Result<()> {
        self.current.sync()
    }

    /// Read and decode the record at `location`
    pub fn read(&self, location: RecordLocation) -> Result<Record> {
        let bytes = if location.segment == self.current.id() {
            self.current.read_at(location.offset, location.len)?
        } else {
            self.sealed
                .get(&location.segment)
                .ok_or(CinderError::UnknownSegment(location.segment.0))?
                .read_at(location.offset, location.len)?
        };

        decode_frame(&bytes)
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Seal the current segment and start a new one
    ///
    /// Returns the id of the sealed segment, or `None` when the current
    /// segment is empty and there is nothing to seal.
    pub fn rotate(&mut self) -> Result<Option<SegmentId>> {
        if self.current.is_empty() {
            return Ok(None);
        }

        let id = self.current.id();
        let current_path = self.current.path().to_path_buf();
        let sealed_path = self.dir.join(id.sealed_file_name());

        self.current.sync()?;
        fs::rename(&current_path, &sealed_path)?;

        let opened = SealedSegment::open(&sealed_path, id, self.next_generation)
            .and_then(|sealed| Ok((sealed, ActiveSegment::open(&current_path, id.next())?)));

        let (sealed, fresh) = match opened {
            Ok(pair) => pair,
            Err(e) => {
                if let Err(undo) = fs::rename(&sealed_path, &current_path) {
                    tracing::error!(segment = %id, "Failed to undo rotation rename: {}", undo);
                }
                return Err(e);
            }
        };

        self.next_generation += 1;
        self.current = fresh;
        self.sealed.insert(id, sealed);

        tracing::debug!(sealed = %id, current = %id.next(), "Rotated segment");
        Ok(Some(id))
    }

    // =========================================================================
    // Compaction Support
    // =========================================================================

    /// Snapshot one sealed segment
    pub fn snapshot(&self, id: SegmentId) -> Option<SegmentSnapshot> {
        self.sealed.get(&id).map(snapshot_of)
    }

    /// Snapshot every sealed segment, oldest first
    pub fn sealed_snapshots(&self) -> Vec<SegmentSnapshot> {
        self.sealed.values().map(snapshot_of).collect()
    }

    /// Where compaction output for `target` is written before the swap
    pub fn temp_path(&self, target: SegmentId, attempt: u64) -> PathBuf {
        self.dir.join(target.temp_file_name(attempt))
    }

    /// Replace `inputs` with the compacted file at `temp`
    ///
    /// `inputs` must be ordered oldest first. The output takes the id (and so
    /// the creation-order slot) of the newest input; the other inputs are
    /// deleted. Returns `None` without touching any segment if an input was
    /// replaced or deleted after its snapshot was taken; the temp file is
    /// discarded in that case.
    pub fn install(&mut self, inputs: &[SegmentSnapshot], temp: &Path) -> Result<Option<SegmentId>> {
        let target = match inputs.last() {
            Some(snapshot) => snapshot.id,
            None => {
                return Err(CinderError::Storage(
                    "Cannot install compaction without inputs".to_string(),
                ))
            }
        };

        let stale = inputs.iter().any(|snapshot| {
            self.sealed
                .get(&snapshot.id)
                .map_or(true, |segment| segment.generation() != snapshot.generation)
        });
        if stale {
            remove_if_exists(temp)?;
            return Ok(None);
        }

        let target_path = self.dir.join(target.sealed_file_name());
        fs::rename(temp, &target_path)?;

        let rewritten = SealedSegment::open(&target_path, target, self.next_generation)?;
        self.next_generation += 1;
        self.sealed.insert(target, rewritten);

        for snapshot in &inputs[..inputs.len() - 1] {
            self.sealed.remove(&snapshot.id);
            if let Err(e) = remove_if_exists(&snapshot.path) {
                // Harmless on replay: the rewritten segment is newer and
                // holds the latest record for every key in this file.
                tracing::warn!(segment = %snapshot.id, "Failed to delete merged segment: {}", e);
            }
        }

        Ok(Some(target))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn current_id(&self) -> SegmentId {
        self.current.id()
    }

    /// Size of the current segment in bytes
    pub fn current_len(&self) -> u64 {
        self.current.len()
    }

    /// Sealed segment ids, oldest first
    pub fn sealed_ids(&self) -> Vec<SegmentId> {
        self.sealed.keys().copied().collect()
    }

    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    #[cfg(test)]
    pub(crate) fn current_mut(&mut self) -> &mut ActiveSegment {
        &mut self.current
    }
}

fn snapshot_of(segment: &SealedSegment) -> SegmentSnapshot {
    SegmentSnapshot {
        id: segment.id(),
        path: segment.path().to_path_buf(),
        generation: segment.generation(),
        len: segment.len(),
    }
}

struct SegmentReplay {
    records: u64,
    valid_len: u64,
    corrupt: bool,
}

fn replay_segment(path: &Path, id: SegmentId, index: &mut Index) -> Result<SegmentReplay> {
    let mut scanner = SegmentScanner::open(path)?;
    let mut records = 0;
    let mut corrupt = false;

    while let Some(item) = scanner.next() {
        match item {
            Ok(scanned) => {
                let location = RecordLocation {
                    segment: id,
                    offset: scanned.offset,
                    len: scanned.len,
                };
                index.insert(scanned.record.key().to_string(), location);
                records += 1;
            }
            Err(CinderError::Corruption(reason)) => {
                tracing::warn!(
                    segment = %id,
                    offset = scanner.valid_len(),
                    "Stopping replay at corrupt record: {}",
                    reason
                );
                corrupt = true;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(SegmentReplay {
        records,
        valid_len: scanner.valid_len(),
        corrupt,
    })
}
