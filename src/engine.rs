//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Buffer writes in the memtable and flush them to the current segment
//! - Serve reads from memtables, then index-directed segment reads
//! - Rotate full segments and hand them to the compaction workers
//! - Install compacted segments without disturbing readers
//! - Rebuild the index from disk on startup

use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};

use crate::compaction::{
    self, CompactionKind, CompactionReport, CompactionRunner, CompactionScheduler,
};
use crate::config::{Config, SyncStrategy};
use crate::error::{CinderError, Result};
use crate::index::Index;
use crate::memtable::MemTable;
use crate::protocol::Command;
use crate::record::{encode_frame, Record};
use crate::segment::{remove_if_exists, SegmentId, SegmentSnapshot, SegmentStore};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **State lock** (`RwLock<EngineState>`): memtables, index and segment
///   store. `set`/`remove`/flush and compaction installs take the exclusive
///   side; `get` takes the shared side.
/// - **Structural lock** (`Mutex<()>`): serializes rotation against
///   compaction installs (rename/delete of segment files). Always acquired
///   after the state lock.
/// - Compaction reads and writes its temp file with neither lock held, so a
///   long merge never blocks ordinary reads and writes.
pub struct Engine {
    inner: Arc<EngineInner>,

    /// Background compaction threads, taken on close
    scheduler: Mutex<Option<CompactionScheduler>>,
}

struct EngineInner {
    /// Engine configuration
    config: Config,

    /// Everything readers and writers touch
    state: RwLock<EngineState>,

    /// Serializes segment-file structural changes (rotate, install)
    ///
    /// Both callers already hold the exclusive state lock; it is always
    /// acquired second and adds no exclusion beyond that lock.
    structure_lock: Mutex<()>,

    /// Rotated segments awaiting compaction (None when workers are disabled)
    compaction_tx: Option<Sender<SegmentId>>,

    /// Distinguishes temp files of concurrent rewrites
    rewrite_attempt: AtomicU64,

    closed: AtomicBool,
}

struct EngineState {
    /// Receives new writes
    active: MemTable,

    /// Frozen generation being flushed, kept here if the flush failed
    immutable: Option<MemTable>,

    /// Key -> latest on-disk record
    index: Index,

    /// Current and sealed segments
    segments: SegmentStore,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if needed
    /// 2. Discover sealed segments and the current segment
    /// 3. Replay every segment, oldest first, into the index
    /// 4. Start the compaction workers and merge cycle
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let mut segments = SegmentStore::open(&config.data_dir)?;
        let mut index = Index::new();
        let stats = segments.replay(&mut index)?;

        tracing::info!(
            segments = stats.segments,
            records = stats.records,
            keys = index.len(),
            corrupted = stats.corrupted_segments,
            truncated_bytes = stats.truncated_bytes,
            "Replayed data directory {}",
            config.data_dir.display()
        );

        let (compaction_tx, compaction_rx) = unbounded();
        let compaction_tx = (config.compaction_workers > 0).then_some(compaction_tx);

        let inner = Arc::new(EngineInner {
            state: RwLock::new(EngineState {
                active: MemTable::new(),
                immutable: None,
                index,
                segments,
            }),
            structure_lock: Mutex::new(()),
            compaction_tx,
            rewrite_attempt: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
        });

        let scheduler = CompactionScheduler::start(
            Arc::clone(&inner),
            compaction_rx,
            inner.config.compaction_workers,
            inner.config.merge_interval(),
        )?;

        Ok(Self {
            inner,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Execute a command
    ///
    /// Routes adapter commands to the matching engine operation
    pub fn execute(&self, command: Command) -> Result<Option<String>> {
        match command {
            Command::Get { key } => self.get(&key),
            Command::Set { key, value } => {
                self.set(&key, &value)?;
                Ok(None)
            }
            Command::Remove { key } => {
                self.remove(&key)?;
                Ok(None)
            }
            Command::Ping => Ok(Some("PONG".to_string())),
        }
    }

    /// Get the latest value for a key
    ///
    /// Search order:
    /// 1. Active memtable
    /// 2. Immutable memtable
    /// 3. Index-directed segment read
    ///
    /// A tombstone at any stage ends the search with `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.ensure_open()?;
        let state = self.inner.state.read();

        if let Some(record) = state.active.get(key) {
            return Ok(record.value().map(str::to_string));
        }

        if let Some(record) = state.immutable.as_ref().and_then(|table| table.get(key)) {
            return Ok(record.value().map(str::to_string));
        }

        let location = match state.index.get(key) {
            Some(location) => location,
            None => return Ok(None),
        };

        let record = state.segments.read(location)?;
        if record.key() != key {
            return Err(CinderError::Corruption(format!(
                "Index entry for {:?} resolves to a record for {:?}",
                key,
                record.key()
            )));
        }

        Ok(record.into_value())
    }

    /// Set a key to a value
    ///
    /// Buffers the write; reaching the memtable threshold flushes it, which
    /// may in turn rotate the current segment.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.write(Record::set(key, value))
    }

    /// Remove a key
    ///
    /// Buffers a tombstone exactly like `set`; space is reclaimed only when
    /// older records for the key are compacted away.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.inner.write(Record::remove(key))
    }

    /// Flush buffered writes to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let mut state = self.inner.state.write();
        self.inner.flush_locked(&mut state)
    }

    /// Close the engine gracefully
    ///
    /// Stops background compaction, flushes buffered writes and syncs the
    /// current segment. Calling it again is a no-op. If the final flush
    /// fails the engine stays open so the call can be retried.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }

        let mut state = self.inner.state.write();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.flush_locked(&mut state)?;
        state.segments.sync()?;
        self.inner.closed.store(true, Ordering::SeqCst);

        tracing::info!(
            keys = state.index.len(),
            sealed = state.segments.sealed_count(),
            "Engine closed"
        );
        Ok(())
    }

    // =========================================================================
    // Compaction (manual triggers)
    // =========================================================================

    /// Deduplicate one sealed segment now
    ///
    /// Returns `None` when the segment no longer exists or holds no
    /// overwritten records.
    pub fn compact_segment(&self, id: SegmentId) -> Result<Option<CompactionReport>> {
        self.inner.ensure_open()?;
        self.inner.compact_segment(id)
    }

    /// Merge every sealed segment into one now
    ///
    /// Returns `None` when fewer than two sealed segments exist.
    pub fn merge_segments(&self) -> Result<Option<CompactionReport>> {
        self.inner.ensure_open()?;
        self.inner.merge_segments()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Records buffered in memory (active + immutable)
    pub fn memtable_len(&self) -> usize {
        let state = self.inner.state.read();
        state.active.len() + state.immutable.as_ref().map_or(0, MemTable::len)
    }

    /// Keys with a persisted record
    pub fn index_len(&self) -> usize {
        self.inner.state.read().index.len()
    }

    /// Sealed segment ids, oldest first
    pub fn sealed_segments(&self) -> Vec<SegmentId> {
        self.inner.state.read().segments.sealed_ids()
    }

    /// Id of the segment receiving appends
    pub fn current_segment(&self) -> SegmentId {
        self.inner.state.read().segments.current_id()
    }

    /// Size of the current segment in bytes
    pub fn current_segment_len(&self) -> u64 {
        self.inner.state.read().segments.current_len()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close engine on drop: {}", e);
        }
    }
}

impl EngineInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CinderError::Closed);
        }
        Ok(())
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    fn write(&self, record: Record) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write();

        let buffered = state.active.insert(record);
        if buffered >= self.config.memtable_threshold {
            self.flush_locked(&mut state)?;
        }

        Ok(())
    }

    /// Freeze the active memtable and flush it (state lock held)
    ///
    /// A generation left behind by an earlier failed flush is retried first,
    /// so at most one immutable generation ever exists.
    fn flush_locked(&self, state: &mut EngineState) -> Result<()> {
        self.flush_immutable(state)?;

        if !state.active.is_empty() {
            state.immutable = Some(mem::take(&mut state.active));
            self.flush_immutable(state)?;
        }

        Ok(())
    }

    /// Append the immutable generation, then publish it in the index
    fn flush_immutable(&self, state: &mut EngineState) -> Result<()> {
        let frames = match state.immutable.as_ref() {
            Some(frozen) => frozen.iter().map(encode_frame).collect::<Result<Vec<_>>>()?,
            None => return Ok(()),
        };

        let locations = state.segments.append_batch(&frames)?;
        if self.config.sync_strategy == SyncStrategy::EveryFlush {
            state.segments.sync()?;
        }

        // Bytes are on disk; only now may readers be pointed at them
        if let Some(frozen) = state.immutable.take() {
            for (record, location) in frozen.iter().zip(locations) {
                state.index.insert(record.key().to_string(), location);
            }
        }

        tracing::debug!(
            records = frames.len(),
            segment = %state.segments.current_id(),
            segment_len = state.segments.current_len(),
            "Flushed memtable"
        );

        if state.segments.current_len() >= self.config.segment_size_limit {
            self.rotate(state)?;
        }

        Ok(())
    }

    fn rotate(&self, state: &mut EngineState) -> Result<()> {
        let _structure = self.structure_lock.lock();

        if let Some(sealed) = state.segments.rotate()? {
            tracing::info!(
                sealed = %sealed,
                current = %state.segments.current_id(),
                "Rotated current segment"
            );

            if let Some(tx) = &self.compaction_tx {
                if tx.send(sealed).is_err() {
                    tracing::debug!(segment = %sealed, "Compaction workers stopped; not queued");
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    fn compact_segment(&self, id: SegmentId) -> Result<Option<CompactionReport>> {
        let (snapshot, temp) = {
            let state = self.state.read();
            match state.segments.snapshot(id) {
                Some(snapshot) => (snapshot, state.segments.temp_path(id, self.next_attempt())),
                None => {
                    tracing::debug!(segment = %id, "Segment gone before compaction; skipping");
                    return Ok(None);
                }
            }
        };

        self.rewrite_and_install(CompactionKind::Segment, vec![snapshot], &temp)
    }

    fn merge_segments(&self) -> Result<Option<CompactionReport>> {
        let (inputs, temp) = {
            let state = self.state.read();
            let inputs = state.segments.sealed_snapshots();
            let target = match inputs.last() {
                Some(newest) if inputs.len() >= 2 => newest.id,
                _ => return Ok(None),
            };
            (inputs, state.segments.temp_path(target, self.next_attempt()))
        };

        self.rewrite_and_install(CompactionKind::Merge, inputs, &temp)
    }

    fn rewrite_and_install(
        &self,
        kind: CompactionKind,
        inputs: Vec<SegmentSnapshot>,
        temp: &Path,
    ) -> Result<Option<CompactionReport>> {
        let output = match compaction::rewrite(&inputs, temp, kind) {
            Ok(Some(output)) => output,
            Ok(None) => return Ok(None),
            Err(e) => {
                discard_temp(temp);
                return Err(e);
            }
        };

        let mut state = self.state.write();
        let _structure = self.structure_lock.lock();

        let target = match state.segments.install(&inputs, &output.path) {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::debug!(?kind, "Inputs rewritten concurrently; discarding output");
                return Ok(None);
            }
            Err(e) => {
                discard_temp(&output.path);
                return Err(e);
            }
        };

        let input_ids: Vec<SegmentId> = inputs.iter().map(|s| s.id).collect();
        let relocated = state.index.relocate(&input_ids, output.locations(target));

        let report = CompactionReport {
            kind,
            target,
            inputs: input_ids,
            records_in: output.records_in,
            records_out: output.records_out(),
            bytes_in: inputs.iter().map(|s| s.len).sum(),
            bytes_out: output.bytes_out,
            relocated,
        };

        tracing::info!(
            ?kind,
            target = %report.target,
            inputs = report.inputs.len(),
            records_in = report.records_in,
            records_out = report.records_out,
            bytes_in = report.bytes_in,
            bytes_out = report.bytes_out,
            live_keys = state.index.live_in(target),
            "Compaction installed"
        );

        Ok(Some(report))
    }

    fn next_attempt(&self) -> u64 {
        self.rewrite_attempt.fetch_add(1, Ordering::Relaxed)
    }
}

impl CompactionRunner for EngineInner {
    fn compact_rotated(&self, id: SegmentId) -> Result<()> {
        self.compact_segment(id).map(|_| ())
    }

    fn run_merge_cycle(&self) -> Result<()> {
        let sealed = self.state.read().segments.sealed_count();
        if sealed <= self.config.merge_threshold {
            return Ok(());
        }

        tracing::debug!(
            sealed,
            threshold = self.config.merge_threshold,
            "Merge threshold exceeded"
        );
        self.merge_segments().map(|_| ())
    }
}

fn discard_temp(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        tracing::warn!(path = %path.display(), "Failed to remove compaction output: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &Path) -> Engine {
        let config = Config::builder()
            .data_dir(dir)
            .memtable_threshold(2)
            .compaction_workers(0)
            .merge_interval_ms(0)
            .build();
        Engine::open(config).unwrap()
    }

    fn set_read_only(engine: &Engine, read_only: bool) {
        let mut state = engine.inner.state.write();
        state.segments.current_mut().set_read_only(read_only).unwrap();
    }

    #[test]
    fn test_failed_flush_retains_generation_for_retry() {
        let temp = TempDir::new().unwrap();
        let engine = open(temp.path());

        set_read_only(&engine, true);
        engine.set("a", "1").unwrap();
        let result = engine.set("b", "2");

        assert!(matches!(result, Err(CinderError::Io(_))));
        assert_eq!(engine.index_len(), 0);
        assert_eq!(engine.current_segment_len(), 0);
        assert_eq!(engine.memtable_len(), 2);
        assert!(engine.inner.state.read().immutable.is_some());
        assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));

        // Writes keep landing in the fresh active table meanwhile
        engine.set("c", "3").unwrap();
        assert_eq!(engine.memtable_len(), 3);

        set_read_only(&engine, false);
        engine.flush().unwrap();

        assert_eq!(engine.memtable_len(), 0);
        assert_eq!(engine.index_len(), 3);
        engine.close().unwrap();
        drop(engine);

        let engine = open(temp.path());
        assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(engine.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(engine.get("c").unwrap(), Some("3".to_string()));
    }
}
