//! Segment files
//!
//! The current (appendable) segment, sealed read-only segments, and a
//! sequential scanner used by replay and compaction.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use super::SegmentId;
use crate::error::{CinderError, Result};
use crate::index::RecordLocation;
use crate::record::{read_frame, Record};

// =============================================================================
// Current Segment
// =============================================================================

/// The segment currently open for appends
///
/// Appends need `&mut self` (the engine's exclusive lock); reads go through
/// the mutex so concurrent `get`s can share the engine's read lock.
#[derive(Debug)]
pub struct ActiveSegment {
    id: SegmentId,
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl ActiveSegment {
    /// Open or create the current segment file
    pub fn open(path: &Path, id: SegmentId) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
        })
    }

    /// Append a batch of frames as a single write
    ///
    /// On failure the file is cut back to its previous length so later
    /// appends never land behind a torn frame.
    pub fn append_batch(&mut self, frames: &[Bytes]) -> Result<Vec<RecordLocation>> {
        let start = self.len;
        let total: usize = frames.iter().map(|f| f.len()).sum();

        let mut batch = BytesMut::with_capacity(total);
        let mut locations = Vec::with_capacity(frames.len());
        let mut offset = start;

        for frame in frames {
            locations.push(RecordLocation {
                segment: self.id,
                offset,
                len: frame.len() as u32,
            });
            offset += frame.len() as u64;
            batch.extend_from_slice(frame);
        }

        let file = self.file.get_mut();
        if let Err(e) = file.write_all(&batch) {
            if let Err(rollback) = file.set_len(start) {
                tracing::error!(
                    segment = %self.id,
                    "Failed to roll back partial append: {}",
                    rollback
                );
            }
            return Err(e.into());
        }

        self.len = offset;
        Ok(locations)
    }

    /// fsync appended data
    pub fn sync(&mut self) -> Result<()> {
        self.file.get_mut().sync_data()?;
        Ok(())
    }

    /// Cut the file back to `len` bytes (drops a corrupt tail)
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        let file = self.file.get_mut();
        file.set_len(len)?;
        file.sync_all()?;
        self.len = len;
        Ok(())
    }

    /// Read `len` bytes at `offset`
    pub fn read_at(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        read_exact_at(&self.file, offset, len)
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Swap the write handle for a read-only one so appends fail
    #[cfg(test)]
    pub(crate) fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        let file = if read_only {
            File::open(&self.path)?
        } else {
            OpenOptions::new().read(true).append(true).open(&self.path)?
        };
        self.file = Mutex::new(file);
        Ok(())
    }
}

// =============================================================================
// Sealed Segment
// =============================================================================

/// A rotated, read-only segment
///
/// `generation` changes whenever the file behind this id is replaced, so a
/// compaction started against an older file can detect it was overtaken.
#[derive(Debug)]
pub struct SealedSegment {
    id: SegmentId,
    path: PathBuf,
    generation: u64,
    file: Mutex<File>,
    len: u64,
}

impl SealedSegment {
    pub fn open(path: &Path, id: SegmentId, generation: u64) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            id,
            path: path.to_path_buf(),
            generation,
            file: Mutex::new(file),
            len,
        })
    }

    /// Read `len` bytes at `offset`
    pub fn read_at(&self, offset: u64, len: u32) -> Result<Vec<u8>> {
        read_exact_at(&self.file, offset, len)
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn read_exact_at(file: &Mutex<File>, offset: u64, len: u32) -> Result<Vec<u8>> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => CinderError::Corruption(format!(
            "Record at offset {} ({} bytes) runs past end of segment",
            offset, len
        )),
        _ => CinderError::Io(e),
    })?;

    Ok(buf)
}

// =============================================================================
// Sequential Scan
// =============================================================================

/// A record read during a sequential scan, with its frame position
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedRecord {
    pub record: Record,
    pub offset: u64,
    pub len: u32,
}

/// Reads frames front to back until end of file or the first bad frame
///
/// After an error the scanner yields nothing more; `valid_len()` is then the
/// length of the intact prefix.
pub struct SegmentScanner {
    reader: BufReader<File>,
    offset: u64,
    failed: bool,
}

impl SegmentScanner {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
            failed: false,
        })
    }

    /// Bytes of well-formed frames consumed so far
    pub fn valid_len(&self) -> u64 {
        self.offset
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match read_frame(&mut self.reader) {
            Ok(Some((record, len))) => {
                let offset = self.offset;
                self.offset += len as u64;
                Some(Ok(ScannedRecord {
                    record,
                    offset,
                    len,
                }))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Remove a file, treating "already gone" as success
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_frame;
    use tempfile::TempDir;

    fn frames(records: &[Record]) -> Vec<Bytes> {
        records.iter().map(|r| encode_frame(r).unwrap()).collect()
    }

    #[test]
    fn test_failed_append_leaves_segment_unchanged() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.table");
        let mut segment = ActiveSegment::open(&path, SegmentId(1)).unwrap();
        segment.append_batch(&frames(&[Record::set("a", "1")])).unwrap();
        let before = segment.len();

        segment.set_read_only(true).unwrap();
        let result = segment.append_batch(&frames(&[Record::set("b", "2")]));

        assert!(matches!(result, Err(CinderError::Io(_))));
        assert_eq!(segment.len(), before);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);

        segment.set_read_only(false).unwrap();
        let locations = segment.append_batch(&frames(&[Record::set("b", "2")])).unwrap();
        assert_eq!(locations[0].offset, before);

        let records: Vec<_> = SegmentScanner::open(&path)
            .unwrap()
            .map(|r| r.unwrap().record)
            .collect();
        assert_eq!(records, vec![Record::set("a", "1"), Record::set("b", "2")]);
    }
}
