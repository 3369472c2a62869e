//! Segment rewriting
//!
//! Reads sealed segments oldest first, keeps the newest record per key and
//! writes the survivors to a new file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::CompactionKind;
use crate::error::{CinderError, Result};
use crate::index::RecordLocation;
use crate::record::{encode_frame, Record};
use crate::segment::{SegmentId, SegmentScanner, SegmentSnapshot};

/// A rewritten segment waiting to be installed
#[derive(Debug)]
pub struct CompactionOutput {
    /// Temp file holding the rewritten records
    pub path: PathBuf,

    /// Frame position of every surviving key in the output
    pub entries: Vec<(String, u64, u32)>,

    pub records_in: u64,
    pub bytes_out: u64,
}

impl CompactionOutput {
    pub fn records_out(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Index locations of the surviving keys once the output owns `segment`
    pub fn locations(&self, segment: SegmentId) -> impl Iterator<Item = (String, RecordLocation)> + '_ {
        self.entries.iter().map(move |(key, offset, len)| {
            (
                key.clone(),
                RecordLocation {
                    segment,
                    offset: *offset,
                    len: *len,
                },
            )
        })
    }
}

/// Rewrite `inputs` (oldest first) into `output`
///
/// Returns `None` for a single-segment rewrite that would not drop any
/// record, or when an input file was already removed by a competing
/// compaction; nothing is written in either case. An input is read up to its
/// first corrupt frame, the same prefix replay recovers.
pub fn rewrite(
    inputs: &[SegmentSnapshot],
    output: &Path,
    kind: CompactionKind,
) -> Result<Option<CompactionOutput>> {
    let (latest, records_in) = match collect_latest(inputs) {
        Ok(collected) => collected,
        Err(CinderError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(?kind, "Compaction input already removed; skipping");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    if kind == CompactionKind::Segment && latest.len() as u64 == records_in {
        return Ok(None);
    }

    let (entries, bytes_out) = write_records(output, latest.into_values())?;

    Ok(Some(CompactionOutput {
        path: output.to_path_buf(),
        entries,
        records_in,
        bytes_out,
    }))
}

/// Newest record per key across `inputs`, plus the number of records read
fn collect_latest(inputs: &[SegmentSnapshot]) -> Result<(BTreeMap<String, Record>, u64)> {
    let mut latest = BTreeMap::new();
    let mut records_in = 0;

    for input in inputs {
        let mut scanner = SegmentScanner::open(&input.path)?;
        while let Some(scanned) = scanner.next() {
            let record = match scanned {
                Ok(scanned) => scanned.record,
                Err(CinderError::Corruption(reason)) => {
                    tracing::warn!(
                        segment = %input.id,
                        offset = scanner.valid_len(),
                        "Compacting only the intact prefix: {}",
                        reason
                    );
                    break;
                }
                Err(e) => return Err(e),
            };
            latest.insert(record.key().to_string(), record);
            records_in += 1;
        }
    }

    Ok((latest, records_in))
}

fn write_records<I>(path: &Path, records: I) -> Result<(Vec<(String, u64, u32)>, u64)>
where
    I: Iterator<Item = Record>,
{
    let mut writer = BufWriter::new(File::create(path)?);
    let mut entries = Vec::new();
    let mut offset = 0u64;

    for record in records {
        let frame = encode_frame(&record)?;
        writer.write_all(&frame)?;
        entries.push((record.key().to_string(), offset, frame.len() as u32));
        offset += frame.len() as u64;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok((entries, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ActiveSegment;
    use tempfile::TempDir;

    fn write_segment(dir: &Path, id: u64, records: &[Record]) -> SegmentSnapshot {
        let id = SegmentId(id);
        let path = dir.join(id.sealed_file_name());
        let mut segment = ActiveSegment::open(&path, id).unwrap();
        let frames: Vec<_> = records.iter().map(|r| encode_frame(r).unwrap()).collect();
        segment.append_batch(&frames).unwrap();
        SegmentSnapshot {
            id,
            len: segment.len(),
            path,
            generation: 1,
        }
    }

    fn read_back(path: &Path) -> Vec<Record> {
        SegmentScanner::open(path)
            .unwrap()
            .map(|r| r.unwrap().record)
            .collect()
    }

    #[test]
    fn test_single_segment_keeps_last_record_per_key() {
        let temp = TempDir::new().unwrap();
        let input = write_segment(
            temp.path(),
            1,
            &[
                Record::set("a", "1"),
                Record::set("b", "2"),
                Record::set("a", "3"),
                Record::remove("b"),
            ],
        );
        let out = temp.path().join("out.tmp");

        let output = rewrite(&[input], &out, CompactionKind::Segment)
            .unwrap()
            .unwrap();

        assert_eq!(output.records_in, 4);
        assert_eq!(output.records_out(), 2);
        assert_eq!(
            read_back(&out),
            vec![Record::set("a", "3"), Record::remove("b")]
        );
    }

    #[test]
    fn test_single_segment_without_duplicates_is_skipped() {
        let temp = TempDir::new().unwrap();
        let input = write_segment(temp.path(), 1, &[Record::set("a", "1"), Record::set("b", "2")]);
        let out = temp.path().join("out.tmp");

        assert!(rewrite(&[input], &out, CompactionKind::Segment)
            .unwrap()
            .is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_corrupt_frame_ends_input() {
        let temp = TempDir::new().unwrap();
        let older = write_segment(
            temp.path(),
            1,
            &[Record::set("k", "old"), Record::set("lost", "x")],
        );
        let newer = write_segment(temp.path(), 2, &[Record::set("k", "new")]);

        let mut bytes = std::fs::read(&older.path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&older.path, bytes).unwrap();

        let out = temp.path().join("out.tmp");
        let output = rewrite(&[older, newer], &out, CompactionKind::Merge)
            .unwrap()
            .unwrap();

        assert_eq!(output.records_in, 2);
        assert_eq!(read_back(&out), vec![Record::set("k", "new")]);
    }

    #[test]
    fn test_missing_input_is_skipped() {
        let temp = TempDir::new().unwrap();
        let input = write_segment(temp.path(), 1, &[Record::set("a", "1"), Record::set("a", "2")]);
        std::fs::remove_file(&input.path).unwrap();
        let out = temp.path().join("out.tmp");

        assert!(rewrite(&[input], &out, CompactionKind::Segment)
            .unwrap()
            .is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_merge_prefers_newest_segment() {
        let temp = TempDir::new().unwrap();
        let older = write_segment(temp.path(), 1, &[Record::set("k", "old"), Record::set("x", "1")]);
        let newer = write_segment(temp.path(), 2, &[Record::set("k", "new")]);
        let out = temp.path().join("out.tmp");

        let output = rewrite(&[older, newer], &out, CompactionKind::Merge)
            .unwrap()
            .unwrap();

        assert_eq!(output.records_out(), 2);
        assert_eq!(
            read_back(&out),
            vec![Record::set("k", "new"), Record::set("x", "1")]
        );

        let locations: Vec<_> = output.locations(SegmentId(2)).collect();
        assert!(locations.iter().all(|(_, loc)| loc.segment == SegmentId(2)));
        assert_eq!(locations[0].1.offset, 0);
    }
}
