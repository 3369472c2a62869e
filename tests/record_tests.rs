//! Record Tests
//!
//! Tests for record accessors and the on-disk frame format.

use std::io::Cursor;

use cinderkv::error::CinderError;
use cinderkv::record::{decode_frame, encode_frame, read_frame, Record, HEADER_SIZE};

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_set_record_accessors() {
    let record = Record::set("key", "value");

    assert_eq!(record.key(), "key");
    assert_eq!(record.value(), Some("value"));
    assert!(!record.is_tombstone());
    assert_eq!(record.into_value(), Some("value".to_string()));
}

#[test]
fn test_remove_record_is_tombstone() {
    let record = Record::remove("key");

    assert_eq!(record.key(), "key");
    assert_eq!(record.value(), None);
    assert!(record.is_tombstone());
    assert_eq!(record.into_value(), None);
}

// =============================================================================
// Frame Tests
// =============================================================================

#[test]
fn test_frame_round_trip() {
    let record = Record::set("user:42", "{\"name\":\"ada\"}");
    let frame = encode_frame(&record).unwrap();

    assert_eq!(decode_frame(&frame).unwrap(), record);
}

#[test]
fn test_decode_detects_flipped_bit() {
    let frame = encode_frame(&Record::set("key", "value")).unwrap();
    let mut damaged = frame.to_vec();
    let last = damaged.len() - 1;
    damaged[last] ^= 0x01;

    assert!(matches!(decode_frame(&damaged), Err(CinderError::Corruption(_))));
}

#[test]
fn test_decode_rejects_trailing_bytes() {
    let mut frame = encode_frame(&Record::remove("key")).unwrap().to_vec();
    frame.push(0);

    assert!(matches!(decode_frame(&frame), Err(CinderError::Corruption(_))));
}

#[test]
fn test_decode_rejects_short_header() {
    assert!(matches!(
        decode_frame(&[0, 0, 0]),
        Err(CinderError::Corruption(_))
    ));
}

// =============================================================================
// Stream Reading Tests
// =============================================================================

#[test]
fn test_read_frames_sequentially() {
    let records = vec![
        Record::set("a", "1"),
        Record::remove("b"),
        Record::set("c", ""),
    ];
    let mut bytes = Vec::new();
    for record in &records {
        bytes.extend_from_slice(&encode_frame(record).unwrap());
    }

    let mut cursor = Cursor::new(bytes);
    for expected in &records {
        let (record, len) = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(&record, expected);
        assert_eq!(len as usize, encode_frame(expected).unwrap().len());
    }
    assert!(read_frame(&mut cursor).unwrap().is_none());
}

#[test]
fn test_read_empty_stream_is_clean_eof() {
    let mut cursor = Cursor::new(Vec::new());

    assert!(read_frame(&mut cursor).unwrap().is_none());
}

#[test]
fn test_read_torn_header() {
    let frame = encode_frame(&Record::set("k", "v")).unwrap();
    let mut cursor = Cursor::new(frame[..HEADER_SIZE - 3].to_vec());

    assert!(matches!(read_frame(&mut cursor), Err(CinderError::Corruption(_))));
}

#[test]
fn test_read_truncated_payload() {
    let frame = encode_frame(&Record::set("key", "a longer value")).unwrap();
    let mut cursor = Cursor::new(frame[..frame.len() - 4].to_vec());

    assert!(matches!(read_frame(&mut cursor), Err(CinderError::Corruption(_))));
}
