//! Record framing
//!
//! Length-prefixed, checksummed encoding of records on disk.

use std::io::{ErrorKind, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Record;
use crate::error::{CinderError, Result};

/// Header size: 4 bytes payload length + 4 bytes CRC32
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Encode a record into a complete frame
///
/// Format: payload_len (4) + crc32 (4) + payload
pub fn encode_frame(record: &Record) -> Result<Bytes> {
    let payload =
        bincode::serialize(record).map_err(|e| CinderError::Serialization(e.to_string()))?;

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(CinderError::Serialization(format!(
            "Record too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.extend_from_slice(&payload);

    Ok(frame.freeze())
}

/// Decode a complete frame (header included)
///
/// The frame must be exactly one record long; trailing bytes are rejected.
pub fn decode_frame(frame: &[u8]) -> Result<Record> {
    if frame.len() < HEADER_SIZE {
        return Err(CinderError::Corruption(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            frame.len()
        )));
    }

    let mut header = &frame[..HEADER_SIZE];
    let payload_len = header.get_u32() as usize;
    let crc = header.get_u32();

    if frame.len() != HEADER_SIZE + payload_len {
        return Err(CinderError::Corruption(format!(
            "Frame length mismatch: header says {} payload bytes, frame holds {}",
            payload_len,
            frame.len() - HEADER_SIZE
        )));
    }

    decode_payload(&frame[HEADER_SIZE..], crc)
}

/// Read the next frame from a stream
///
/// Returns:
/// - `Ok(Some((record, frame_len)))`: a valid frame was read
/// - `Ok(None)`: clean end of stream at a frame boundary
/// - `Err(CinderError::Corruption)`: torn header, truncated payload or bad CRC
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(Record, u32)>> {
    let mut header = [0u8; HEADER_SIZE];
    let filled = read_full(reader, &mut header)?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_SIZE {
        return Err(CinderError::Corruption(format!(
            "Torn header: {} of {} bytes",
            filled, HEADER_SIZE
        )));
    }

    let mut cursor = &header[..];
    let payload_len = cursor.get_u32();
    let crc = cursor.get_u32();

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(CinderError::Corruption(format!(
            "Payload length {} exceeds maximum {}",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut payload = vec![0u8; payload_len as usize];
    let filled = read_full(reader, &mut payload)?;
    if filled < payload.len() {
        return Err(CinderError::Corruption(format!(
            "Truncated payload: {} of {} bytes",
            filled, payload_len
        )));
    }

    let record = decode_payload(&payload, crc)?;
    Ok(Some((record, HEADER_SIZE as u32 + payload_len)))
}

fn decode_payload(payload: &[u8], expected_crc: u32) -> Result<Record> {
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(CinderError::Corruption(format!(
            "CRC mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    bincode::deserialize(payload).map_err(|e| CinderError::Corruption(e.to_string()))
}

/// Fill `buf` as far as the stream allows, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
