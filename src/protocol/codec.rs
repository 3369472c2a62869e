//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - GET:    key_len (4 bytes) + key
//! - SET:    key_len (4 bytes) + key + value
//! - REMOVE: key_len (4 bytes) + key
//! - PING:   empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! A response without a payload has `Len = 0`. Otherwise the payload starts
//! with the presence marker `0x01`, so an empty value still round-trips.

use std::io::{Read, Write};

use super::{Command, CommandType, Response, Status};
use crate::error::{CinderError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// First payload byte of a response that carries a value
const PAYLOAD_PRESENT: u8 = 0x01;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let payload = match command {
        Command::Get { key } | Command::Remove { key } => {
            let mut payload = Vec::with_capacity(4 + key.len());
            payload.extend_from_slice(&(key.len() as u32).to_be_bytes());
            payload.extend_from_slice(key.as_bytes());
            payload
        }
        Command::Set { key, value } => {
            let mut payload = Vec::with_capacity(4 + key.len() + value.len());
            payload.extend_from_slice(&(key.len() as u32).to_be_bytes());
            payload.extend_from_slice(key.as_bytes());
            payload.extend_from_slice(value.as_bytes());
            payload
        }
        Command::Ping => Vec::new(),
    };

    frame(command.command_type() as u8, &payload)
}

/// Decode a command from bytes
///
/// Unknown command types are rejected with a protocol error.
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, payload) = split_message(bytes, "command")?;

    match CommandType::try_from(cmd_type)? {
        CommandType::Get => {
            let (key, rest) = decode_key(payload, "GET")?;
            expect_empty(rest, "GET")?;
            Ok(Command::Get { key })
        }
        CommandType::Set => {
            let (key, rest) = decode_key(payload, "SET")?;
            let value = decode_utf8(rest, "SET value")?;
            Ok(Command::Set { key, value })
        }
        CommandType::Remove => {
            let (key, rest) = decode_key(payload, "REMOVE")?;
            expect_empty(rest, "REMOVE")?;
            Ok(Command::Remove { key })
        }
        CommandType::Ping => {
            expect_empty(payload, "PING")?;
            Ok(Command::Ping)
        }
    }
}

/// Decode `key_len (4) + key`, returning the key and the bytes after it
fn decode_key<'a>(payload: &'a [u8], name: &str) -> Result<(String, &'a [u8])> {
    if payload.len() < 4 {
        return Err(CinderError::Protocol(format!(
            "{} command: missing key length",
            name
        )));
    }

    let key_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;

    if payload.len() < 4 + key_len {
        return Err(CinderError::Protocol(format!(
            "{} command: incomplete key (expected {}, got {})",
            name,
            key_len,
            payload.len() - 4
        )));
    }

    let key = decode_utf8(&payload[4..4 + key_len], name)?;
    Ok((key, &payload[4 + key_len..]))
}

fn decode_utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| CinderError::Protocol(format!("{}: invalid UTF-8", what)))
}

fn expect_empty(rest: &[u8], name: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(CinderError::Protocol(format!(
            "{} command: unexpected trailing {} bytes",
            name,
            rest.len()
        )))
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = match &response.payload {
        Some(text) => {
            let mut payload = Vec::with_capacity(1 + text.len());
            payload.push(PAYLOAD_PRESENT);
            payload.extend_from_slice(text.as_bytes());
            payload
        }
        None => Vec::new(),
    };
    frame(response.status as u8, &payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_message(bytes, "response")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::Error,
        _ => {
            return Err(CinderError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = match payload.split_first() {
        None => None,
        Some((&PAYLOAD_PRESENT, text)) => Some(decode_utf8(text, "response payload")?),
        Some((marker, _)) => {
            return Err(CinderError::Protocol(format!(
                "Unknown response payload marker: 0x{:02x}",
                marker
            )))
        }
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Framing helpers
// =============================================================================

fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_SIZE + payload.len());
    message.push(tag);
    message.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    message.extend_from_slice(payload);
    message
}

/// Validate a complete message and split it into (tag, payload)
fn split_message<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(CinderError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let payload_len = payload_len(&bytes[..HEADER_SIZE], what)?;
    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(CinderError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((bytes[0], &bytes[HEADER_SIZE..total_len]))
}

fn payload_len(header: &[u8], what: &str) -> Result<usize> {
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(CinderError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

/// Read one length-prefixed message from a stream
fn read_message<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = payload_len(&header, what)?;

    let mut message = vec![0u8; HEADER_SIZE + payload_len];
    message[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut message[HEADER_SIZE..])?;
    }

    Ok(message)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_message(reader, "command")?;
    decode_command(&message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_message(reader, "response")?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}
