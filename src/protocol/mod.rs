//! Protocol Module
//!
//! Wire protocol spoken by the request/response transport adapter.
//!
//! ## Protocol Format (Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET    - Payload: key_len (4) + key
//! - 0x02: SET    - Payload: key_len (4) + key + value
//! - 0x03: REMOVE - Payload: key_len (4) + key
//! - 0x04: PING   - Payload: empty
//!
//! Keys and values are UTF-8.
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: ERROR
//!
//! A response payload, when present, is prefixed with the marker byte 0x01.

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{Response, Status};
