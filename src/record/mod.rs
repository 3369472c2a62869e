//! Command Log Record Module
//!
//! The unit every segment file is made of.
//!
//! ## Responsibilities
//! - Define the Set / Remove record variants
//! - Frame records with an exact length prefix and CRC32 checksum
//! - Detect torn or corrupt frames so replay can stop cleanly
//!
//! ## Frame Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Payload (Len)   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Payload (Len)   │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Both header fields are big-endian. The payload is the bincode encoding of
//! a [`Record`].

mod entry;
mod frame;

pub use entry::Record;
pub use frame::{decode_frame, encode_frame, read_frame, HEADER_SIZE, MAX_PAYLOAD_SIZE};
