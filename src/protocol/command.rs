//! Command definitions
//!
//! Represents requests arriving from transport adapters.

use crate::error::CinderError;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Set = 0x02,
    Remove = 0x03,
    Ping = 0x04,
}

impl TryFrom<u8> for CommandType {
    type Error = CinderError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(CommandType::Get),
            0x02 => Ok(CommandType::Set),
            0x03 => Ok(CommandType::Remove),
            0x04 => Ok(CommandType::Ping),
            _ => Err(CinderError::Protocol(format!(
                "Unknown command type: 0x{:02x}",
                byte
            ))),
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Set a key to a value
    Set { key: String, value: String },

    /// Remove a key
    Remove { key: String },

    /// Connection heartbeat
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Set { .. } => CommandType::Set,
            Command::Remove { .. } => CommandType::Remove,
            Command::Ping => CommandType::Ping,
        }
    }
}
