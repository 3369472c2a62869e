//! Record definitions
//!
//! Defines the operations persisted in segment files.

use serde::{Deserialize, Serialize};

/// A single logged operation on one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Set a key to a value
    Set { key: String, value: String },

    /// Remove a key (tombstone)
    Remove { key: String },
}

impl Record {
    /// Build a Set record
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Record::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a Remove record
    pub fn remove(key: impl Into<String>) -> Self {
        Record::Remove { key: key.into() }
    }

    /// The key this record applies to
    pub fn key(&self) -> &str {
        match self {
            Record::Set { key, .. } | Record::Remove { key } => key,
        }
    }

    /// The value carried by a Set, `None` for a tombstone
    pub fn value(&self) -> Option<&str> {
        match self {
            Record::Set { value, .. } => Some(value),
            Record::Remove { .. } => None,
        }
    }

    /// Consume the record, keeping only the value
    pub fn into_value(self) -> Option<String> {
        match self {
            Record::Set { value, .. } => Some(value),
            Record::Remove { .. } => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Record::Remove { .. })
    }
}
