//! Error types for CinderKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CinderError
pub type Result<T> = std::result::Result<T, CinderError>;

/// Unified error type for CinderKV operations
#[derive(Debug, Error)]
pub enum CinderError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unknown segment: {0}")]
    UnknownSegment(u64),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is closed")]
    Closed,
}
