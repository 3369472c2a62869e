//! # CinderKV
//!
//! An embeddable, log-structured key-value store with:
//! - Buffered writes flushed to append-only segment files
//! - An in-memory index pointing at the latest record of every key
//! - Segment rotation with background deduplication and merging
//! - Index rebuild on startup with corrupt-tail handling
//! - An optional TCP adapter speaking a small binary protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Server (optional adapter)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │          set / get / remove / flush / close                  │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//! ┌─────────────┐        ┌─────────────┐        ┌─────────────┐
//! │  MemTable   │ flush  │  Segments   │ rotate │ Compaction  │
//! │ active/imm. │───────▶│ current +   │───────▶│  workers +  │
//! └─────────────┘        │   sealed    │◀───────│ merge cycle │
//!                        └──────┬──────┘install └─────────────┘
//!                               │
//!                        ┌──────▼──────┐
//!                        │    Index    │
//!                        │ key -> loc  │
//!                        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod memtable;
pub mod index;
pub mod segment;
pub mod compaction;
pub mod engine;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CinderError, Result};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CinderKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
