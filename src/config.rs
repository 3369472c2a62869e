//! Configuration for CinderKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CinderError, Result};

/// Main configuration for a CinderKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── data.table                       (current segment)
    ///     └── data_00000000000000000001.table  (sealed segments)
    pub data_dir: PathBuf,

    /// When to fsync the current segment
    pub sync_strategy: SyncStrategy,

    /// Current segment size (bytes) that triggers rotation
    pub segment_size_limit: u64,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Number of buffered records that triggers a flush
    pub memtable_threshold: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Sealed segment count above which the background cycle merges
    pub merge_threshold: usize,

    /// Period of the background merge cycle (0 disables it)
    pub merge_interval_ms: u64,

    /// Threads compacting freshly rotated segments (0 disables them)
    pub compaction_workers: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every memtable flush (safest)
    EveryFlush,

    /// fsync only when a segment is sealed or the engine closes
    OnRotate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cinderkv_data"),
            sync_strategy: SyncStrategy::EveryFlush,
            segment_size_limit: 4 * 1024 * 1024, // 4 MB
            memtable_threshold: 1000,
            merge_threshold: 4,
            merge_interval_ms: 1000,
            compaction_workers: 2,
            listen_addr: "127.0.0.1:7379".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_threshold == 0 {
            return Err(CinderError::Config(
                "memtable_threshold must be at least 1".to_string(),
            ));
        }
        if self.segment_size_limit == 0 {
            return Err(CinderError::Config(
                "segment_size_limit must be greater than 0".to_string(),
            ));
        }
        if self.merge_threshold == 0 {
            return Err(CinderError::Config(
                "merge_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Background merge period, if the cycle is enabled
    pub fn merge_interval(&self) -> Option<Duration> {
        match self.merge_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all segments)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn segment_size_limit(mut self, size: u64) -> Self {
        self.config.segment_size_limit = size;
        self
    }

    /// Set the memtable flush threshold (in records)
    pub fn memtable_threshold(mut self, records: usize) -> Self {
        self.config.memtable_threshold = records;
        self
    }

    /// Set the sealed segment count that triggers a merge
    pub fn merge_threshold(mut self, count: usize) -> Self {
        self.config.merge_threshold = count;
        self
    }

    /// Set the background merge period (in milliseconds, 0 disables)
    pub fn merge_interval_ms(mut self, ms: u64) -> Self {
        self.config.merge_interval_ms = ms;
        self
    }

    /// Set the number of rotation compaction workers (0 disables)
    pub fn compaction_workers(mut self, count: usize) -> Self {
        self.config.compaction_workers = count;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = Config::builder().memtable_threshold(0).build();
        assert!(matches!(config.validate(), Err(CinderError::Config(_))));
    }

    #[test]
    fn test_zero_interval_disables_merge_cycle() {
        let config = Config::builder().merge_interval_ms(0).build();
        assert_eq!(config.merge_interval(), None);
    }
}
