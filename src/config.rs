//! Storage engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::buffer::TieBreak;
use crate::storage::disk::DEFAULT_BLOCK_SIZE;

/// Name of the log file inside the data directory.
pub const DEFAULT_LOG_FILE: &str = "blockstore.log";

/// Number of buffer pool frames.
pub const DEFAULT_POOL_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every file of the database.
    pub data_dir: PathBuf,
    /// Size in bytes of a block, on disk and in memory.
    pub block_size: usize,
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// Log file name, relative to `data_dir`.
    pub log_file: String,
    /// Ranking of eviction candidates that were both accessed twice.
    pub tie_break: TieBreak,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("blockstore_data"),
            block_size: DEFAULT_BLOCK_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            log_file: DEFAULT_LOG_FILE.to_string(),
            tie_break: TieBreak::default(),
        }
    }
}
