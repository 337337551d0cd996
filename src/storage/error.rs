//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer pool exhausted: all {pool_size} frames are pinned")]
    BufferPoolExhausted { pool_size: usize },

    #[error("Access out of bounds: {len} bytes at offset {offset} (page size {page_size})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        page_size: usize,
    },

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Invalid string at offset {offset}: {source}")]
    InvalidString {
        offset: usize,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Invalid block size {block_size}: must be at least {min} bytes")]
    InvalidBlockSize { block_size: usize, min: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
