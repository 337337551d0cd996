//! Storage layer implementation for blockstore.
//!
//! Key components:
//!
//! - **BlockId**: `(filename, block number)` address of a persistent block
//! - **Page**: in-memory image of one block with typed accessors
//! - **FileManager**: reads, writes and appends whole blocks
//! - **BufferPoolManager**: fixed set of frames shared by all transactions,
//!   with LRU-2 eviction
//! - **LogManager**: append-only write-ahead log stored through the pool

pub mod block;
pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;
pub mod wal;

pub use block::{BlockId, Lsn, TxnId};
pub use buffer::{BufferPoolManager, PinnedBuffer, TieBreak};
pub use disk::{FileManager, DEFAULT_BLOCK_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::Page;
pub use wal::{LogManager, LogRecord, LogValue, ValueKind};
