//! Write-ahead log.
//!
//! The log manager stages records in the tail block of an append-only log
//! file, going through the buffer pool like any other client, and hands the
//! records back newest first for recovery.

pub mod manager;
pub mod record;

pub use manager::{LogIterator, LogManager, LAST_POS};
pub use record::{LogRecord, LogValue, ValueKind};
