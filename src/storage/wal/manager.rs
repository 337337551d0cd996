//! Log manager.
//!
//! Records are appended to the tail block of the log file through the
//! buffer pool. Every block starts with a 4-byte pointer to the trailer of
//! its most recent record (0 when the block is empty). Each record is its
//! serialized values followed by a 4-byte trailer holding the previous
//! record's trailer offset, which chains the records of a block backwards.
//! Log bytes are only ever appended, never overwritten.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use super::record::{LogRecord, LogValue};
use crate::storage::block::{BlockId, Lsn, TxnId};
use crate::storage::buffer::{BufferPoolManager, FlushHandle, PinnedBuffer, WriteAheadLog};
use crate::storage::disk::FileManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, INT_SIZE};

/// Offset of the pointer to the last record's trailer.
pub const LAST_POS: usize = 0;

struct LogTail {
    block: BlockId,
    /// `None` only after a failed rollover; re-pinned on next use.
    buffer: Option<PinnedBuffer>,
    position: usize,
}

pub struct LogManager {
    pool: BufferPoolManager,
    logfile: String,
    tail: Mutex<LogTail>,
    /// Number of the tail block. Every lower LSN is already on disk.
    current_lsn: AtomicU32,
    /// Used by `flush` so that it never waits on `tail`.
    tail_flush: RwLock<FlushHandle>,
}

impl LogManager {
    /// Opens `logfile`, creating its first block if the file is empty, and
    /// registers the log with the pool for write-ahead flushing.
    pub fn open(pool: BufferPoolManager, logfile: &str) -> StorageResult<Arc<Self>> {
        let size = pool.files().size(logfile)?;
        let (buffer, position) = if size == 0 {
            (Self::append_new_block(&pool, logfile)?, INT_SIZE)
        } else {
            let buffer = pool.pin(&BlockId::new(logfile, size - 1))?;
            let last = buffer.with_page(|page| read_offset(page, LAST_POS))?;
            (buffer, last + INT_SIZE)
        };

        let block = buffer.block().clone();
        debug!("Opened log {} at {} offset {}", logfile, block, position);

        let log = Arc::new(Self {
            current_lsn: AtomicU32::new(block.number()),
            tail_flush: RwLock::new(buffer.flush_handle()),
            tail: Mutex::new(LogTail {
                block,
                buffer: Some(buffer),
                position,
            }),
            pool: pool.clone(),
            logfile: logfile.to_string(),
        });
        let weak = Arc::downgrade(&log);
        pool.set_write_ahead_log(weak);
        Ok(log)
    }

    /// LSN of the block currently receiving records.
    pub fn current_lsn(&self) -> Lsn {
        Lsn(self.current_lsn.load(Ordering::SeqCst))
    }

    /// Appends a record and returns its LSN. A record that does not fit in
    /// the rest of the tail block goes to a fresh block.
    pub fn append(&self, values: &[LogValue]) -> StorageResult<Lsn> {
        let block_size = self.pool.files().block_size();
        let record_size = INT_SIZE + values.iter().map(LogValue::encoded_len).sum::<usize>();
        let capacity = block_size.saturating_sub(INT_SIZE);
        if record_size > capacity {
            return Err(StorageError::PageFull {
                required: record_size,
                available: capacity,
            });
        }

        let mut tail = self.tail.lock();
        // Roll over only when the record would overflow; an exact fit stays.
        if tail.position + record_size > block_size {
            self.roll_over(&mut tail)?;
        }

        let position = tail.position;
        let buffer = self.tail_buffer(&mut tail)?;
        let lsn = Lsn(buffer.block().number());

        let mut offset = position;
        for value in values {
            value.write_to(buffer, offset, lsn)?;
            offset += value.encoded_len();
        }
        let previous = buffer.get_int(LAST_POS)?;
        buffer.set_int(offset, previous, TxnId::LOG, Some(lsn))?;
        buffer.set_int(LAST_POS, offset as i32, TxnId::LOG, Some(lsn))?;

        tail.position = offset + INT_SIZE;
        Ok(lsn)
    }

    /// Makes every record with an LSN up to `lsn` durable.
    pub fn flush(&self, lsn: Lsn) -> StorageResult<()> {
        if lsn < self.current_lsn() {
            return Ok(());
        }
        self.tail_flush.read().flush()
    }

    /// Flushes the tail block and returns an iterator over all records,
    /// newest first.
    pub fn iter(&self) -> StorageResult<LogIterator> {
        let mut tail = self.tail.lock();
        let buffer = self.tail_buffer(&mut tail)?;
        buffer.force_flush()?;
        LogIterator::new(self.pool.files().clone(), buffer.block().clone())
    }

    fn roll_over(&self, tail: &mut LogTail) -> StorageResult<()> {
        if let Some(buffer) = tail.buffer.take() {
            buffer.force_flush()?;
            self.pool.unpin(buffer);
        }

        let buffer = Self::append_new_block(&self.pool, &self.logfile)?;
        debug!("Log {} rolled over to {}", self.logfile, buffer.block());

        *self.tail_flush.write() = buffer.flush_handle();
        self.current_lsn
            .store(buffer.block().number(), Ordering::SeqCst);
        tail.block = buffer.block().clone();
        tail.position = INT_SIZE;
        tail.buffer = Some(buffer);
        Ok(())
    }

    fn tail_buffer<'a>(&self, tail: &'a mut LogTail) -> StorageResult<&'a PinnedBuffer> {
        let buffer = match tail.buffer.take() {
            Some(buffer) => buffer,
            None => {
                let buffer = self.pool.pin(&tail.block)?;
                *self.tail_flush.write() = buffer.flush_handle();
                buffer
            }
        };
        Ok(tail.buffer.insert(buffer))
    }

    fn append_new_block(pool: &BufferPoolManager, logfile: &str) -> StorageResult<PinnedBuffer> {
        pool.pin_new(logfile, |page| page.set_int(LAST_POS, 0))
    }
}

impl WriteAheadLog for LogManager {
    fn flush(&self, lsn: Lsn) -> StorageResult<()> {
        LogManager::flush(self, lsn)
    }
}

/// Reads a record pointer stored at `at`.
fn read_offset(page: &Page, at: usize) -> StorageResult<usize> {
    let value = page.get_int(at)?;
    usize::try_from(value)
        .ok()
        .filter(|offset| offset + INT_SIZE <= page.size())
        .ok_or(StorageError::OutOfBounds {
            offset: at,
            len: INT_SIZE,
            page_size: page.size(),
        })
}

/// Walks the log from the newest record back to the oldest, reading blocks
/// straight from disk.
pub struct LogIterator {
    files: Arc<FileManager>,
    block: BlockId,
    page: Page,
    current: usize,
    done: bool,
}

impl LogIterator {
    fn new(files: Arc<FileManager>, block: BlockId) -> StorageResult<Self> {
        let mut page = Page::new(files.block_size());
        files.read(&block, &mut page)?;
        let current = read_offset(&page, LAST_POS)?;
        Ok(Self {
            files,
            block,
            page,
            current,
            done: false,
        })
    }

    fn advance(&mut self) -> StorageResult<Option<LogRecord>> {
        while self.current == 0 {
            let Some(previous) = self.block.previous() else {
                return Ok(None);
            };
            self.files.read(&previous, &mut self.page)?;
            self.block = previous;
            self.current = read_offset(&self.page, LAST_POS)?;
        }

        let trailer = self.current;
        let previous = read_offset(&self.page, trailer)?;
        let start = previous + INT_SIZE;
        if start > trailer {
            return Err(StorageError::OutOfBounds {
                offset: trailer,
                len: INT_SIZE,
                page_size: self.page.size(),
            });
        }

        self.current = previous;
        let record = LogRecord::new(Lsn(self.block.number()), &self.page.data()[start..trailer]);
        Ok(Some(record))
    }
}

impl Iterator for LogIterator {
    type Item = StorageResult<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::LruKReplacer;
    use crate::storage::wal::record::ValueKind;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    const BLOCK_SIZE: usize = 64;
    const LOG_FILE: &str = "test.log";

    fn create_test_log(pool_size: usize) -> Result<(Arc<LogManager>, BufferPoolManager, TempDir)> {
        let dir = tempdir()?;
        let pool = open_pool(&dir, pool_size)?;
        let log = LogManager::open(pool.clone(), LOG_FILE)?;
        Ok((log, pool, dir))
    }

    fn open_pool(dir: &TempDir, pool_size: usize) -> Result<BufferPoolManager> {
        let files = Arc::new(FileManager::new(dir.path(), BLOCK_SIZE)?);
        Ok(BufferPoolManager::new(
            files,
            Box::new(LruKReplacer::new(pool_size)),
            pool_size,
        ))
    }

    fn strings(a: &str, b: &str) -> Vec<LogValue> {
        vec![LogValue::from(a), LogValue::from(b)]
    }

    fn read_all(log: &LogManager) -> Result<Vec<Vec<LogValue>>> {
        let mut records = Vec::new();
        for record in log.iter()? {
            records.push(record?.decode(&[ValueKind::Str, ValueKind::Str])?);
        }
        Ok(records)
    }

    #[test]
    fn test_open_creates_first_block() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;

        assert_eq!(log.current_lsn(), Lsn(0));
        assert_eq!(pool.files().size(LOG_FILE)?, 1);
        assert_eq!(pool.pin_count(&BlockId::new(LOG_FILE, 0)), Some(1));
        assert_eq!(log.iter()?.count(), 0);

        Ok(())
    }

    #[test]
    fn test_append_and_iterate_newest_first() -> Result<()> {
        let (log, _pool, _dir) = create_test_log(2)?;

        assert_eq!(log.append(&strings("Foo", "Bar"))?, Lsn(0));
        assert_eq!(log.append(&strings("ABC", "XYZ"))?, Lsn(0));

        let records = read_all(&log)?;
        assert_eq!(records, vec![strings("ABC", "XYZ"), strings("Foo", "Bar")]);

        Ok(())
    }

    #[test]
    fn test_block_layout() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        log.append(&[LogValue::Int(11)])?;
        log.append(&[LogValue::Int(22)])?;
        log.flush(Lsn(0))?;

        let mut page = Page::new(BLOCK_SIZE);
        pool.files().read(&BlockId::new(LOG_FILE, 0), &mut page)?;
        // [last=16][11][prev=0][22][prev=8]
        assert_eq!(page.get_int(0)?, 16);
        assert_eq!(page.get_int(4)?, 11);
        assert_eq!(page.get_int(8)?, 0);
        assert_eq!(page.get_int(12)?, 22);
        assert_eq!(page.get_int(16)?, 8);

        Ok(())
    }

    #[test]
    fn test_rollover() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;

        // Each record is 6 + 7 + 4 = 17 bytes; three fit after the header.
        for i in 0..3 {
            assert_eq!(log.append(&strings(&format!("k{}", i), "vvv"))?, Lsn(0));
        }
        let lsn = log.append(&strings("new", "blk"))?;
        assert_eq!(lsn, Lsn(1));
        assert_eq!(log.current_lsn(), Lsn(1));
        assert_eq!(pool.files().size(LOG_FILE)?, 2);

        // The old tail is unpinned and its content already durable.
        assert_eq!(pool.pin_count(&BlockId::new(LOG_FILE, 0)), Some(0));
        let mut page = Page::new(BLOCK_SIZE);
        pool.files().read(&BlockId::new(LOG_FILE, 0), &mut page)?;
        assert_ne!(page.get_int(LAST_POS)?, 0);

        let lsns: Vec<Lsn> = log
            .iter()?
            .map(|record| record.map(|r| r.lsn()))
            .collect::<StorageResult<_>>()?;
        assert_eq!(lsns, vec![Lsn(1), Lsn(0), Lsn(0), Lsn(0)]);

        let records = read_all(&log)?;
        assert_eq!(records[0], strings("new", "blk"));
        assert_eq!(records[3], strings("k0", "vvv"));

        Ok(())
    }

    #[test]
    fn test_record_too_large() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        let big = "x".repeat(BLOCK_SIZE);

        let result = log.append(&[LogValue::from(big.as_str())]);
        assert!(matches!(result, Err(StorageError::PageFull { .. })));
        assert_eq!(pool.files().size(LOG_FILE)?, 1);

        // A record that exactly fills an empty block is accepted.
        let exact = "y".repeat(BLOCK_SIZE - 3 * INT_SIZE);
        assert_eq!(log.append(&[LogValue::from(exact.as_str())])?, Lsn(0));

        Ok(())
    }

    #[test]
    fn test_record_filling_rest_of_block_stays() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        log.append(&[LogValue::Int(1)])?;

        // Header 4 + first record 8 leaves 52 bytes: a 44-byte string and its trailer.
        let rest = "r".repeat(BLOCK_SIZE - 12 - 2 * INT_SIZE);
        assert_eq!(log.append(&[LogValue::from(rest.as_str())])?, Lsn(0));
        assert_eq!(pool.files().size(LOG_FILE)?, 1);

        // Nothing fits any more.
        assert_eq!(log.append(&[LogValue::Int(2)])?, Lsn(1));

        Ok(())
    }

    #[test]
    fn test_flush_writes_tail_block() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        log.append(&[LogValue::Int(1)])?;

        let mut page = Page::new(BLOCK_SIZE);
        pool.files().read(&BlockId::new(LOG_FILE, 0), &mut page)?;
        assert_eq!(page.get_int(LAST_POS)?, 0);

        log.flush(Lsn(0))?;
        pool.files().read(&BlockId::new(LOG_FILE, 0), &mut page)?;
        assert_eq!(page.get_int(LAST_POS)?, 8);

        Ok(())
    }

    #[test]
    fn test_reopen_resumes_tail() -> Result<()> {
        let dir = tempdir()?;
        {
            let pool = open_pool(&dir, 2)?;
            let log = LogManager::open(pool.clone(), LOG_FILE)?;
            log.append(&strings("Foo", "Bar"))?;
            log.flush(log.current_lsn())?;
        }

        let pool = open_pool(&dir, 2)?;
        let log = LogManager::open(pool, LOG_FILE)?;
        log.append(&strings("ABC", "XYZ"))?;

        let records = read_all(&log)?;
        assert_eq!(records, vec![strings("ABC", "XYZ"), strings("Foo", "Bar")]);

        Ok(())
    }

    #[test]
    fn test_log_writes_are_tagged() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        log.append(&[LogValue::Int(1)])?;

        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].block, Some(BlockId::new(LOG_FILE, 0)));
        assert_eq!(snapshot[0].modified_by, Some(TxnId::LOG));

        pool.flush_all(TxnId::LOG)?;
        assert_eq!(pool.snapshot()[0].modified_by, None);

        Ok(())
    }

    #[test]
    fn test_evicting_data_page_flushes_log() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;

        let lsn = log.append(&[LogValue::Int(42)])?;
        let data = pool.pin(&BlockId::new("data.tbl", 0))?;
        data.set_int(0, 7, TxnId(1), Some(lsn))?;
        drop(data);

        // Evicts the data page, which must push the log record out first.
        let _other = pool.pin(&BlockId::new("data.tbl", 1))?;
        assert!(!pool.contains_mapping(&BlockId::new("data.tbl", 0)));

        let mut page = Page::new(BLOCK_SIZE);
        pool.files().read(&BlockId::new(LOG_FILE, 0), &mut page)?;
        assert_eq!(page.get_int(LAST_POS)?, 8);
        assert_eq!(page.get_int(4)?, 42);

        Ok(())
    }

    #[test]
    fn test_corrupt_header_is_reported() -> Result<()> {
        let (log, pool, _dir) = create_test_log(2)?;
        log.append(&[LogValue::Int(1)])?;
        log.flush(Lsn(0))?;

        let mut page = Page::new(BLOCK_SIZE);
        page.set_int(LAST_POS, BLOCK_SIZE as i32)?;
        pool.files().append(LOG_FILE, &page)?;

        let iter = LogIterator::new(pool.files().clone(), BlockId::new(LOG_FILE, 1));
        assert!(matches!(iter, Err(StorageError::OutOfBounds { .. })));

        Ok(())
    }
}
