//! Buffer pool manager.
//!
//! A fixed number of frames is allocated up front and multiplexed across
//! blocks. Callers pin a block to get a [`PinnedBuffer`] lease; dropping the
//! lease unpins it. Only unpinned frames can be chosen as eviction victims.
//!
//! All pool bookkeeping (pin counts, the block index, the free list and the
//! replacer) lives behind one mutex. Page bytes sit behind a per-frame mutex
//! that is only ever taken for the duration of a single accessor call, and
//! never held while acquiring the pool lock.

pub mod lru_k;
pub mod replacer;

pub use lru_k::{LruKReplacer, TieBreak};
pub use replacer::{AccessHistory, FrameId, Replacer};

use crate::storage::block::{BlockId, Lsn, TxnId};
use crate::storage::disk::FileManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::Page;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

/// Hook through which the pool enforces the write-ahead rule: before a page
/// carrying an LSN is written back, the log is flushed up to that LSN.
pub trait WriteAheadLog: Send + Sync {
    fn flush(&self, lsn: Lsn) -> StorageResult<()>;
}

struct FrameContents {
    page: Page,
    block: Option<BlockId>,
    modified_by: Option<TxnId>,
    lsn: Option<Lsn>,
}

impl FrameContents {
    fn reset(&mut self) {
        self.page.clear();
        self.block = None;
        self.modified_by = None;
        self.lsn = None;
    }
}

struct Frame {
    contents: Mutex<FrameContents>,
}

impl Frame {
    fn new(block_size: usize) -> Self {
        Self {
            contents: Mutex::new(FrameContents {
                page: Page::new(block_size),
                block: None,
                modified_by: None,
                lsn: None,
            }),
        }
    }

    fn is_modified_by(&self, txn: TxnId) -> bool {
        self.contents.lock().modified_by == Some(txn)
    }

    /// Writes the frame back to its block if it is dirty. Pages written by
    /// a regular transaction first flush the log up to their LSN.
    fn write_back(
        &self,
        files: &FileManager,
        wal: Option<&Arc<dyn WriteAheadLog>>,
    ) -> StorageResult<()> {
        loop {
            let required = {
                let contents = self.contents.lock();
                match contents.modified_by {
                    None => return Ok(()),
                    Some(txn) if txn.is_log() => None,
                    Some(_) => contents.lsn,
                }
            };

            if let (Some(lsn), Some(wal)) = (required, wal) {
                wal.flush(lsn)?;
            }

            let mut contents = self.contents.lock();
            let Some(txn) = contents.modified_by else {
                return Ok(());
            };
            // A newer write raised the LSN while the log was being flushed.
            if !txn.is_log() && contents.lsn != required {
                continue;
            }
            if let Some(block) = &contents.block {
                files.write(block, &contents.page)?;
            }
            contents.modified_by = None;
            return Ok(());
        }
    }
}

struct PoolState {
    pin_counts: Vec<u32>,
    page_table: HashMap<BlockId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: Box<dyn Replacer>,
    num_available: usize,
}

struct BufferPoolInner {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    files: Arc<FileManager>,
    wal: RwLock<Option<Weak<dyn WriteAheadLog>>>,
}

impl BufferPoolInner {
    fn wal(&self) -> Option<Arc<dyn WriteAheadLog>> {
        self.wal.read().as_ref().and_then(Weak::upgrade)
    }

    fn write_back(&self, frame_id: FrameId) -> StorageResult<()> {
        let wal = self.wal();
        self.frames[frame_id].write_back(&self.files, wal.as_ref())
    }

    fn pin_frame(&self, state: &mut PoolState, frame_id: FrameId) {
        if state.pin_counts[frame_id] == 0 {
            state.num_available -= 1;
        }
        state.pin_counts[frame_id] += 1;
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
    }

    fn unpin_frame(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        debug_assert!(
            state.pin_counts[frame_id] > 0,
            "unpin of frame {} with zero pin count",
            frame_id
        );
        if state.pin_counts[frame_id] == 0 {
            return;
        }

        state.pin_counts[frame_id] -= 1;
        if state.pin_counts[frame_id] == 0 {
            state.num_available += 1;
            state.replacer.set_evictable(frame_id, true);
        }
    }

    /// Picks an unbound frame for a new binding: a never-used frame if there
    /// is one, otherwise an evicted victim that has been written back and
    /// removed from the block index.
    fn acquire_frame(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .evict()
            .ok_or(StorageError::BufferPoolExhausted {
                pool_size: self.frames.len(),
            })?;

        if let Err(e) = self.write_back(frame_id) {
            // Leave the victim resident and evictable.
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, true);
            return Err(e);
        }

        let old_block = {
            let mut contents = self.frames[frame_id].contents.lock();
            let old_block = contents.block.take();
            contents.reset();
            old_block
        };
        if let Some(old_block) = old_block {
            state.page_table.remove(&old_block);
            debug!("Evicted {} from frame {}", old_block, frame_id);
        }

        Ok(frame_id)
    }

    /// Returns an acquired but unbound frame to the free list.
    fn release_frame(&self, state: &mut PoolState, frame_id: FrameId) {
        state.replacer.remove(frame_id);
        state.free_list.push_back(frame_id);
    }
}

/// Buffer pool manager handle. Clones share the same pool.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    pub fn new(files: Arc<FileManager>, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        let block_size = files.block_size();
        Self {
            inner: Arc::new(BufferPoolInner {
                frames: (0..pool_size).map(|_| Frame::new(block_size)).collect(),
                state: Mutex::new(PoolState {
                    pin_counts: vec![0; pool_size],
                    page_table: HashMap::with_capacity(pool_size),
                    free_list: (0..pool_size).collect(),
                    replacer,
                    num_available: pool_size,
                }),
                files,
                wal: RwLock::new(None),
            }),
        }
    }

    pub fn files(&self) -> &Arc<FileManager> {
        &self.inner.files
    }

    pub fn pool_size(&self) -> usize {
        self.inner.frames.len()
    }

    /// Registers the log that must be flushed before dirty pages are
    /// written back. Only a weak reference is kept.
    pub fn set_write_ahead_log(&self, wal: Weak<dyn WriteAheadLog>) {
        *self.inner.wal.write() = Some(wal);
    }

    /// Pins `block`, reading it from disk if it is not resident.
    pub fn pin(&self, block: &BlockId) -> StorageResult<PinnedBuffer> {
        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(block) {
            trace!("Buffer pool hit for {} in frame {}", block, frame_id);
            self.inner.pin_frame(&mut state, frame_id);
            return Ok(self.lease(frame_id, block.clone()));
        }

        let frame_id = self.inner.acquire_frame(&mut state)?;
        let loaded = {
            let mut contents = self.inner.frames[frame_id].contents.lock();
            let result = self.inner.files.read(block, &mut contents.page);
            if result.is_ok() {
                contents.block = Some(block.clone());
            }
            result
        };
        if let Err(e) = loaded {
            self.inner.release_frame(&mut state, frame_id);
            return Err(e);
        }

        debug!("Buffer pool miss for {}, loaded into frame {}", block, frame_id);
        state.page_table.insert(block.clone(), frame_id);
        self.inner.pin_frame(&mut state, frame_id);
        Ok(self.lease(frame_id, block.clone()))
    }

    /// Appends a new block to `filename`, formats it with `formatter` and
    /// pins it. No block is appended when the pool is exhausted.
    ///
    /// The formatter runs while the pool is locked and must not call back
    /// into the pool.
    pub fn pin_new<F>(&self, filename: &str, formatter: F) -> StorageResult<PinnedBuffer>
    where
        F: FnOnce(&mut Page) -> StorageResult<()>,
    {
        let mut state = self.inner.state.lock();
        let frame_id = self.inner.acquire_frame(&mut state)?;

        let appended = {
            let mut contents = self.inner.frames[frame_id].contents.lock();
            contents.reset();
            let result = formatter(&mut contents.page)
                .and_then(|_| self.inner.files.append(filename, &contents.page));
            if let Ok(block) = &result {
                contents.block = Some(block.clone());
            }
            result
        };
        let block = match appended {
            Ok(block) => block,
            Err(e) => {
                self.inner.release_frame(&mut state, frame_id);
                return Err(e);
            }
        };

        debug!("Allocated {} in frame {}", block, frame_id);
        state.page_table.insert(block.clone(), frame_id);
        self.inner.pin_frame(&mut state, frame_id);
        Ok(self.lease(frame_id, block))
    }

    /// Releases a lease. Equivalent to dropping it.
    pub fn unpin(&self, buffer: PinnedBuffer) {
        drop(buffer);
    }

    /// Writes back every resident buffer last modified by `txn`, pinned or
    /// not.
    pub fn flush_all(&self, txn: TxnId) -> StorageResult<()> {
        let state = self.inner.state.lock();
        for &frame_id in state.page_table.values() {
            if self.inner.frames[frame_id].is_modified_by(txn) {
                self.inner.write_back(frame_id)?;
            }
        }
        Ok(())
    }

    /// Number of unpinned frames. Diagnostic only: the value can be stale
    /// by the time the caller looks at it.
    pub fn available(&self) -> usize {
        let state = self.inner.state.lock();
        debug_assert_eq!(
            state.num_available,
            state.replacer.size() + state.free_list.len(),
            "unpinned frames are either evictable or free"
        );
        state.num_available
    }

    pub fn contains_mapping(&self, block: &BlockId) -> bool {
        self.inner.state.lock().page_table.contains_key(block)
    }

    /// Frame currently bound to `block`, if it is resident.
    pub fn get_mapping(&self, block: &BlockId) -> Option<FrameId> {
        self.inner.state.lock().page_table.get(block).copied()
    }

    pub fn pin_count(&self, block: &BlockId) -> Option<u32> {
        let state = self.inner.state.lock();
        let frame_id = *state.page_table.get(block)?;
        Some(state.pin_counts[frame_id])
    }

    /// Number of frames bound to a block.
    pub fn resident_count(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }

    /// Per-frame view of the pool, in frame order.
    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        let state = self.inner.state.lock();
        self.inner
            .frames
            .iter()
            .enumerate()
            .map(|(frame_id, frame)| {
                let contents = frame.contents.lock();
                FrameSnapshot {
                    frame_id,
                    block: contents.block.clone(),
                    pin_count: state.pin_counts[frame_id],
                    history: state.replacer.history(frame_id),
                    modified_by: contents.modified_by,
                }
            })
            .collect()
    }

    fn lease(&self, frame_id: FrameId, block: BlockId) -> PinnedBuffer {
        PinnedBuffer {
            inner: self.inner.clone(),
            frame_id,
            block,
        }
    }
}

/// Diagnostic view of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub frame_id: FrameId,
    pub block: Option<BlockId>,
    pub pin_count: u32,
    pub history: Option<AccessHistory>,
    pub modified_by: Option<TxnId>,
}

impl fmt::Display for FrameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}: ", self.frame_id)?;
        match &self.block {
            Some(block) => write!(f, "{}", block)?,
            None => write!(f, "<free>")?,
        }
        write!(f, " pins={}", self.pin_count)?;
        if let Some(history) = self.history {
            write!(f, " last={}", history.last)?;
            if let Some(second_last) = history.second_last {
                write!(f, " second_last={}", second_last)?;
            }
        }
        if let Some(txn) = self.modified_by {
            write!(f, " dirty({})", txn)?;
        }
        Ok(())
    }
}

/// A pinned frame. The pin is released when the lease is dropped; holders
/// must not keep data read through it past that point.
pub struct PinnedBuffer {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    block: BlockId,
}

impl PinnedBuffer {
    pub fn block(&self) -> &BlockId {
        &self.block
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn get_int(&self, offset: usize) -> StorageResult<i32> {
        self.frame().contents.lock().page.get_int(offset)
    }

    pub fn get_string(&self, offset: usize) -> StorageResult<String> {
        self.frame().contents.lock().page.get_string(offset)
    }

    /// Runs `f` against the page while holding the frame's content lock.
    pub fn with_page<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        f(&self.frame().contents.lock().page)
    }

    /// Writes an integer on behalf of `txn`. `lsn` is the log record that
    /// must be durable before this page may be written back.
    pub fn set_int(
        &self,
        offset: usize,
        value: i32,
        txn: TxnId,
        lsn: Option<Lsn>,
    ) -> StorageResult<()> {
        let mut contents = self.frame().contents.lock();
        contents.page.set_int(offset, value)?;
        Self::mark_modified(&mut contents, txn, lsn);
        Ok(())
    }

    pub fn set_string(
        &self,
        offset: usize,
        value: &str,
        txn: TxnId,
        lsn: Option<Lsn>,
    ) -> StorageResult<()> {
        let mut contents = self.frame().contents.lock();
        contents.page.set_string(offset, value)?;
        Self::mark_modified(&mut contents, txn, lsn);
        Ok(())
    }

    pub fn modified_by(&self) -> Option<TxnId> {
        self.frame().contents.lock().modified_by
    }

    pub fn is_modified_by(&self, txn: TxnId) -> bool {
        self.frame().is_modified_by(txn)
    }

    pub fn lsn(&self) -> Option<Lsn> {
        self.frame().contents.lock().lsn
    }

    /// Writes the page back now if it is dirty.
    pub fn force_flush(&self) -> StorageResult<()> {
        self.inner.write_back(self.frame_id)
    }

    /// A handle that can flush this frame without holding a pin.
    pub(crate) fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            inner: self.inner.clone(),
            frame_id: self.frame_id,
            block: self.block.clone(),
        }
    }

    fn frame(&self) -> &Frame {
        &self.inner.frames[self.frame_id]
    }

    fn mark_modified(contents: &mut FrameContents, txn: TxnId, lsn: Option<Lsn>) {
        contents.modified_by = Some(txn);
        if lsn.is_some() {
            contents.lsn = lsn;
        }
    }
}

impl fmt::Debug for PinnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedBuffer")
            .field("frame_id", &self.frame_id)
            .field("block", &self.block)
            .finish()
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        self.inner.unpin_frame(self.frame_id);
    }
}

/// Flushes a frame only while it is still bound to the block it was
/// created for. Once the frame has been rebound this is a no-op.
pub(crate) struct FlushHandle {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    block: BlockId,
}

impl FlushHandle {
    pub(crate) fn flush(&self) -> StorageResult<()> {
        let frame = &self.inner.frames[self.frame_id];
        let mut contents = frame.contents.lock();
        if contents.block.as_ref() != Some(&self.block) || contents.modified_by.is_none() {
            return Ok(());
        }
        self.inner.files.write(&self.block, &contents.page)?;
        contents.modified_by = None;
        Ok(())
    }
}
