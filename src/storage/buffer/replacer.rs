use std::fmt::Debug;

pub type FrameId = usize;

/// The two most recent accesses of a frame, as ticks of the pool's logical
/// clock. `second_last` is `None` until the frame has been accessed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessHistory {
    pub last: u64,
    pub second_last: Option<u64>,
}

/// Victim selection policy. Implementations are driven under the pool lock.
pub trait Replacer: Send + Sync + Debug {
    /// Record an access to a frame at the next clock tick.
    fn record_access(&mut self, frame_id: FrameId);

    /// Mark a frame as evictable (unpinned) or not (pinned).
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Select a frame to evict and forget its history. Returns None if no
    /// frame can be evicted.
    fn evict(&mut self) -> Option<FrameId>;

    /// Forget a frame's history without selecting it.
    fn remove(&mut self, frame_id: FrameId);

    /// Access markers of a frame, if it has any.
    fn history(&self, frame_id: FrameId) -> Option<AccessHistory>;

    /// Get the number of evictable frames.
    fn size(&self) -> usize;
}
