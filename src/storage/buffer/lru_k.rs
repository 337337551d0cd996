//! LRU-K replacement with K = 2.
//!
//! The backward distance of a frame is the age of its second most recent
//! access. Frames accessed fewer than two times have an infinite backward
//! distance and are always evicted before any frame with a finite one.
//! Among infinite-distance frames the one with the oldest last access goes
//! first. Among finite-distance frames the order is decided by [`TieBreak`].

use super::replacer::{AccessHistory, FrameId, Replacer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How two frames that were both accessed at least twice are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TieBreak {
    /// Evict the frame whose second most recent access is older. This is the
    /// textbook LRU-2 ordering.
    #[default]
    SecondLastAccess,
    /// Evict the frame whose most recent access is older.
    LastAccess,
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    history: AccessHistory,
    evictable: bool,
}

#[derive(Debug)]
pub struct LruKReplacer {
    frames: Vec<Option<FrameEntry>>,
    /// Logical clock, advanced once per recorded access.
    current_timestamp: u64,
    tie_break: TieBreak,
}

impl LruKReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self::with_tie_break(num_frames, TieBreak::default())
    }

    pub fn with_tie_break(num_frames: usize, tie_break: TieBreak) -> Self {
        Self {
            frames: vec![None; num_frames],
            current_timestamp: 0,
            tie_break,
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Orders two candidates so that the better victim compares as `Less`.
    fn victim_order(&self, a: &AccessHistory, b: &AccessHistory) -> Ordering {
        match (a.second_last, b.second_last) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => a.last.cmp(&b.last),
            (Some(a_second), Some(b_second)) => match self.tie_break {
                TieBreak::SecondLastAccess => a_second.cmp(&b_second),
                TieBreak::LastAccess => a.last.cmp(&b.last),
            },
        }
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        self.current_timestamp += 1;
        let now = self.current_timestamp;

        match self.frames[frame_id].as_mut() {
            Some(entry) => {
                entry.history.second_last = Some(entry.history.last);
                entry.history.last = now;
            }
            None => {
                self.frames[frame_id] = Some(FrameEntry {
                    history: AccessHistory {
                        last: now,
                        second_last: None,
                    },
                    evictable: false,
                });
            }
        }
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if let Some(entry) = self.frames[frame_id].as_mut() {
            entry.evictable = evictable;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        let mut victim: Option<(FrameId, AccessHistory)> = None;

        for (frame_id, entry) in self.frames.iter().enumerate() {
            let Some(entry) = entry.filter(|e| e.evictable) else {
                continue;
            };
            let better = match &victim {
                None => true,
                Some((_, current)) => {
                    self.victim_order(&entry.history, current) == Ordering::Less
                }
            };
            if better {
                victim = Some((frame_id, entry.history));
            }
        }

        let (frame_id, _) = victim?;
        self.frames[frame_id] = None;
        Some(frame_id)
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.frames[frame_id] = None;
    }

    fn history(&self, frame_id: FrameId) -> Option<AccessHistory> {
        self.frames.get(frame_id)?.map(|entry| entry.history)
    }

    fn size(&self) -> usize {
        self.frames.iter().flatten().filter(|e| e.evictable).count()
    }
}
