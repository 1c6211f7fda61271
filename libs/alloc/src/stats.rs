//! Debug accounting of live blocks
use std::ptr::NonNull;

use ahash::RandomState;
use indexmap::IndexMap;
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Counters describing the objects handed out by an allocator
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct AllocStats {
    /// The number of blocks currently allocated
    pub live_objects: usize,
    /// The highest value `live_objects` has reached
    pub peak_live_objects: usize,
    /// The number of blocks ever allocated
    pub total_objects: usize,
    /// The bytes in currently allocated blocks
    pub live_bytes: usize,
    /// The highest value `live_bytes` has reached
    pub peak_live_bytes: usize,
    /// The bytes requested by every allocation ever made
    ///
    /// Unlike `live_bytes`, this excludes the slack of the size classes.
    pub total_bytes: usize,
}
impl AllocStats {
    fn record_alloc(&mut self, requested: usize, bytes: usize) {
        debug_assert!(requested <= bytes);
        self.live_objects += 1;
        self.total_objects += 1;
        self.live_bytes += bytes;
        self.total_bytes += requested;
        self.peak_live_objects = self.peak_live_objects.max(self.live_objects);
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
    }
    fn record_release(&mut self, bytes: usize) {
        debug_assert!(self.live_objects >= 1);
        debug_assert!(self.live_bytes >= bytes, "Underflow {} - {}", self.live_bytes, bytes);
        self.live_objects -= 1;
        self.live_bytes -= bytes;
    }
}

/// Tracks every live block of an allocator, along with its [AllocStats]
///
/// Blocks are keyed by address and remember their block size.
pub struct AllocTracker {
    stats: AllocStats,
    live: IndexMap<usize, usize, RandomState>,
}
impl AllocTracker {
    /// Create an empty tracker
    pub fn new() -> AllocTracker {
        AllocTracker {
            stats: AllocStats::default(),
            live: IndexMap::with_hasher(RandomState::new())
        }
    }
    /// Record a newly handed out block of `bytes`,
    /// which was requested as `requested` bytes
    pub fn record_alloc(&mut self, ptr: NonNull<u8>, requested: usize, bytes: usize) {
        let existing = self.live.insert(ptr.as_ptr() as usize, bytes);
        assert!(existing.is_none(), "Block {:p} handed out twice", ptr);
        self.stats.record_alloc(requested, bytes);
    }
    /// Record that a block was returned to its allocator
    ///
    /// Panics if the block isn't live, which indicates a double free.
    pub fn record_release(&mut self, ptr: NonNull<u8>) {
        match self.live.swap_remove(&(ptr.as_ptr() as usize)) {
            Some(bytes) => self.stats.record_release(bytes),
            None => panic!("Releasing block {:p} which is not live", ptr),
        }
    }
    /// Check if the specified block is currently live
    #[inline]
    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.live.contains_key(&(ptr.as_ptr() as usize))
    }
    /// The current counters
    #[inline]
    pub fn stats(&self) -> AllocStats {
        self.stats
    }
    /// The address and block size of every live block,
    /// in no particular order
    pub fn live_blocks(&self) -> Vec<(NonNull<u8>, usize)> {
        self.live.iter()
            .filter_map(|(&addr, &bytes)| Some((NonNull::new(addr as *mut u8)?, bytes)))
            .collect()
    }
    /// Forget every live block, without touching the counters' peaks
    pub fn clear(&mut self) {
        self.live.clear();
        self.stats.live_objects = 0;
        self.stats.live_bytes = 0;
    }
}
impl Default for AllocTracker {
    fn default() -> Self {
        AllocTracker::new()
    }
}
