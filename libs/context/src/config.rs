//! Configuration of a [Runtime](crate::Runtime)
use relheap_alloc::SlabOptions;
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// The configuration of a runtime
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize), serde(default))]
pub struct RuntimeConfig {
    /// The number of pages carved up whenever
    /// a size class runs out of free blocks
    pub region_pages: usize,
    /// The initial capacity of the worklist
    /// of blocks awaiting destruction
    pub release_queue_capacity: usize,
    /// Track allocation counters and the set of live permanent blocks
    ///
    /// Defaults to on in debug builds.
    pub track_allocations: bool,
    /// Fill fresh and freed memory with a poison pattern
    ///
    /// Defaults to on in debug builds.
    pub poison_freed: bool,
}
impl RuntimeConfig {
    /// The options for the permanent allocator
    pub fn permanent_slab(&self) -> SlabOptions {
        SlabOptions {
            region_pages: self.region_pages,
            poison_freed: self.poison_freed,
            track_allocations: self.track_allocations,
        }
    }
    /// The options for the speculative arena
    ///
    /// Speculative blocks are never tracked individually,
    /// the whole arena is released at once.
    pub fn speculative_slab(&self) -> SlabOptions {
        SlabOptions {
            track_allocations: false,
            ..self.permanent_slab()
        }
    }
}
impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            region_pages: 16,
            release_queue_capacity: 1024,
            track_allocations: cfg!(debug_assertions),
            poison_freed: cfg!(debug_assertions),
        }
    }
}
