//! The size-classed slab allocator
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use ahash::RandomState;
use indexmap::IndexMap;
use slog::{debug, o, trace, Logger};

use crate::free_lists::SimpleFreeList;
use crate::pages::{alloc_pages, release_pages, PAGE_SIZE};
use crate::size_class::{size_code, SizeClass, NUM_SMALL_CLASSES, SMALL_CLASS_SIZES};
use crate::stats::{AllocStats, AllocTracker};
use crate::AllocationError;

/// The byte written over fresh regions and freed blocks
/// when poisoning is enabled
pub const POISON_BYTE: u8 = 0xFF;

/// Options controlling a single [SlabAllocator]
#[derive(Clone, Debug)]
pub struct SlabOptions {
    /// The number of pages requested whenever a free list runs dry
    pub region_pages: usize,
    /// Overwrite fresh and freed memory with [POISON_BYTE]
    pub poison_freed: bool,
    /// Maintain [AllocStats] and the set of live blocks
    pub track_allocations: bool,
}
impl Default for SlabOptions {
    fn default() -> Self {
        SlabOptions {
            region_pages: 16,
            poison_freed: cfg!(debug_assertions),
            track_allocations: cfg!(debug_assertions),
        }
    }
}

/// A slab allocator with one free list per size class
///
/// All memory is owned by the allocator and returned
/// to the system when it is dropped (or by [SlabAllocator::release_all]).
pub struct SlabAllocator {
    free_lists: [SimpleFreeList; NUM_SMALL_CLASSES],
    /// The regions carved into pooled blocks
    regions: RefCell<Vec<NonNull<u8>>>,
    /// Outstanding large blocks, by address
    large_blocks: RefCell<IndexMap<usize, u32, RandomState>>,
    /// Bytes currently held from the page allocator
    held_bytes: Cell<usize>,
    tracker: Option<RefCell<AllocTracker>>,
    options: SlabOptions,
    logger: Logger,
}
impl SlabAllocator {
    /// Create an allocator which hasn't requested any memory yet
    pub fn new(name: &'static str, options: SlabOptions, logger: &Logger) -> SlabAllocator {
        assert!(options.region_pages >= 1, "Invalid region size: {:?}", options);
        SlabAllocator {
            free_lists: SMALL_CLASS_SIZES.map(SimpleFreeList::new),
            regions: RefCell::new(Vec::new()),
            large_blocks: RefCell::new(IndexMap::with_hasher(RandomState::new())),
            held_bytes: Cell::new(0),
            tracker: if options.track_allocations {
                Some(RefCell::new(AllocTracker::new()))
            } else {
                None
            },
            logger: logger.new(o!("slab" => name)),
            options,
        }
    }
    /// The options this allocator was created with
    #[inline]
    pub fn options(&self) -> &SlabOptions {
        &self.options
    }
    /// Allocate a block of at least `size` bytes
    #[inline]
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>, AllocationError> {
        self.alloc_with_size(size).map(|(ptr, _)| ptr)
    }
    /// Allocate a block of at least `size` bytes,
    /// returning the number of bytes that are actually usable
    ///
    /// The block is aligned to at least 64 bytes.
    /// Its contents are unspecified.
    pub fn alloc_with_size(&self, size: usize) -> Result<(NonNull<u8>, usize), AllocationError> {
        let class = size_code(size)?;
        let ptr = match class {
            SizeClass::Small(index) => self.alloc_small(index as usize)?,
            SizeClass::Large { pages } => self.alloc_large(pages)?,
        };
        if let Some(ref tracker) = self.tracker {
            tracker.borrow_mut().record_alloc(ptr, size, class.block_size());
        }
        Ok((ptr, class.block_size()))
    }
    fn alloc_small(&self, index: usize) -> Result<NonNull<u8>, AllocationError> {
        let list = &self.free_lists[index];
        if let Some(free) = list.take_free() {
            return Ok(free);
        }
        let region_bytes = self.options.region_pages * PAGE_SIZE;
        let region = alloc_pages(self.options.region_pages)?;
        if self.options.poison_freed {
            unsafe { region.as_ptr().write_bytes(POISON_BYTE, region_bytes) };
        }
        self.regions.borrow_mut().push(region);
        self.held_bytes.set(self.held_bytes.get() + region_bytes);
        let count = region_bytes / list.size();
        /*
         * The first block is returned directly,
         * the rest become the new free list.
         */
        unsafe {
            list.insert_region(
                NonNull::new_unchecked(region.as_ptr().add(list.size())),
                count - 1
            );
        }
        trace!(
            self.logger, "Carved region";
            "block_size" => list.size(),
            "blocks" => count,
            "ptr" => ?region,
        );
        Ok(region)
    }
    #[cold]
    fn alloc_large(&self, pages: u32) -> Result<NonNull<u8>, AllocationError> {
        let ptr = alloc_pages(pages as usize)?;
        let existing = self.large_blocks.borrow_mut()
            .insert(ptr.as_ptr() as usize, pages);
        debug_assert_eq!(existing, None);
        self.held_bytes.set(self.held_bytes.get() + pages as usize * PAGE_SIZE);
        debug!(
            self.logger, "Allocated large block";
            "pages" => pages,
            "ptr" => ?ptr,
        );
        Ok(ptr)
    }
    /// Return a block to the allocator
    ///
    /// Pooled blocks go to the head of their free list,
    /// large blocks go straight back to the system.
    ///
    /// ## Safety
    /// The block must have been allocated by this allocator
    /// with a size in the same class as `size`,
    /// and must not be used again.
    pub unsafe fn release(&self, ptr: NonNull<u8>, size: usize) {
        let class = match size_code(size) {
            Ok(class) => class,
            Err(cause) => cause.consider_fatal()
        };
        if let Some(ref tracker) = self.tracker {
            tracker.borrow_mut().record_release(ptr);
        }
        match class {
            SizeClass::Small(index) => {
                let list = &self.free_lists[index as usize];
                if self.options.poison_freed {
                    ptr.as_ptr().write_bytes(POISON_BYTE, list.size());
                }
                list.insert_free(ptr);
            },
            SizeClass::Large { pages } => {
                let removed = self.large_blocks.borrow_mut()
                    .swap_remove(&(ptr.as_ptr() as usize));
                assert_eq!(
                    removed, Some(pages),
                    "Unknown large block {:p}", ptr
                );
                self.held_bytes.set(self.held_bytes.get() - pages as usize * PAGE_SIZE);
                release_pages(ptr, pages as usize);
            }
        }
    }
    /// Return every region and large block to the system at once
    ///
    /// Returns the number of bytes released.
    ///
    /// ## Safety
    /// Every block this allocator ever handed out becomes invalid.
    pub unsafe fn release_all(&self) -> usize {
        let released = self.held_bytes.get();
        let mut regions = self.regions.borrow_mut();
        for region in regions.drain(..) {
            release_pages(region, self.options.region_pages);
        }
        let mut large_blocks = self.large_blocks.borrow_mut();
        for (addr, pages) in large_blocks.drain(..) {
            release_pages(NonNull::new_unchecked(addr as *mut u8), pages as usize);
        }
        for list in &self.free_lists {
            list.clear();
        }
        if let Some(ref tracker) = self.tracker {
            tracker.borrow_mut().clear();
        }
        self.held_bytes.set(0);
        if released > 0 {
            debug!(self.logger, "Released all memory"; "bytes" => released);
        }
        released
    }
    /// The number of bytes currently held from the page allocator,
    /// whether or not they are in use
    #[inline]
    pub fn outstanding_bytes(&self) -> usize {
        self.held_bytes.get()
    }
    /// The number of carved regions
    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.borrow().len()
    }
    /// The number of outstanding large blocks
    #[inline]
    pub fn large_block_count(&self) -> usize {
        self.large_blocks.borrow().len()
    }
    /// Check whether a pointer lies inside memory held by this allocator
    ///
    /// This is a linear scan, intended for debug assertions.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let region_bytes = self.options.region_pages * PAGE_SIZE;
        self.regions.borrow().iter().any(|region| {
            let start = region.as_ptr() as usize;
            addr >= start && addr < start + region_bytes
        }) || self.large_blocks.borrow().iter().any(|(&start, &pages)| {
            addr >= start && addr < start + pages as usize * PAGE_SIZE
        })
    }
    /// The allocation counters, if tracking is enabled
    #[inline]
    pub fn stats(&self) -> Option<AllocStats> {
        self.tracker.as_ref().map(|tracker| tracker.borrow().stats())
    }
    /// Whether the block is live, if tracking is enabled
    #[inline]
    pub fn is_live(&self, ptr: NonNull<u8>) -> Option<bool> {
        self.tracker.as_ref().map(|tracker| tracker.borrow().is_live(ptr))
    }
    /// Every live block and its size, if tracking is enabled
    pub fn live_blocks(&self) -> Option<Vec<(NonNull<u8>, usize)>> {
        self.tracker.as_ref().map(|tracker| tracker.borrow().live_blocks())
    }
}
impl Drop for SlabAllocator {
    fn drop(&mut self) {
        unsafe { self.release_all(); }
    }
}
