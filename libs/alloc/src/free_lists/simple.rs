//! A simple (single threaded) free list

use std::cell::Cell;
use std::ptr::NonNull;

use super::{FreeSlot, FREE_SLOT_MARKER, MINIMUM_SIZE};

/// A simple free list
pub struct SimpleFreeList {
    next: Cell<Option<NonNull<FreeSlot>>>,
    len: Cell<usize>,
    size: usize
}
impl SimpleFreeList {
    /// Create a new free list
    #[inline]
    pub const fn new(size: usize) -> SimpleFreeList {
        assert!(size >= MINIMUM_SIZE);
        SimpleFreeList { next: Cell::new(None), len: Cell::new(0), size }
    }
    /// The fixed size of entries in the free list
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
    /// The number of slots currently in the list
    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }
    /// Check if the list has no free slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next.get().is_none()
    }
    /// Take the next free slot
    #[inline]
    pub fn take_free(&self) -> Option<NonNull<u8>> {
        let next_free = self.next.get()?;
        unsafe {
            debug_assert!(
                next_free.as_ref().is_free(),
                "Corrupted free slot {:p}", next_free
            );
            self.next.set(next_free.as_ref().next_free);
        }
        self.len.set(self.len.get() - 1);
        Some(next_free.cast())
    }
    /// Push a slot onto the head of the list
    ///
    /// ## Safety
    /// The slot must be a block of exactly `self.size()` bytes,
    /// aligned for a pointer, and no longer in use.
    #[inline]
    pub unsafe fn insert_free(&self, slot: NonNull<u8>) {
        let slot = slot.cast::<FreeSlot>();
        slot.as_ptr().write(FreeSlot {
            next_free: self.next.get(),
            marker: FREE_SLOT_MARKER
        });
        self.next.set(Some(slot));
        self.len.set(self.len.get() + 1);
    }
    /// Thread `count` consecutive blocks starting at `start` into the list
    ///
    /// The lowest block ends up at the head.
    ///
    /// ## Safety
    /// The memory must be valid for `count * self.size()` bytes
    /// and must not be in use.
    pub unsafe fn insert_region(&self, start: NonNull<u8>, count: usize) {
        for index in (0..count).rev() {
            self.insert_free(NonNull::new_unchecked(
                start.as_ptr().add(index * self.size)
            ));
        }
    }
    /// Forget every slot in the list
    ///
    /// Used once the memory backing the slots has been released wholesale.
    #[inline]
    pub fn clear(&self) {
        self.next.set(None);
        self.len.set(0);
    }
}
