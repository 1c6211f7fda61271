//! Fixed-size free lists
//!
//! Implemented as intrusive linked lists,
//! threaded through the first words of the unused blocks themselves.

use std::ptr::NonNull;

pub mod simple;

pub use self::simple::SimpleFreeList;

/// The minimum size of a block that can be threaded into a free list
pub const MINIMUM_SIZE: usize = std::mem::size_of::<FreeSlot>();

/// Written into the second word of every free slot.
///
/// It is checked whenever a slot is taken back out of the list,
/// which catches writes through dangling pointers to freed blocks.
pub const FREE_SLOT_MARKER: usize = 0xF3EE_B10C;

/// An unused block, as seen by its free list
#[repr(C)]
pub struct FreeSlot {
    /// The next free slot, or `None` if this is the last one
    pub(crate) next_free: Option<NonNull<FreeSlot>>,
    /// Marker for the slot, always `FREE_SLOT_MARKER`
    pub marker: usize,
}
impl FreeSlot {
    /// Check if this slot is marked as free
    #[inline]
    pub fn is_free(&self) -> bool {
        self.marker == FREE_SLOT_MARKER
    }
}
