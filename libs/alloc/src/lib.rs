//! Slab allocation for relheap's heap blocks.
//!
//! ## Size classes
//! Requests of up to 2048 bytes are rounded up to one of six fixed
//! block sizes. Each size class owns a free list threaded
//! through its unused blocks. When a free list is empty,
//! a fresh region of pages is requested from the system and carved up.
//!
//! Anything larger is rounded up to a power-of-two number of pages
//! and handed straight to the page allocator.
//!
//! ## Bulk release
//! Every [SlabAllocator] remembers each region and large block it has
//! handed out. This is what makes the speculative arena cheap to discard:
//! [SlabAllocator::release_all] returns all of it in one pass,
//! without visiting individual objects.
#![deny(missing_docs)]

use std::alloc::Layout;

pub mod free_lists;
pub mod pages;
pub mod size_class;
pub mod slab;
pub mod stats;

pub use self::pages::PAGE_SIZE;
pub use self::size_class::{size_code, SizeClass, SMALL_CLASS_SIZES};
pub use self::slab::{SlabAllocator, SlabOptions};
pub use self::stats::{AllocStats, AllocTracker};

/// An error caused when allocating a chunk of memory
///
/// Neither variant is expected to be recovered from.
/// Callers either surface them as implementation-limit failures
/// or use [AllocationError::consider_fatal].
#[derive(Clone, Debug, thiserror::Error)]
pub enum AllocationError {
    /// Indicates that the system allocator refused
    /// to hand out more pages
    #[error("Out of memory allocating {} bytes (align {})", layout.size(), layout.align())]
    OutOfMemory {
        /// The layout that failed to allocate
        layout: Layout
    },
    /// Indicates that the specified size is invalid
    #[error("Invalid size {size}: {cause}")]
    InvalidSize {
        /// The requested size
        size: usize,
        /// The reason the size is invalid
        cause: &'static str
    },
}
impl AllocationError {
    /// Treat this error as a fatal error and panic with an appropriate message
    ///
    /// This is analogous to [std::alloc::handle_alloc_error] from the
    /// standard allocator API.
    #[cold]
    pub fn consider_fatal(&self) -> ! {
        match *self {
            AllocationError::OutOfMemory { layout } => {
                std::alloc::handle_alloc_error(layout)
            },
            AllocationError::InvalidSize { size, cause } => {
                panic!("Invalid size {}: {}", size, cause);
            }
        }
    }
}
