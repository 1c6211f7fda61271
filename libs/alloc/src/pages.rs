//! Page-granularity allocation, backed by [std::alloc]
use std::alloc::Layout;
use std::ptr::NonNull;

use crate::AllocationError;

/// The size of a single page
pub const PAGE_SIZE: usize = 4096;
/// The largest number of pages a single block may span
pub const MAX_BLOCK_PAGES: usize = 1 << 20;

/// The layout of a run of `pages` contiguous pages
#[inline]
pub fn page_layout(pages: usize) -> Result<Layout, AllocationError> {
    if pages == 0 || pages > MAX_BLOCK_PAGES {
        return Err(AllocationError::InvalidSize {
            size: pages.saturating_mul(PAGE_SIZE),
            cause: "page count out of range"
        });
    }
    Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE)
        .map_err(|_| AllocationError::InvalidSize {
            size: pages * PAGE_SIZE,
            cause: "layout overflow"
        })
}

/// Allocate a run of `pages` page-aligned pages
pub fn alloc_pages(pages: usize) -> Result<NonNull<u8>, AllocationError> {
    let layout = page_layout(pages)?;
    // SAFETY: The layout has nonzero size
    let ptr = unsafe { std::alloc::alloc(layout) };
    NonNull::new(ptr).ok_or(AllocationError::OutOfMemory { layout })
}

/// Return a run of pages to the system
///
/// ## Safety
/// The pointer must have come from [alloc_pages]
/// with exactly the same page count, and must not be used again.
pub unsafe fn release_pages(ptr: NonNull<u8>, pages: usize) {
    let layout = match page_layout(pages) {
        Ok(layout) => layout,
        Err(cause) => cause.consider_fatal()
    };
    std::alloc::dealloc(ptr.as_ptr(), layout);
}
