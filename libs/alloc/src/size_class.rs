//! Mapping byte sizes onto size classes
use std::fmt::{self, Display, Formatter};

use crate::pages::{MAX_BLOCK_PAGES, PAGE_SIZE};
use crate::AllocationError;

/// The block sizes of the pooled size classes
pub const SMALL_CLASS_SIZES: [usize; NUM_SMALL_CLASSES] = [64, 128, 256, 512, 1024, 2048];
/// The number of pooled size classes
pub const NUM_SMALL_CLASSES: usize = 6;
/// The largest request served from a free list
pub const MAX_SMALL_SIZE: usize = SMALL_CLASS_SIZES[NUM_SMALL_CLASSES - 1];

/// The size class a block was allocated in
///
/// Classes are ordered by their block size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
    /// One of the pooled classes, by index into [SMALL_CLASS_SIZES]
    Small(u8),
    /// A power-of-two run of whole pages
    Large {
        /// The number of pages, always a power of two
        pages: u32
    },
}
impl SizeClass {
    /// The number of bytes in a block of this class
    #[inline]
    pub const fn block_size(self) -> usize {
        match self {
            SizeClass::Small(index) => SMALL_CLASS_SIZES[index as usize],
            SizeClass::Large { pages } => pages as usize * PAGE_SIZE,
        }
    }
    /// Whether this class is pooled in a free list
    #[inline]
    pub const fn is_small(self) -> bool {
        matches!(self, SizeClass::Small(_))
    }
    /// The compact signed code for this class
    ///
    /// Pooled classes are their (nonnegative) index,
    /// large classes are the negated page count.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            SizeClass::Small(index) => index as i32,
            SizeClass::Large { pages } => -(pages as i32),
        }
    }
    /// Decode a class from [SizeClass::code]
    pub fn from_code(code: i32) -> Option<SizeClass> {
        if code >= 0 {
            if (code as usize) < NUM_SMALL_CLASSES {
                Some(SizeClass::Small(code as u8))
            } else {
                None
            }
        } else {
            let pages = code.unsigned_abs();
            if pages.is_power_of_two() && pages as usize <= MAX_BLOCK_PAGES {
                Some(SizeClass::Large { pages })
            } else {
                None
            }
        }
    }
}
impl Display for SizeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            SizeClass::Small(_) => write!(f, "small({})", self.block_size()),
            SizeClass::Large { pages } => write!(f, "large({} pages)", pages),
        }
    }
}

/// Determine the smallest size class that can hold `byte_size` bytes
///
/// Zero-sized requests and requests beyond the largest page run
/// are rejected.
pub fn size_code(byte_size: usize) -> Result<SizeClass, AllocationError> {
    if byte_size == 0 {
        return Err(AllocationError::InvalidSize {
            size: 0,
            cause: "zero-sized block"
        });
    }
    if byte_size <= MAX_SMALL_SIZE {
        let index = SMALL_CLASS_SIZES.iter()
            .position(|&class_size| byte_size <= class_size)
            .unwrap_or(NUM_SMALL_CLASSES - 1);
        return Ok(SizeClass::Small(index as u8));
    }
    match ((byte_size - 1) / PAGE_SIZE + 1).checked_next_power_of_two() {
        Some(pages) if pages <= MAX_BLOCK_PAGES => {
            Ok(SizeClass::Large { pages: pages as u32 })
        },
        _ => Err(AllocationError::InvalidSize {
            size: byte_size,
            cause: "exceeds the largest block"
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boundaries() {
        assert_eq!(size_code(1).unwrap(), SizeClass::Small(0));
        assert_eq!(size_code(64).unwrap(), SizeClass::Small(0));
        assert_eq!(size_code(65).unwrap(), SizeClass::Small(1));
        assert_eq!(size_code(2048).unwrap(), SizeClass::Small(5));
        assert_eq!(size_code(2049).unwrap(), SizeClass::Large { pages: 1 });
        assert_eq!(size_code(4097).unwrap(), SizeClass::Large { pages: 2 });
        assert_eq!(size_code(3 * PAGE_SIZE).unwrap(), SizeClass::Large { pages: 4 });
        assert_eq!(
            size_code(MAX_BLOCK_PAGES * PAGE_SIZE).unwrap(),
            SizeClass::Large { pages: MAX_BLOCK_PAGES as u32 }
        );
        assert!(size_code(MAX_BLOCK_PAGES * PAGE_SIZE + 1).is_err());
        assert!(size_code(0).is_err());
    }

    #[test]
    fn codes() {
        for index in 0..NUM_SMALL_CLASSES as u8 {
            let class = SizeClass::Small(index);
            assert_eq!(SizeClass::from_code(class.code()), Some(class));
        }
        let large = SizeClass::Large { pages: 8 };
        assert_eq!(large.code(), -8);
        assert_eq!(SizeClass::from_code(-8), Some(large));
        assert_eq!(SizeClass::from_code(-3), None);
        assert_eq!(SizeClass::from_code(6), None);
    }
}
