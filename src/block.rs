//! The layouts of heap blocks
//!
//! Every block starts with a 32-bit owner count.
//! Element buffers follow the fixed header directly,
//! so the byte size of a block is a simple function of its element count.
use std::mem::size_of;
use std::ptr::NonNull;

use crate::value::{MemLayout, Value, ValueType};

/// Marks a relation's sort index as not (yet) built
pub const INVALID_INDEX: u32 = u32::MAX;
/// The size of a value, in bytes
const VALUE_SIZE: usize = size_of::<Value>();

/// The header of a sequence block
///
/// Values referencing the block only see a prefix of the buffer:
/// `size` counts the initialized (and owned) elements, which may be fewer than `capacity`.
#[repr(C)]
pub struct SeqBlock {
    pub ref_count: u32,
    /// Zero once the block has been copied for commit
    pub capacity: u32,
    pub size: u32,
    reserved: u32,
}
impl SeqBlock {
    #[inline]
    pub const fn new(capacity: u32, size: u32) -> SeqBlock {
        SeqBlock { ref_count: 1, capacity, size, reserved: 0 }
    }
    /// The byte size of a block with the specified capacity
    #[inline]
    pub const fn mem_size(capacity: u32) -> usize {
        size_of::<SeqBlock>() + capacity as usize * VALUE_SIZE
    }
    /// The capacity that fits in a block of `bytes` bytes
    #[inline]
    pub fn capacity_for(bytes: usize) -> u32 {
        ((bytes - size_of::<SeqBlock>()) / VALUE_SIZE).min(u32::MAX as usize) as u32
    }
    /// The first element of the buffer
    #[inline]
    pub unsafe fn buffer(block: NonNull<SeqBlock>) -> NonNull<Value> {
        NonNull::new_unchecked(block.as_ptr().add(1).cast())
    }
}

/// The header of a set, binary relation or ternary relation block
///
/// Sets have `size` elements. Binary relations store
/// their left column, then their right column,
/// then a reverse sort index of `size` entries.
/// Ternary relations store three columns then two rotated sort indexes.
#[repr(C)]
pub struct RelBlock {
    pub ref_count: u32,
    /// Zero once the block has been copied for commit
    pub size: u32,
}
impl RelBlock {
    /// The first element of the buffer
    #[inline]
    pub unsafe fn buffer(block: NonNull<RelBlock>) -> NonNull<Value> {
        NonNull::new_unchecked(block.as_ptr().add(1).cast())
    }
}

/// A boxed tagged value
#[repr(C)]
pub struct TagBox {
    pub ref_count: u32,
    pub tag: u16,
    /// [TagBox::COPIED] once the block has been copied for commit
    pub copied: u16,
    pub value: Value,
}
impl TagBox {
    pub const COPIED: u16 = 0xFFFF;
}

impl Value {
    /// The address of the heap block behind this value
    ///
    /// Slices give the address of the sequence block they view.
    #[inline]
    pub fn block_ptr(self) -> Option<NonNull<u8>> {
        BlockRef::of(self).map(|block| block.ptr)
    }
}

/// The concrete layout of a heap block
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// A [SeqBlock], referenced by sequences and slices
    Sequence,
    /// A [RelBlock] with one column
    Set,
    /// A [RelBlock] with two columns and one index
    BinaryRelation,
    /// A [RelBlock] with three columns and two indexes
    TernaryRelation,
    /// A [TagBox]
    TagBox,
}
impl BlockKind {
    /// The kind of block behind a heap value of the specified type
    pub fn of(ty: ValueType) -> Option<BlockKind> {
        match ty {
            ValueType::Sequence | ValueType::Slice => Some(BlockKind::Sequence),
            ValueType::Set => Some(BlockKind::Set),
            ValueType::BinaryRelation | ValueType::Map
                | ValueType::LogicalMap => Some(BlockKind::BinaryRelation),
            ValueType::TernaryRelation => Some(BlockKind::TernaryRelation),
            ValueType::TaggedUnion => Some(BlockKind::TagBox),
            ValueType::Blank | ValueType::Null | ValueType::Symbol
                | ValueType::Integer | ValueType::Float => None,
        }
    }
    /// The number of columns of values per row
    #[inline]
    pub const fn columns(self) -> usize {
        match self {
            BlockKind::Sequence | BlockKind::Set | BlockKind::TagBox => 1,
            BlockKind::BinaryRelation => 2,
            BlockKind::TernaryRelation => 3,
        }
    }
    /// The number of u32 sort indexes per row
    #[inline]
    pub const fn indexes(self) -> usize {
        match self {
            BlockKind::BinaryRelation => 1,
            BlockKind::TernaryRelation => 2,
            BlockKind::Sequence | BlockKind::Set | BlockKind::TagBox => 0,
        }
    }
    /// The byte size of a relation block of this kind with `size` rows
    #[inline]
    pub const fn rel_mem_size(self, size: u32) -> usize {
        size_of::<RelBlock>()
            + size as usize * (self.columns() * VALUE_SIZE + self.indexes() * size_of::<u32>())
    }
}

/// A descriptor that can't belong to a live value
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("invalid {field} in {value:?}")]
    InvalidField {
        field: &'static str,
        value: Value,
    },
    #[error("heap layout on {0:?}")]
    NotABlock(Value),
}

/// A reference to a heap block, with everything needed to free it
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub ptr: NonNull<u8>,
    pub kind: BlockKind,
    pub layout: MemLayout,
}
impl BlockRef {
    /// Decode the block behind a heap value, or `None` for inline values
    pub fn decode(value: Value) -> Result<Option<BlockRef>, DescriptorError> {
        let layout = match value.try_layout() {
            Some(MemLayout::Inline) => return Ok(None),
            Some(layout) => layout,
            None => return Err(DescriptorError::InvalidField { field: "memory layout", value }),
        };
        let kind = match value.try_physical_type() {
            Some(ty) => BlockKind::of(ty).ok_or(DescriptorError::NotABlock(value))?,
            None => return Err(DescriptorError::InvalidField { field: "type tag", value }),
        };
        let payload = value.payload_ptr();
        let ptr = match kind {
            // Sequences point at their first visible element
            BlockKind::Sequence => {
                let offset = value.seq_offset().unwrap_or(0) as usize;
                unsafe {
                    payload.cast::<Value>().sub(offset)
                        .cast::<SeqBlock>().sub(1)
                        .cast::<u8>()
                }
            },
            _ => payload,
        };
        Ok(NonNull::new(ptr).map(|ptr| BlockRef { ptr, kind, layout }))
    }
    /// The block behind a heap value, or `None` for inline values
    ///
    /// Panics on a corrupt descriptor. The heap reports those through
    /// [Runtime::internal_fail](relheap_context::Runtime::internal_fail) instead.
    pub fn of(value: Value) -> Option<BlockRef> {
        match BlockRef::decode(value) {
            Ok(block) => block,
            Err(cause) => panic!("Internal error: {}", cause),
        }
    }
    /// The owner count at the start of every block
    #[inline]
    pub unsafe fn ref_count(self) -> *mut u32 {
        self.ptr.as_ptr().cast::<u32>()
    }
    #[inline]
    pub fn as_seq(self) -> NonNull<SeqBlock> {
        debug_assert_eq!(self.kind, BlockKind::Sequence);
        self.ptr.cast()
    }
    #[inline]
    pub fn as_rel(self) -> NonNull<RelBlock> {
        debug_assert!(matches!(
            self.kind,
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation
        ));
        self.ptr.cast()
    }
    #[inline]
    pub fn as_tag_box(self) -> NonNull<TagBox> {
        debug_assert_eq!(self.kind, BlockKind::TagBox);
        self.ptr.cast()
    }
    /// The values owned by the block
    ///
    /// For relations this is every column, one after another.
    pub unsafe fn children(self) -> (NonNull<Value>, usize) {
        match self.kind {
            BlockKind::Sequence => {
                let seq = self.as_seq();
                (SeqBlock::buffer(seq), (*seq.as_ptr()).size as usize)
            },
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                let rel = self.as_rel();
                (
                    RelBlock::buffer(rel),
                    (*rel.as_ptr()).size as usize * self.kind.columns()
                )
            },
            BlockKind::TagBox => {
                let tag_box = self.as_tag_box();
                (NonNull::from(&mut (*tag_box.as_ptr()).value), 1)
            },
        }
    }
    /// The sort indexes following a relation's columns
    pub unsafe fn sort_indexes(self) -> (NonNull<u32>, usize) {
        let rel = self.as_rel();
        let size = (*rel.as_ptr()).size as usize;
        let start = RelBlock::buffer(rel).as_ptr().add(size * self.kind.columns());
        (NonNull::new_unchecked(start.cast()), size * self.kind.indexes())
    }
    /// The byte size of the block, as it was requested from the allocator
    pub unsafe fn mem_size(self) -> usize {
        match self.kind {
            BlockKind::Sequence => SeqBlock::mem_size((*self.as_seq().as_ptr()).capacity),
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                self.kind.rel_mem_size((*self.as_rel().as_ptr()).size)
            },
            BlockKind::TagBox => size_of::<TagBox>(),
        }
    }
    /// The permanent copy of the block, if it has already been copied for commit
    ///
    /// Copied blocks have their "used" field zeroed (or [TagBox::COPIED] set),
    /// and the address of the copy written over their first payload word.
    pub unsafe fn forwarded(self) -> Option<NonNull<u8>> {
        let copied = match self.kind {
            BlockKind::Sequence => (*self.as_seq().as_ptr()).capacity == 0,
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                (*self.as_rel().as_ptr()).size == 0
            },
            BlockKind::TagBox => (*self.as_tag_box().as_ptr()).copied == TagBox::COPIED,
        };
        if copied {
            NonNull::new(self.forwarding_slot().as_ptr().read())
        } else {
            None
        }
    }
    /// Mark the block as copied, forwarding to `copy`
    ///
    /// The block's contents are unusable afterwards.
    pub unsafe fn install_forwarding(self, copy: NonNull<u8>) {
        debug_assert!(self.forwarded().is_none());
        self.forwarding_slot().as_ptr().write(copy.as_ptr());
        match self.kind {
            BlockKind::Sequence => (*self.as_seq().as_ptr()).capacity = 0,
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                (*self.as_rel().as_ptr()).size = 0
            },
            BlockKind::TagBox => (*self.as_tag_box().as_ptr()).copied = TagBox::COPIED,
        }
    }
    /// The first payload word, which holds the forwarding pointer once copied
    unsafe fn forwarding_slot(self) -> NonNull<*mut u8> {
        // The size may already be zeroed, so don't go through `children`
        let first = match self.kind {
            BlockKind::Sequence => SeqBlock::buffer(self.as_seq()),
            BlockKind::TagBox => NonNull::from(&mut (*self.as_tag_box().as_ptr()).value),
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                RelBlock::buffer(self.as_rel())
            },
        };
        first.cast()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layouts() {
        assert_eq!(size_of::<SeqBlock>(), 16);
        assert_eq!(size_of::<RelBlock>(), 8);
        assert_eq!(size_of::<TagBox>(), 24);
        assert_eq!(SeqBlock::mem_size(3), 16 + 48);
        assert_eq!(BlockKind::Set.rel_mem_size(4), 8 + 64);
        assert_eq!(BlockKind::BinaryRelation.rel_mem_size(4), 8 + 4 * 32 + 4 * 4);
        assert_eq!(BlockKind::TernaryRelation.rel_mem_size(4), 8 + 4 * 48 + 4 * 8);
        assert_eq!(SeqBlock::capacity_for(128), 7);
    }

    #[test]
    fn decoding() {
        let mut header = [0u64; 8];
        let ptr = NonNull::from(&mut header[0]).cast::<u8>();
        let set = Value::from_block(ValueType::Set, MemLayout::Standard, ptr);
        let block = BlockRef::decode(set).unwrap().unwrap();
        assert_eq!(block.ptr, ptr);
        assert_eq!(block.kind, BlockKind::Set);
        assert!(BlockRef::decode(Value::int(3)).unwrap().is_none());
        // A heap layout on a type that never has a block
        let symbol = unsafe { Value::from_raw_parts(0, (1 << 60) | (2 << 56)) };
        assert!(matches!(BlockRef::decode(symbol), Err(DescriptorError::NotABlock(_))));
        let corrupt = unsafe { Value::from_raw_parts(0, (2 << 60) | (14 << 56)) };
        let err = BlockRef::decode(corrupt).unwrap_err();
        assert!(err.to_string().starts_with("invalid type tag"), "{}", err);
    }
}
