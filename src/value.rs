//! The 16-byte tagged value encoding
//!
//! A [Value] is a payload word and a descriptor word.
//! The payload holds an integer, the bits of a float,
//! or a pointer to a heap block.
//!
//! The descriptor ([Descriptor]) is laid out as follows (most significant bits first):
//!
//! | bits   | field                                         |
//! |--------|-----------------------------------------------|
//! | 63..62 | number of folded union tags                   |
//! | 61..60 | memory layout ([MemLayout])                   |
//! | 59..56 | physical type ([ValueType])                   |
//! | 55..28 | slice offset, in elements                     |
//! | 47..32 | outer tag                                     |
//! | 31..16 | inner tag                                     |
//! | 27..0  | sequence length                               |
//! | 15..0  | symbol index                                  |
//!
//! Fields overlap where the kinds using them are disjoint.
//! Sequences store their only tag in the outer tag slot,
//! which is why slices (which need the offset) can never fold a tag.
use std::fmt::{self, Debug, Formatter};
use std::ptr::NonNull;

use arbitrary_int::{u2, u28, Number};
use bitbybit::{bitenum, bitfield};

pub use relheap_context::MemLayout;

/// The longest sequence (or slice offset) the descriptor can represent
pub const MAX_SEQ_LEN: u32 = u28::MAX.value();
/// The number of union tags that fit in the descriptor of a non-sequence value
pub const MAX_FOLDED_TAGS: u8 = 2;

/// The physical type of a value
#[derive(Debug, PartialEq, Eq, Hash)]
#[bitenum(u4, exhaustive = false)]
pub enum ValueType {
    /// An uninitialized slot
    Blank = 0,
    /// The absent value
    Null = 1,
    /// An interned symbol
    Symbol = 2,
    /// A 64-bit integer
    Integer = 3,
    /// A 64-bit float
    Float = 4,
    /// A sequence (possibly empty)
    Sequence = 5,
    /// A set (empty relations share this type)
    Set = 6,
    /// A binary relation
    BinaryRelation = 7,
    /// A ternary relation
    TernaryRelation = 8,
    /// A tagged value boxed in its own block
    TaggedUnion = 9,
    /// A view of part of a sequence block
    Slice = 10,
    /// A binary relation used as a map, looked up by key
    Map = 11,
    /// A logical map
    LogicalMap = 12,
}
impl ValueType {
    /// Whether values of this type never own a heap block
    #[inline]
    pub const fn is_always_inline(self) -> bool {
        matches!(
            self,
            ValueType::Blank | ValueType::Null | ValueType::Symbol
                | ValueType::Integer | ValueType::Float
        )
    }
}

/// The descriptor word of a [Value]
///
/// Only the fields belonging to the value's type are meaningful.
/// The type and layout are `Err` for bit patterns no value uses.
#[bitfield(u64, default = 0)]
pub struct Descriptor {
    #[bits(62..=63, rw)]
    tag_count: u2,
    #[bits(60..=61, rw)]
    layout: Option<MemLayout>,
    #[bits(56..=59, rw)]
    ty: Option<ValueType>,
    // Slices only, in elements
    #[bits(28..=55, rw)]
    offset: u28,
    #[bits(32..=47, rw)]
    outer_tag: u16,
    // Shares its bits with the length of a sequence
    #[bits(16..=31, rw)]
    inner_tag: u16,
    #[bits(0..=27, rw)]
    length: u28,
    #[bits(0..=15, rw)]
    symbol: u16,
}

/// A tagged value
///
/// Values are plain handles. Copying one doesn't affect ownership,
/// that is managed explicitly through [Heap::retain](crate::Heap::retain)
/// and [Heap::release](crate::Heap::release).
#[derive(Copy, Clone)]
#[repr(C)]
pub struct Value {
    payload: u64,
    descriptor: Descriptor,
}
impl Value {
    /// The blank value, used for unfilled slots
    pub const BLANK: Value = Value { payload: 0, descriptor: Descriptor::DEFAULT };

    #[inline]
    const fn inline(ty: ValueType, payload: u64, fields: Descriptor) -> Value {
        Value { payload, descriptor: fields.with_ty(ty) }
    }
    /// The null value
    #[inline]
    pub const fn null() -> Value {
        Value::inline(ValueType::Null, 0, Descriptor::DEFAULT)
    }
    /// The symbol with the specified index
    #[inline]
    pub const fn symbol(index: u16) -> Value {
        Value::inline(ValueType::Symbol, 0, Descriptor::DEFAULT.with_symbol(index))
    }
    /// A boolean, encoded as symbol `0` (false) or `1` (true)
    #[inline]
    pub const fn bool(b: bool) -> Value {
        Value::symbol(b as u16)
    }
    /// An integer
    #[inline]
    pub const fn int(value: i64) -> Value {
        Value::inline(ValueType::Integer, value as u64, Descriptor::DEFAULT)
    }
    /// A float
    #[inline]
    pub fn float(value: f64) -> Value {
        Value::inline(ValueType::Float, value.to_bits(), Descriptor::DEFAULT)
    }
    /// The empty sequence
    #[inline]
    pub const fn empty_seq() -> Value {
        Value::inline(ValueType::Sequence, 0, Descriptor::DEFAULT)
    }
    /// The empty set, which doubles as the empty binary and ternary relation
    #[inline]
    pub const fn empty_rel() -> Value {
        Value::inline(ValueType::Set, 0, Descriptor::DEFAULT)
    }
    /// Reassemble a value from its payload and descriptor words
    ///
    /// ## Safety
    /// A heap value's payload must point at a live block
    /// of the kind the descriptor claims.
    #[inline]
    pub const unsafe fn from_raw_parts(payload: u64, descriptor: u64) -> Value {
        Value { payload, descriptor: Descriptor::new_with_raw_value(descriptor) }
    }
    /// A value referring to a heap block
    #[inline]
    pub(crate) fn from_block(ty: ValueType, layout: MemLayout, ptr: NonNull<u8>) -> Value {
        debug_assert!(!ty.is_always_inline());
        debug_assert_ne!(layout, MemLayout::Inline);
        Value {
            payload: ptr.as_ptr() as usize as u64,
            descriptor: Descriptor::DEFAULT.with_ty(ty).with_layout(layout),
        }
    }
    /// A sequence value viewing `len` elements of a sequence block,
    /// starting `offset` elements in.
    ///
    /// The pointer is to the first element of the block's buffer.
    /// A zero offset gives a plain sequence rather than a slice.
    pub(crate) fn seq_view(buffer: NonNull<Value>, layout: MemLayout, offset: u32, len: u32) -> Value {
        debug_assert!(len >= 1 && len <= MAX_SEQ_LEN && offset <= MAX_SEQ_LEN);
        let first = unsafe { NonNull::new_unchecked(buffer.as_ptr().add(offset as usize)) };
        if offset == 0 {
            let value = Value::from_block(ValueType::Sequence, layout, first.cast());
            Value {
                descriptor: value.descriptor.with_length(u28::new(len)),
                ..value
            }
        } else {
            let value = Value::from_block(ValueType::Slice, layout, first.cast());
            Value {
                descriptor: value.descriptor
                    .with_offset(u28::new(offset))
                    .with_length(u28::new(len)),
                ..value
            }
        }
    }
    /// The same value, pointing at a different heap block in another generation
    ///
    /// The descriptor (including any folded tags) is preserved,
    /// and sequences keep their offset into the new buffer.
    pub(crate) fn relocated(self, payload: NonNull<u8>, layout: MemLayout) -> Value {
        debug_assert!(!self.is_inline());
        Value {
            payload: payload.as_ptr() as usize as u64,
            descriptor: self.descriptor.with_layout(layout),
        }
    }

    /// The raw payload word
    #[inline]
    pub const fn payload(self) -> u64 {
        self.payload
    }
    /// The raw descriptor word
    #[inline]
    pub const fn descriptor(self) -> u64 {
        self.descriptor.raw_value()
    }
    /// The descriptor, split into its fields
    #[inline]
    pub const fn fields(self) -> Descriptor {
        self.descriptor
    }
    /// The payload, as a pointer
    #[inline]
    pub(crate) fn payload_ptr(self) -> *mut u8 {
        self.payload as usize as *mut u8
    }
    /// The physical type, or `None` if the type bits are corrupt
    #[inline]
    pub fn try_physical_type(self) -> Option<ValueType> {
        self.descriptor.ty().ok()
    }
    /// The memory layout, or `None` if the layout bits are corrupt
    #[inline]
    pub fn try_layout(self) -> Option<MemLayout> {
        self.descriptor.layout().ok()
    }
    /// The physical type, read directly from the descriptor
    #[inline]
    pub fn physical_type(self) -> ValueType {
        match self.try_physical_type() {
            Some(ty) => ty,
            None => invalid_descriptor(self, "type tag"),
        }
    }
    /// The type as seen by algorithms consuming the value
    ///
    /// Slices are sequences, maps are binary relations,
    /// and anything with a folded union tag is a tagged union.
    pub fn logical_type(self) -> ValueType {
        if self.tag_count() > 0 {
            return ValueType::TaggedUnion;
        }
        match self.physical_type() {
            ValueType::Slice => ValueType::Sequence,
            ValueType::Map | ValueType::LogicalMap => ValueType::BinaryRelation,
            other => other,
        }
    }
    /// Which generation of memory owns the value's block
    #[inline]
    pub fn layout(self) -> MemLayout {
        match self.try_layout() {
            Some(layout) => layout,
            None => invalid_descriptor(self, "memory layout"),
        }
    }
    /// Whether the value has no heap block
    #[inline]
    pub fn is_inline(self) -> bool {
        self.layout() == MemLayout::Inline
    }
    /// Whether the value's block lives in the speculative arena
    #[inline]
    pub fn uses_speculative_memory(self) -> bool {
        self.layout() == MemLayout::Speculative
    }
    /// The number of union tags folded into the descriptor
    #[inline]
    pub const fn tag_count(self) -> u8 {
        self.descriptor.tag_count().value()
    }
    /// The outermost folded union tag, if any
    #[inline]
    pub const fn folded_tag(self) -> Option<u16> {
        if self.tag_count() > 0 {
            Some(self.descriptor.outer_tag())
        } else {
            None
        }
    }
    fn with_tags(self, count: u8, outer: u16, inner: u16) -> Value {
        let mut descriptor = self.descriptor
            .with_tag_count(u2::new(count))
            .with_outer_tag(outer);
        // The inner tag slot of a sequence is part of its length
        if self.physical_type() == ValueType::Sequence {
            debug_assert_eq!(inner, 0);
        } else {
            descriptor = descriptor.with_inner_tag(inner);
        }
        Value { payload: self.payload, descriptor }
    }
    /// Fold a union tag into the descriptor, if there is room
    ///
    /// An untagged sequence has room for one tag,
    /// other non-slice values have room for two.
    pub(crate) fn fold_tag(self, tag: u16) -> Option<Value> {
        let count = self.tag_count();
        match self.physical_type() {
            ValueType::Slice => None,
            ValueType::Sequence => {
                if count == 0 {
                    Some(self.with_tags(1, tag, 0))
                } else {
                    None
                }
            },
            _ if count < MAX_FOLDED_TAGS => {
                let inner = if count == 1 { self.descriptor.outer_tag() } else { 0 };
                Some(self.with_tags(count + 1, tag, inner))
            },
            _ => None,
        }
    }
    /// Remove the outermost folded tag, if there is one
    pub(crate) fn unfold_tag(self) -> Option<Value> {
        match self.tag_count() {
            0 => None,
            1 => Some(self.with_tags(0, 0, 0)),
            _ => Some(self.with_tags(1, self.descriptor.inner_tag(), 0)),
        }
    }

    /// The value of an integer
    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match (self.physical_type(), self.tag_count()) {
            (ValueType::Integer, 0) => Some(self.payload as i64),
            _ => None,
        }
    }
    /// The value of a float
    #[inline]
    pub fn as_float(self) -> Option<f64> {
        match (self.physical_type(), self.tag_count()) {
            (ValueType::Float, 0) => Some(f64::from_bits(self.payload)),
            _ => None,
        }
    }
    /// The index of a symbol
    #[inline]
    pub fn as_symbol(self) -> Option<u16> {
        match (self.physical_type(), self.tag_count()) {
            (ValueType::Symbol, 0) => Some(self.descriptor.symbol()),
            _ => None,
        }
    }
    /// The value of one of the two boolean symbols
    #[inline]
    pub fn as_bool(self) -> Option<bool> {
        match self.as_symbol() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        }
    }
    /// The length of a sequence or slice
    #[inline]
    pub fn seq_len(self) -> Option<u32> {
        match self.physical_type() {
            ValueType::Sequence | ValueType::Slice => Some(self.descriptor.length().value()),
            _ => None,
        }
    }
    /// The element offset of a slice into its sequence block
    ///
    /// Zero for plain sequences.
    #[inline]
    pub fn seq_offset(self) -> Option<u32> {
        match self.physical_type() {
            ValueType::Slice => Some(self.descriptor.offset().value()),
            ValueType::Sequence => Some(0),
            _ => None,
        }
    }
    /// Check if this is the blank value
    #[inline]
    pub fn is_blank(self) -> bool {
        self.physical_type() == ValueType::Blank
    }
    /// Check if this is the null value
    #[inline]
    pub fn is_null(self) -> bool {
        self.physical_type() == ValueType::Null
    }
    /// Check if this is an (untagged) sequence or slice
    #[inline]
    pub fn is_seq(self) -> bool {
        self.logical_type() == ValueType::Sequence
    }
    /// Check if this is the untagged empty sequence
    #[inline]
    pub fn is_empty_seq(self) -> bool {
        self.is_seq() && self.is_inline()
    }
    /// Check if this is an untagged set, including the empty relation
    #[inline]
    pub fn is_set(self) -> bool {
        self.logical_type() == ValueType::Set
    }
    /// Check if this is the untagged empty relation
    #[inline]
    pub fn is_empty_rel(self) -> bool {
        self.is_set() && self.is_inline()
    }
    /// Check if this is an untagged binary relation (maps included)
    #[inline]
    pub fn is_bin_rel(self) -> bool {
        self.logical_type() == ValueType::BinaryRelation
    }
    /// Check if this is an untagged map
    #[inline]
    pub fn is_map(self) -> bool {
        self.tag_count() == 0 && self.physical_type() == ValueType::Map
    }
    /// Check if this is an untagged ternary relation
    #[inline]
    pub fn is_tern_rel(self) -> bool {
        self.logical_type() == ValueType::TernaryRelation
    }
    /// Check if this is a tagged union, folded or boxed
    #[inline]
    pub fn is_tagged(self) -> bool {
        self.logical_type() == ValueType::TaggedUnion
    }
    /// Whether both words are bit-for-bit identical
    ///
    /// For heap values this is identity, not structural equality.
    #[inline]
    pub fn shallow_eq(self, other: Value) -> bool {
        self.payload == other.payload && self.descriptor() == other.descriptor()
    }
}
impl Default for Value {
    #[inline]
    fn default() -> Self {
        Value::BLANK
    }
}
impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let d = self.descriptor();
        f.debug_struct("Value")
            .field("type", &self.try_physical_type())
            .field("layout", &self.try_layout())
            .field("tags", &self.tag_count())
            .field("payload", &format_args!("{:#018x}", self.payload))
            .field("descriptor", &format_args!(
                "{:02b} {:02b} {:04b} {:08b} {:016b} {:016b} {:016b}",
                d >> 62, (d >> 60) & 0x3, (d >> 56) & 0xF, (d >> 48) & 0xFF,
                (d >> 32) & 0xFFFF, (d >> 16) & 0xFFFF, d & 0xFFFF
            ))
            .finish()
    }
}

#[cold]
#[inline(never)]
fn invalid_descriptor(value: Value, field: &str) -> ! {
    panic!("Internal error: invalid {} in {:?}", field, value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inline_values() {
        assert_eq!(std::mem::size_of::<Value>(), 16);
        assert_eq!(Value::int(-7).as_int(), Some(-7));
        assert_eq!(Value::float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::symbol(300).as_symbol(), Some(300));
        assert_eq!(Value::bool(true).as_bool(), Some(true));
        assert!(Value::BLANK.is_blank());
        assert!(Value::null().is_null());
        for value in [Value::int(1), Value::null(), Value::empty_seq(), Value::empty_rel()] {
            assert!(value.is_inline());
            assert_eq!(value.tag_count(), 0);
        }
        assert_eq!(Value::empty_seq().seq_len(), Some(0));
        assert!(Value::empty_rel().is_set());
        assert!(Value::int(3).shallow_eq(Value::int(3)));
        assert!(!Value::int(3).shallow_eq(Value::float(3.0)));
    }

    #[test]
    fn descriptor_layout() {
        assert_eq!(Value::int(0).descriptor(), 3 << 56);
        assert_eq!(Value::symbol(0xABCD).descriptor(), (2 << 56) | 0xABCD);
        let mut buffer = [Value::BLANK; 16];
        let ptr = NonNull::from(&mut buffer[0]);
        let slice = Value::seq_view(ptr, MemLayout::Speculative, 5, 9);
        assert_eq!(slice.physical_type(), ValueType::Slice);
        assert_eq!(slice.logical_type(), ValueType::Sequence);
        assert_eq!(slice.descriptor(), (2 << 60) | (10 << 56) | (5 << 28) | 9);
        assert_eq!(slice.seq_offset(), Some(5));
        assert_eq!(slice.seq_len(), Some(9));
        let fields = slice.fields();
        assert_eq!(fields.ty().ok(), Some(ValueType::Slice));
        assert_eq!(fields.layout().ok(), Some(MemLayout::Speculative));
        assert_eq!(fields.offset(), u28::new(5));
        let seq = Value::seq_view(ptr, MemLayout::Standard, 0, 9);
        assert_eq!(seq.physical_type(), ValueType::Sequence);
        assert_eq!(seq.fields().length(), u28::new(9));
        assert_eq!(MAX_SEQ_LEN, (1 << 28) - 1);
    }

    #[test]
    fn corrupt_descriptors() {
        let bad_type = unsafe { Value::from_raw_parts(0, 15 << 56) };
        assert_eq!(bad_type.try_physical_type(), None);
        assert_eq!(bad_type.try_layout(), Some(MemLayout::Inline));
        let bad_layout = unsafe { Value::from_raw_parts(0, (3 << 60) | (3 << 56)) };
        assert_eq!(bad_layout.try_physical_type(), Some(ValueType::Integer));
        assert_eq!(bad_layout.try_layout(), None);
        // Still printable
        assert!(format!("{:?}", bad_layout).contains("Integer"));
    }

    #[test]
    #[should_panic(expected = "Internal error: invalid type tag")]
    fn corrupt_type_tag() {
        unsafe { Value::from_raw_parts(0, 13 << 56) }.physical_type();
    }

    #[test]
    fn folding_tags() {
        let ptr = NonNull::<u8>::dangling();
        let set = Value::from_block(ValueType::Set, MemLayout::Standard, ptr);
        let once = set.fold_tag(7).unwrap();
        assert_eq!(once.logical_type(), ValueType::TaggedUnion);
        assert_eq!(once.physical_type(), ValueType::Set);
        assert_eq!(once.folded_tag(), Some(7));
        let twice = once.fold_tag(9).unwrap();
        assert_eq!(twice.tag_count(), 2);
        assert_eq!(twice.folded_tag(), Some(9));
        assert!(twice.fold_tag(11).is_none());
        let back = twice.unfold_tag().unwrap();
        assert!(back.shallow_eq(once));
        assert!(back.unfold_tag().unwrap().shallow_eq(set));
        // Sequences only have room for one tag
        let seq = Value::empty_seq().fold_tag(3).unwrap();
        assert!(seq.is_inline());
        assert_eq!(seq.folded_tag(), Some(3));
        assert!(seq.fold_tag(4).is_none());
        let mut buffer = [Value::BLANK; 4];
        let buffer = NonNull::from(&mut buffer[0]);
        let long = Value::seq_view(buffer, MemLayout::Standard, 0, 3);
        let tagged = long.fold_tag(0xFFFF).unwrap();
        assert_eq!(tagged.seq_len(), Some(3));
        assert!(tagged.unfold_tag().unwrap().shallow_eq(long));
        let slice = Value::seq_view(buffer, MemLayout::Standard, 1, 1);
        assert!(slice.fold_tag(1).is_none());
        // Inline values fold too
        let tagged_int = Value::int(5).fold_tag(1).unwrap();
        assert_eq!(tagged_int.as_int(), None);
        assert_eq!(tagged_int.unfold_tag().unwrap().as_int(), Some(5));
    }

    #[test]
    fn logical_types() {
        let ptr = NonNull::<u8>::dangling();
        let map = Value::from_block(ValueType::Map, MemLayout::Standard, ptr);
        assert_eq!(map.logical_type(), ValueType::BinaryRelation);
        assert!(map.is_bin_rel() && map.is_map());
        let log_map = Value::from_block(ValueType::LogicalMap, MemLayout::Standard, ptr);
        assert_eq!(log_map.logical_type(), ValueType::BinaryRelation);
        assert!(!log_map.is_map());
    }
}
