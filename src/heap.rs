//! The reference-counted heap
//!
//! Every heap block is created with an owner count of one.
//! Sharing a value means [Heap::retain]ing it, and every owner
//! eventually gives up its reference with [Heap::release].
//!
//! Only blocks of the generation currently being allocated into are counted.
//! While speculating, permanent blocks are frozen and retain/release
//! leave them alone, so an abort can't leave their counts inconsistent.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ptr::{self, NonNull};

use slog::{debug, Logger};

use relheap_alloc::{size_code, AllocStats};
use relheap_context::{
    Failure, MemState, RawBlock, Runtime, RuntimeConfig, TransitionError
};

use crate::block::{BlockKind, BlockRef, DescriptorError, RelBlock, SeqBlock, TagBox, INVALID_INDEX};
use crate::value::{MemLayout, Value, ValueType, MAX_SEQ_LEN};

/// A runtime's heap of reference-counted values
pub struct Heap {
    runtime: Runtime,
    /// Blocks whose count reached zero,
    /// waiting for their children to be released
    pending: RefCell<VecDeque<BlockRef>>,
}
impl Heap {
    /// Create a heap with the default configuration,
    /// discarding all log messages
    pub fn new() -> Heap {
        Heap::from_runtime(Runtime::new())
    }
    /// Create a heap with the specified configuration and logger
    pub fn with_config(config: RuntimeConfig, logger: Logger) -> Heap {
        Heap::from_runtime(Runtime::with_config(config, logger))
    }
    /// Create a heap on top of an existing runtime
    pub fn from_runtime(runtime: Runtime) -> Heap {
        let capacity = runtime.config().release_queue_capacity;
        Heap {
            runtime,
            pending: RefCell::new(VecDeque::with_capacity(capacity)),
        }
    }
    /// The underlying runtime
    #[inline]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
    /// The logger for this heap
    #[inline]
    pub fn logger(&self) -> &Logger {
        self.runtime.logger()
    }
    /// The current memory state
    #[inline]
    pub fn state(&self) -> MemState {
        self.runtime.state()
    }

    /*
     * State machine entry points
     */

    /// Begin a speculative computation (see [Runtime::enter_speculative])
    #[inline]
    pub fn enter_speculative(&self) -> Result<(), TransitionError> {
        self.runtime.enter_speculative()
    }
    /// Start committing (see [Runtime::enter_committing])
    #[inline]
    pub fn enter_committing(&self) -> Result<(), TransitionError> {
        self.runtime.enter_committing()
    }
    /// Return to speculating mid-commit (see [Runtime::resume_speculative])
    #[inline]
    pub fn resume_speculative(&self) -> Result<(), TransitionError> {
        self.runtime.resume_speculative()
    }
    /// Finish committing and drop the arena (see [Runtime::finish_commit])
    #[inline]
    pub fn finish_commit(&self) -> Result<(), TransitionError> {
        self.runtime.finish_commit()
    }
    /// Discard the speculative computation (see [Runtime::abort_speculative])
    #[inline]
    pub fn abort_speculative(&self) -> Result<(), TransitionError> {
        self.runtime.abort_speculative()
    }

    /*
     * Ownership
     */

    /// The block behind a heap value, or `None` for inline values
    ///
    /// A corrupt descriptor is an internal failure.
    #[inline]
    pub(crate) fn block_of(&self, value: Value) -> Option<BlockRef> {
        match BlockRef::decode(value) {
            Ok(block) => block,
            Err(cause) => self.runtime.internal_fail(cause),
        }
    }
    /// The physical type of a value, failing on a corrupt descriptor
    #[inline]
    pub(crate) fn type_of(&self, value: Value) -> ValueType {
        match value.try_physical_type() {
            Some(ty) => ty,
            None => self.runtime.internal_fail(DescriptorError::InvalidField {
                field: "type tag", value
            }),
        }
    }
    /// The block behind the value, if it is currently owner-counted
    #[inline]
    fn counted_block(&self, value: Value) -> Option<BlockRef> {
        self.block_of(value).filter(|block| self.runtime.is_refcounted(block.layout))
    }
    /// Check that a block hasn't already been destroyed
    fn check_alive(&self, block: BlockRef) {
        if block.layout == MemLayout::Standard
            && self.runtime.is_alive(block.ptr) == Some(false) {
            self.runtime.internal_fail(format_args!(
                "Block {:p} used after being freed", block.ptr
            ));
        }
        if unsafe { *block.ref_count() } == 0 {
            self.runtime.internal_fail(format_args!(
                "Block {:p} has no owners", block.ptr
            ));
        }
    }
    /// Add an owner to the value's block
    ///
    /// Does nothing for inline values and frozen blocks.
    pub fn retain(&self, value: Value) {
        if let Some(block) = self.counted_block(value) {
            if cfg!(debug_assertions) {
                self.check_alive(block);
            }
            unsafe { *block.ref_count() += 1; }
        }
    }
    /// Retain every value in the slice
    pub fn retain_all(&self, values: &[Value]) {
        for &value in values {
            self.retain(value);
        }
    }
    /// Give up an owner of the value's block,
    /// destroying it if that was the last one.
    ///
    /// Does nothing for inline values and frozen blocks.
    pub fn release(&self, value: Value) {
        let block = match self.counted_block(value) {
            Some(block) => block,
            None => return,
        };
        if cfg!(debug_assertions) {
            self.check_alive(block);
        }
        if unsafe { self.decrement(block) } {
            self.destroy_queued(block);
        }
    }
    /// Release every value in the slice
    pub fn release_all(&self, values: &[Value]) {
        for &value in values {
            self.release(value);
        }
    }
    /// Decrement the count, returning whether it reached zero
    #[inline]
    unsafe fn decrement(&self, block: BlockRef) -> bool {
        let count = block.ref_count();
        debug_assert!(*count >= 1, "Block {:p} has no owners", block.ptr);
        *count -= 1;
        *count == 0
    }
    /// Destroy a block along with every child it held the last reference to
    ///
    /// Children are queued instead of being destroyed recursively,
    /// so arbitrarily deep values can't overflow the stack.
    fn destroy_queued(&self, block: BlockRef) {
        let mut pending = self.pending.borrow_mut();
        debug_assert!(pending.is_empty());
        pending.push_back(block);
        while let Some(block) = pending.pop_front() {
            unsafe { self.destroy(block, &mut pending) };
        }
    }
    unsafe fn destroy(&self, block: BlockRef, pending: &mut VecDeque<BlockRef>) {
        if block.forwarded().is_some() {
            // Already migrated, the arena reclaims the storage in bulk
            return;
        }
        let (children, count) = block.children();
        for index in 0..count {
            let child = children.as_ptr().add(index).read();
            if let Some(child_block) = self.counted_block(child) {
                if self.decrement(child_block) {
                    pending.push_back(child_block);
                }
            }
        }
        self.runtime.free_block(block.ptr, block.mem_size(), block.layout);
    }
    /// The owner count of the value's block
    ///
    /// Intended for debugging and tests.
    pub fn ref_count(&self, value: Value) -> Option<u32> {
        self.block_of(value).map(|block| unsafe { *block.ref_count() })
    }

    /*
     * Typed constructors
     */

    fn alloc(&self, size: usize) -> RawBlock {
        self.runtime.alloc_block(size)
    }
    /// Allocate a sequence of `len` blank elements, owned by the caller
    ///
    /// The block may have spare capacity for [Heap::append].
    /// Zero-length sequences are inline.
    pub fn new_seq(&self, len: u32) -> Value {
        if len == 0 {
            return Value::empty_seq();
        }
        if len > MAX_SEQ_LEN {
            self.runtime.impl_fail(format_args!("Sequence length {} is too large", len));
        }
        let raw = self.alloc(SeqBlock::mem_size(len));
        let seq = raw.ptr.cast::<SeqBlock>();
        unsafe {
            seq.as_ptr().write(SeqBlock::new(SeqBlock::capacity_for(raw.usable_size), len));
            let buffer = SeqBlock::buffer(seq);
            fill_blank(buffer, len as usize);
            Value::seq_view(buffer, raw.layout, 0, len)
        }
    }
    fn new_rel(&self, ty: ValueType, size: u32) -> Value {
        if size == 0 {
            return Value::empty_rel();
        }
        let kind = match BlockKind::of(ty) {
            Some(kind) => kind,
            None => self.runtime.internal_fail(format_args!("{:?} is not a relation", ty)),
        };
        let raw = self.alloc(kind.rel_mem_size(size));
        let rel = raw.ptr.cast::<RelBlock>();
        unsafe {
            rel.as_ptr().write(RelBlock { ref_count: 1, size });
            fill_blank(RelBlock::buffer(rel), size as usize * kind.columns());
            let block = BlockRef { ptr: raw.ptr, kind, layout: raw.layout };
            let (indexes, len) = block.sort_indexes();
            for index in 0..len {
                indexes.as_ptr().add(index).write(INVALID_INDEX);
            }
        }
        Value::from_block(ty, raw.layout, raw.ptr)
    }
    /// Allocate a set with `size` blank elements
    pub fn new_set(&self, size: u32) -> Value {
        self.new_rel(ValueType::Set, size)
    }
    /// Allocate a binary relation with `size` blank rows
    ///
    /// The reverse index starts out unbuilt ([INVALID_INDEX]).
    pub fn new_bin_rel(&self, size: u32) -> Value {
        self.new_rel(ValueType::BinaryRelation, size)
    }
    /// Allocate a map with `size` blank entries
    ///
    /// Maps are looked up by key, so their reverse index is never built.
    pub fn new_map(&self, size: u32) -> Value {
        self.new_rel(ValueType::Map, size)
    }
    /// Allocate a logical map with `size` blank rows
    pub fn new_log_map(&self, size: u32) -> Value {
        self.new_rel(ValueType::LogicalMap, size)
    }
    /// Allocate a ternary relation with `size` blank rows
    pub fn new_tern_rel(&self, size: u32) -> Value {
        self.new_rel(ValueType::TernaryRelation, size)
    }
    /// Box a tagged value, taking ownership of `value`
    pub fn new_tag_box(&self, tag: u16, value: Value) -> Value {
        let raw = self.alloc(std::mem::size_of::<TagBox>());
        unsafe {
            raw.ptr.cast::<TagBox>().as_ptr().write(TagBox {
                ref_count: 1, tag, copied: 0, value
            });
        }
        Value::from_block(ValueType::TaggedUnion, raw.layout, raw.ptr)
    }

    /*
     * Building
     */

    /// The block behind a freshly constructed value, which the caller may still fill in
    fn writable_block(&self, target: Value) -> BlockRef {
        match self.block_of(target) {
            Some(block) if block.layout == self.runtime.allocation_layout() => {
                debug_assert_eq!(
                    unsafe { *block.ref_count() }, 1,
                    "Writing into shared block {:p}", block.ptr
                );
                block
            },
            _ => self.runtime.internal_fail(format_args!(
                "Can't write into {:?}", target
            )),
        }
    }
    /// Store `elem` in slot `index` of a freshly constructed block,
    /// taking ownership of `elem` and releasing the previous occupant.
    ///
    /// Relation slots are numbered column by column.
    pub fn fill(&self, target: Value, index: usize, elem: Value) {
        let block = self.writable_block(target);
        let old = unsafe {
            let (children, count) = block.children();
            if index >= count {
                self.runtime.internal_fail(format_args!(
                    "Slot {} out of bounds for {} slots", index, count
                ));
            }
            children.as_ptr().add(index).replace(elem)
        };
        self.release(old);
    }
    /// Overwrite sort index number `which` of a freshly constructed relation
    pub fn fill_index(&self, target: Value, which: usize, entries: &[u32]) {
        let block = self.writable_block(target);
        if which >= block.kind.indexes() {
            self.runtime.internal_fail(format_args!("No index {} in {:?}", which, block.kind));
        }
        unsafe {
            let (indexes, len) = block.sort_indexes();
            let row_count = len / block.kind.indexes();
            if entries.len() != row_count {
                self.runtime.internal_fail(format_args!(
                    "Index of {} entries for {} rows", entries.len(), row_count
                ));
            }
            ptr::copy_nonoverlapping(
                entries.as_ptr(),
                indexes.as_ptr().add(which * row_count),
                row_count
            );
        }
    }
    /// A copy of sort index number `which` of a relation
    pub fn sort_index(&self, rel: Value, which: usize) -> Vec<u32> {
        match self.block_of(rel) {
            Some(block) if which < block.kind.indexes() => unsafe {
                let (indexes, len) = block.sort_indexes();
                let row_count = len / block.kind.indexes();
                std::slice::from_raw_parts(indexes.as_ptr().add(which * row_count), row_count)
                    .to_vec()
            },
            _ => Vec::new(),
        }
    }
    fn build_from_columns(&self, target: Value, columns: &[&[Value]]) -> Value {
        if let Some(block) = self.block_of(target) {
            unsafe {
                let (children, _) = block.children();
                let mut dest = children.as_ptr();
                for column in columns {
                    // Overwrites blank values, nothing to release
                    ptr::copy_nonoverlapping(column.as_ptr(), dest, column.len());
                    dest = dest.add(column.len());
                }
            }
        }
        target
    }
    /// The shared length of a relation's columns
    fn column_len(&self, columns: &[&[Value]]) -> u32 {
        let len = columns.first().map_or(0, |column| column.len());
        if let Some(other) = columns.iter().find(|column| column.len() != len) {
            self.runtime.internal_fail(format_args!(
                "Mismatched column lengths {} and {}", len, other.len()
            ));
        }
        self.checked_len(len)
    }
    fn checked_len(&self, len: usize) -> u32 {
        match u32::try_from(len) {
            Ok(len) => len,
            Err(_) => self.runtime.impl_fail(format_args!("Collection of {} elements is too large", len)),
        }
    }
    /// Build a sequence, taking ownership of the elements
    pub fn build_seq(&self, elems: &[Value]) -> Value {
        let seq = self.new_seq(self.checked_len(elems.len()));
        if !elems.is_empty() {
            unsafe {
                ptr::copy_nonoverlapping(elems.as_ptr(), seq.payload_ptr().cast::<Value>(), elems.len());
            }
        }
        seq
    }
    /// Build a set, taking ownership of the elements
    ///
    /// The elements must already be sorted and unique.
    pub fn build_set(&self, elems: &[Value]) -> Value {
        let set = self.new_set(self.checked_len(elems.len()));
        self.build_from_columns(set, &[elems])
    }
    /// Build a binary relation from its two columns, taking ownership of the values
    ///
    /// Rows must already be sorted and unique.
    pub fn build_bin_rel(&self, left: &[Value], right: &[Value]) -> Value {
        let rel = self.new_bin_rel(self.column_len(&[left, right]));
        self.build_from_columns(rel, &[left, right])
    }
    /// Build a map from its keys and values, taking ownership of both
    ///
    /// Keys must already be sorted and unique.
    pub fn build_map(&self, keys: &[Value], values: &[Value]) -> Value {
        let map = self.new_map(self.column_len(&[keys, values]));
        self.build_from_columns(map, &[keys, values])
    }
    /// Build a ternary relation from its three columns, taking ownership of the values
    pub fn build_tern_rel(&self, col1: &[Value], col2: &[Value], col3: &[Value]) -> Value {
        let rel = self.new_tern_rel(self.column_len(&[col1, col2, col3]));
        self.build_from_columns(rel, &[col1, col2, col3])
    }

    /*
     * Reading
     */

    /// The number of elements (or rows) of a collection
    pub fn len(&self, value: Value) -> Option<u32> {
        if value.tag_count() > 0 {
            return None;
        }
        match self.type_of(value) {
            ValueType::Sequence | ValueType::Slice => value.seq_len(),
            ValueType::Set | ValueType::BinaryRelation | ValueType::TernaryRelation
                | ValueType::Map | ValueType::LogicalMap => {
                Some(match self.block_of(value) {
                    Some(block) => unsafe { (*block.as_rel().as_ptr()).size },
                    None => 0,
                })
            },
            _ => None,
        }
    }
    /// The values visible through a heap value, without retaining them
    ///
    /// Sequences give their elements, relations give every column
    /// one after another, and boxes give their wrapped value.
    pub fn elements(&self, value: Value) -> Vec<Value> {
        let block = match self.block_of(value) {
            Some(block) => block,
            None => return Vec::new(),
        };
        unsafe {
            let (start, count) = match block.kind {
                BlockKind::Sequence => (
                    value.payload_ptr().cast::<Value>() as *const Value,
                    value.seq_len().unwrap_or(0) as usize
                ),
                _ => {
                    let (children, count) = block.children();
                    (children.as_ptr() as *const Value, count)
                }
            };
            std::slice::from_raw_parts(start, count).to_vec()
        }
    }
    /// The element of a sequence at the specified index, without retaining it
    ///
    /// An invalid index is a soft failure.
    pub fn seq_at(&self, seq: Value, index: i64) -> Result<Value, Failure> {
        let len = match seq.seq_len() {
            Some(len) if seq.tag_count() == 0 => len,
            _ => return Err(self.runtime.soft_fail(format_args!("Not a sequence: {:?}", seq))),
        };
        if index < 0 || index >= len as i64 {
            return Err(self.runtime.soft_fail(format_args!(
                "Invalid sequence index {} (length {})", index, len
            )));
        }
        Ok(unsafe { seq.payload_ptr().cast::<Value>().add(index as usize).read() })
    }
    /// The number of elements the sequence block can hold without moving
    pub fn seq_capacity(&self, seq: Value) -> Option<u32> {
        match self.block_of(seq) {
            Some(block) if block.kind == BlockKind::Sequence => unsafe {
                Some((*block.as_seq().as_ptr()).capacity)
            },
            _ => None,
        }
    }

    /*
     * Sequence operations
     */

    /// A subsequence of `len` elements starting at `start`, owned by the caller
    ///
    /// Shares the block of `seq` rather than copying it.
    /// Invalid bounds are a soft failure.
    pub fn slice(&self, seq: Value, start: u32, len: u32) -> Result<Value, Failure> {
        let seq_len = match seq.seq_len() {
            Some(seq_len) if seq.tag_count() == 0 => seq_len,
            _ => return Err(self.runtime.soft_fail(format_args!("Not a sequence: {:?}", seq))),
        };
        if start as u64 + len as u64 > seq_len as u64 {
            return Err(self.runtime.soft_fail(format_args!(
                "Invalid slice {}..{} of sequence with length {}",
                start, start as u64 + len as u64, seq_len
            )));
        }
        if len == 0 {
            return Ok(Value::empty_seq());
        }
        let block = match self.block_of(seq) {
            Some(block) => block,
            None => self.runtime.internal_fail("Nonempty inline sequence"),
        };
        self.retain(seq);
        let offset = seq.seq_offset().unwrap_or(0) + start;
        Ok(Value::seq_view(unsafe { SeqBlock::buffer(block.as_seq()) }, block.layout, offset, len))
    }
    /// Append an element, taking ownership of both `seq` and `elem`
    ///
    /// If the sequence ends at the last element of its block and the block
    /// has spare capacity, the block is extended in place. Otherwise the
    /// elements are copied into a new block.
    pub fn append(&self, seq: Value, elem: Value) -> Value {
        if seq.is_empty_seq() {
            return self.build_seq(&[elem]);
        }
        let len = match seq.seq_len() {
            Some(len) if seq.is_seq() => len,
            _ => self.runtime.internal_fail(format_args!("Appending to {:?}", seq)),
        };
        if len >= MAX_SEQ_LEN {
            self.runtime.impl_fail("Resulting sequence is too large");
        }
        let block = match self.block_of(seq) {
            Some(block) => block,
            None => self.runtime.internal_fail("Nonempty inline sequence"),
        };
        let offset = seq.seq_offset().unwrap_or(0);
        unsafe {
            let header = block.as_seq().as_ptr();
            let buffer = SeqBlock::buffer(block.as_seq());
            let extensible = self.runtime.is_refcounted(block.layout)
                && offset + len == (*header).size
                && (*header).size < (*header).capacity;
            if extensible {
                buffer.as_ptr().add((*header).size as usize).write(elem);
                (*header).size += 1;
                // The new value inherits the reference held by `seq`
                return Value::seq_view(buffer, block.layout, offset, len + 1);
            }
            let result = self.new_seq(len + 1);
            let dest = result.payload_ptr().cast::<Value>();
            ptr::copy_nonoverlapping(buffer.as_ptr().add(offset as usize), dest, len as usize);
            self.retain_all(std::slice::from_raw_parts(dest, len as usize));
            dest.add(len as usize).write(elem);
            self.release(seq);
            result
        }
    }

    /*
     * Tagged unions
     */

    /// Attach a union tag, taking ownership of `value`
    ///
    /// The tag is folded into the descriptor when there is room,
    /// otherwise the value is boxed.
    pub fn tag(&self, tag: u16, value: Value) -> Value {
        match value.fold_tag(tag) {
            Some(folded) => folded,
            None => self.new_tag_box(tag, value),
        }
    }
    /// Remove the outermost union tag
    ///
    /// A folded tag is stripped from the descriptor, so the result is the
    /// same reference as `value` and carries the caller's ownership over.
    /// A boxed value is retained and returned as a new reference,
    /// while the caller keeps owning the box.
    ///
    /// Returns `None` if the value isn't tagged.
    pub fn untag(&self, value: Value) -> Option<Value> {
        if let Some(unfolded) = value.unfold_tag() {
            return Some(unfolded);
        }
        if self.type_of(value) != ValueType::TaggedUnion {
            return None;
        }
        let block = self.block_of(value)?;
        let inner = unsafe { (*block.as_tag_box().as_ptr()).value };
        self.retain(inner);
        Some(inner)
    }
    /// The outermost union tag, if the value is tagged
    pub fn tag_index(&self, value: Value) -> Option<u16> {
        if let Some(tag) = value.folded_tag() {
            return Some(tag);
        }
        match self.type_of(value) {
            ValueType::TaggedUnion => {
                let block = self.block_of(value)?;
                Some(unsafe { (*block.as_tag_box().as_ptr()).tag })
            },
            _ => None,
        }
    }

    /*
     * Set operations
     */

    /// Truncate a freshly built set to its first `new_size` elements,
    /// releasing the rest.
    ///
    /// The block is reused when the smaller set still needs the same size class.
    pub fn shrink_set(&self, set: Value, new_size: u32) -> Value {
        let block = self.writable_block(set);
        if block.kind != BlockKind::Set {
            self.runtime.internal_fail(format_args!("Shrinking {:?} as a set", set));
        }
        let header = block.as_rel().as_ptr();
        let size = unsafe { (*header).size };
        if new_size > size {
            self.runtime.internal_fail(format_args!(
                "Can't grow a set from {} to {}", size, new_size
            ));
        }
        if new_size == size {
            return set;
        }
        unsafe {
            let buffer = RelBlock::buffer(block.as_rel()).as_ptr();
            let removed = std::slice::from_raw_parts(
                buffer.add(new_size as usize),
                (size - new_size) as usize
            ).to_vec();
            self.release_all(&removed);
            let old_bytes = block.kind.rel_mem_size(size);
            let new_bytes = block.kind.rel_mem_size(new_size);
            if new_size == 0 {
                self.runtime.free_block(block.ptr, old_bytes, block.layout);
                return Value::empty_rel();
            }
            if size_code(old_bytes).ok() == size_code(new_bytes).ok() {
                (*header).size = new_size;
                return set;
            }
            let shrunk = self.new_set(new_size);
            let dest = self.block_of(shrunk).map(|b| RelBlock::buffer(b.as_rel()));
            if let Some(dest) = dest {
                ptr::copy_nonoverlapping(buffer, dest.as_ptr(), new_size as usize);
            }
            self.runtime.free_block(block.ptr, old_bytes, block.layout);
            shrunk
        }
    }

    /*
     * Raw buffers
     */

    /// Allocate `size` bytes of scratch memory from the active allocator
    pub fn alloc_raw(&self, size: usize) -> RawBlock {
        self.alloc(size)
    }
    /// Free scratch memory from [Heap::alloc_raw]
    ///
    /// ## Safety
    /// The size must be the one originally requested,
    /// and the memory must not be used again.
    pub unsafe fn free_raw(&self, block: RawBlock, size: usize) {
        self.runtime.free_block(block.ptr, size, block.layout)
    }
    /// Move scratch memory into a block of `new_size` bytes,
    /// keeping the common prefix.
    ///
    /// ## Safety
    /// Same requirements as [Heap::free_raw] for the old block.
    pub unsafe fn resize_raw(&self, block: RawBlock, old_size: usize, new_size: usize) -> RawBlock {
        if size_code(old_size).ok() == size_code(new_size).ok()
            && block.layout == self.runtime.allocation_layout() {
            return block;
        }
        let resized = self.alloc(new_size);
        ptr::copy_nonoverlapping(
            block.ptr.as_ptr(),
            resized.ptr.as_ptr(),
            old_size.min(new_size)
        );
        self.free_raw(block, old_size);
        resized
    }

    /*
     * Debug introspection
     */

    /// Permanent allocation counters, if tracking is enabled
    #[inline]
    pub fn stats(&self) -> Option<AllocStats> {
        self.runtime.stats()
    }
    /// Whether the value's permanent block is still live, if tracking is enabled
    ///
    /// Inline values are always alive.
    pub fn is_alive(&self, value: Value) -> Option<bool> {
        match self.block_of(value) {
            Some(block) if block.layout == MemLayout::Standard => self.runtime.is_alive(block.ptr),
            Some(_) => None,
            None => Some(true),
        }
    }
    /// Every live permanent block and its size, if tracking is enabled
    pub fn live_blocks(&self) -> Option<Vec<(NonNull<u8>, usize)>> {
        self.runtime.live_blocks()
    }
    /// Log every live permanent block at debug level
    pub fn log_live_blocks(&self) {
        match self.runtime.live_blocks() {
            Some(blocks) => {
                debug!(self.logger(), "Live blocks"; "count" => blocks.len());
                for (ptr, size) in blocks {
                    let count = unsafe { *ptr.as_ptr().cast::<u32>() };
                    debug!(
                        self.logger(), "Live block";
                        "ptr" => ?ptr, "size" => size, "owners" => count,
                    );
                }
            },
            None => debug!(self.logger(), "Allocation tracking is disabled"),
        }
    }
    /// The bytes currently held by the speculative arena
    #[inline]
    pub fn speculative_outstanding_bytes(&self) -> usize {
        self.runtime.speculative_outstanding_bytes()
    }
}
impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

#[inline]
unsafe fn fill_blank(start: NonNull<Value>, count: usize) {
    for index in 0..count {
        start.as_ptr().add(index).write(Value::BLANK);
    }
}
