//! Migrating the survivors of a speculative computation into permanent memory
//!
//! Each speculative block is copied at most once.
//! The first copy overwrites the original with a forwarding pointer,
//! and later references to the original resolve to the same copy.
//! This preserves any sharing that existed inside the arena.
use std::mem::size_of;
use std::ptr::{self, NonNull};

use slog::trace;

use crate::block::{BlockKind, BlockRef, RelBlock, SeqBlock, TagBox, INVALID_INDEX};
use crate::heap::Heap;
use crate::value::{MemLayout, Value, ValueType};
use relheap_context::MemState;

impl Heap {
    /// Migrate a value (and everything reachable from it) out of the speculative arena,
    /// returning a new owned reference in permanent memory.
    ///
    /// Inline values are returned unchanged. Permanent values are retained
    /// and returned unchanged. Only legal while committing.
    pub fn copy_for_commit(&self, value: Value) -> Value {
        if self.state() != MemState::Committing {
            self.runtime().internal_fail(format_args!(
                "Copying for commit in {:?} state", self.state()
            ));
        }
        /*
         * Slots of permanent copies still holding speculative values.
         * Copying a block only copies its children shallowly,
         * the slots are then fixed up from this stack.
         */
        let mut fixups: Vec<NonNull<Value>> = Vec::new();
        let mut copied = 0usize;
        let result = self.migrate(value, &mut fixups, &mut copied);
        while let Some(slot) = fixups.pop() {
            unsafe {
                let migrated = self.migrate(slot.as_ptr().read(), &mut fixups, &mut copied);
                slot.as_ptr().write(migrated);
            }
        }
        if copied > 0 {
            trace!(
                self.logger(), "Copied for commit";
                "blocks" => copied,
                "result" => ?result,
            );
        }
        result
    }
    fn migrate(&self, value: Value, fixups: &mut Vec<NonNull<Value>>, copied: &mut usize) -> Value {
        let block = match self.block_of(value) {
            Some(block) => block,
            None => return value,
        };
        if block.layout != MemLayout::Speculative {
            self.retain(value);
            return value;
        }
        let copy = unsafe {
            match block.forwarded() {
                Some(copy) => {
                    *copy.cast::<u32>().as_ptr() += 1;
                    copy
                },
                None => {
                    *copied += 1;
                    self.copy_block(block, self.type_of(value), fixups)
                },
            }
        };
        unsafe {
            let payload = match block.kind {
                BlockKind::Sequence => {
                    let offset = value.seq_offset().unwrap_or(0) as usize;
                    SeqBlock::buffer(copy.cast()).as_ptr().add(offset).cast::<u8>()
                },
                _ => copy.as_ptr(),
            };
            value.relocated(NonNull::new_unchecked(payload), MemLayout::Standard)
        }
    }
    /// Shallowly copy a block into permanent memory and forward the original to it
    ///
    /// The copy starts out owned once. Slots of the copy holding heap values
    /// are pushed onto `fixups`.
    unsafe fn copy_block(
        &self, block: BlockRef, ty: ValueType,
        fixups: &mut Vec<NonNull<Value>>
    ) -> NonNull<u8> {
        let copy = match block.kind {
            BlockKind::Sequence => {
                let original = block.as_seq();
                // Only the initialized prefix survives, spare capacity isn't copied
                let size = (*original.as_ptr()).size;
                let raw = self.runtime().alloc_block(SeqBlock::mem_size(size));
                let seq = raw.ptr.cast::<SeqBlock>();
                seq.as_ptr().write(SeqBlock::new(SeqBlock::capacity_for(raw.usable_size), size));
                ptr::copy_nonoverlapping(
                    SeqBlock::buffer(original).as_ptr(),
                    SeqBlock::buffer(seq).as_ptr(),
                    size as usize
                );
                raw.ptr
            },
            BlockKind::Set | BlockKind::BinaryRelation | BlockKind::TernaryRelation => {
                let size = (*block.as_rel().as_ptr()).size;
                let mem_size = block.kind.rel_mem_size(size);
                let raw = self.runtime().alloc_block(mem_size);
                raw.ptr.cast::<RelBlock>().as_ptr().write(RelBlock { ref_count: 1, size });
                // Columns and sort indexes together
                ptr::copy_nonoverlapping(
                    block.ptr.as_ptr().add(size_of::<RelBlock>()),
                    raw.ptr.as_ptr().add(size_of::<RelBlock>()),
                    mem_size - size_of::<RelBlock>()
                );
                raw.ptr
            },
            BlockKind::TagBox => {
                let original = &*block.as_tag_box().as_ptr();
                let raw = self.runtime().alloc_block(size_of::<TagBox>());
                raw.ptr.cast::<TagBox>().as_ptr().write(TagBox {
                    ref_count: 1,
                    tag: original.tag,
                    copied: 0,
                    value: original.value,
                });
                raw.ptr
            },
        };
        let new_block = BlockRef { ptr: copy, kind: block.kind, layout: MemLayout::Standard };
        if ty == ValueType::Map {
            // Maps are looked up by key, so the copy starts without a reverse index
            let (indexes, len) = new_block.sort_indexes();
            for index in 0..len {
                indexes.as_ptr().add(index).write(INVALID_INDEX);
            }
        }
        let (children, count) = new_block.children();
        for index in 0..count {
            let slot = NonNull::new_unchecked(children.as_ptr().add(index));
            if !slot.as_ptr().read().is_inline() {
                fixups.push(slot);
            }
        }
        block.install_forwarding(copy);
        copy
    }
}
