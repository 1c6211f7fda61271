use std::panic::{catch_unwind, AssertUnwindSafe};

use relheap::{Failure, MemLayout, MemState, Value, ValueType};

mod common;
use common::{assert_no_leaks, test_heap};

fn ints(range: std::ops::Range<i64>) -> Vec<Value> {
    range.map(Value::int).collect()
}

fn as_ints(values: &[Value]) -> Vec<i64> {
    values.iter().map(|value| value.as_int().unwrap()).collect()
}

#[test]
fn commit_sequence() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..10));
    assert_eq!(seq.layout(), MemLayout::Speculative);
    assert!(seq.uses_speculative_memory());
    assert!(heap.speculative_outstanding_bytes() > 0);
    assert_eq!(heap.stats().unwrap().live_objects, 0);

    heap.enter_committing().unwrap();
    let committed = heap.copy_for_commit(seq);
    heap.finish_commit().unwrap();
    assert_eq!(heap.state(), MemState::Normal);
    assert_eq!(committed.layout(), MemLayout::Standard);
    assert_eq!(heap.speculative_outstanding_bytes(), 0);
    assert_eq!(as_ints(&heap.elements(committed)), (0..10).collect::<Vec<_>>());
    assert_eq!(heap.ref_count(committed), Some(1));

    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn sharing_is_preserved() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let shared = heap.build_set(&ints(0..3));
    heap.retain(shared);
    let pair = heap.build_seq(&[shared, shared]);
    heap.enter_committing().unwrap();
    let committed = heap.copy_for_commit(pair);
    heap.finish_commit().unwrap();

    let elems = heap.elements(committed);
    assert_eq!(elems[0].block_ptr(), elems[1].block_ptr());
    assert_eq!(elems[0].layout(), MemLayout::Standard);
    assert_eq!(heap.ref_count(elems[0]), Some(2));
    assert_eq!(heap.stats().unwrap().live_objects, 2);
    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn copying_twice_gives_the_same_block() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..4));
    heap.enter_committing().unwrap();
    let first = heap.copy_for_commit(seq);
    let second = heap.copy_for_commit(seq);
    heap.finish_commit().unwrap();
    assert_eq!(first.block_ptr(), second.block_ptr());
    assert_eq!(heap.ref_count(first), Some(2));
    heap.release_all(&[first, second]);
    assert_no_leaks(&heap);
}

#[test]
fn abort_discards_everything() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let mut values = Vec::new();
    for i in 0..1000 {
        values.push(heap.build_seq(&ints(0..(i % 50))));
    }
    // Big enough to bypass the size classes
    values.push(heap.new_set(1000));
    let _nested = heap.build_seq(&values);
    assert!(heap.speculative_outstanding_bytes() > 0);
    heap.abort_speculative().unwrap();
    assert_eq!(heap.state(), MemState::Normal);
    assert_eq!(heap.speculative_outstanding_bytes(), 0);
    assert_no_leaks(&heap);
}

#[test]
fn slices_follow_their_sequence() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..8));
    let slice = heap.slice(seq, 2, 3).unwrap();
    let both = heap.build_seq(&[seq, slice]);
    heap.enter_committing().unwrap();
    let committed = heap.copy_for_commit(both);
    heap.finish_commit().unwrap();

    let elems = heap.elements(committed);
    let (seq, slice) = (elems[0], elems[1]);
    assert_eq!(seq.physical_type(), ValueType::Sequence);
    assert_eq!(slice.physical_type(), ValueType::Slice);
    assert_eq!(seq.block_ptr(), slice.block_ptr());
    assert_eq!(slice.layout(), MemLayout::Standard);
    assert_eq!(slice.seq_offset(), Some(2));
    assert_eq!(as_ints(&heap.elements(slice)), vec![2, 3, 4]);
    assert_eq!(heap.ref_count(seq), Some(2));
    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn slice_committed_alone() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..6));
    let slice = heap.slice(seq, 4, 2).unwrap();
    heap.release(seq);
    heap.enter_committing().unwrap();
    let committed = heap.copy_for_commit(slice);
    heap.finish_commit().unwrap();
    assert_eq!(as_ints(&heap.elements(committed)), vec![4, 5]);
    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn relations_and_boxes() {
    let heap = test_heap();
    let committed = heap.speculate(|heap| {
        let map = heap.build_map(&[Value::symbol(1), Value::symbol(2)], &ints(10..12));
        heap.fill_index(map, 0, &[1, 0]);
        let tern = heap.build_tern_rel(&ints(0..1), &ints(1..2), &[heap.build_seq(&ints(0..2))]);
        heap.fill_index(tern, 1, &[0]);
        let boxed = heap.new_tag_box(7, heap.build_set(&ints(0..2)));
        Ok(heap.build_seq(&[map, tern, boxed]))
    }).unwrap();
    let elems = heap.elements(committed);
    assert!(elems.iter().all(|elem| elem.layout() == MemLayout::Standard));

    let map = elems[0];
    assert!(map.is_map());
    assert_eq!(heap.len(map), Some(2));
    // The reverse index of a map isn't carried over
    assert_eq!(heap.sort_index(map, 0), vec![u32::MAX, u32::MAX]);
    assert_eq!(as_ints(&heap.elements(map)[2..]), vec![10, 11]);

    let tern = elems[1];
    assert!(tern.is_tern_rel());
    assert_eq!(heap.sort_index(tern, 1), vec![0]);
    assert_eq!(heap.sort_index(tern, 0), vec![u32::MAX]);
    let nested = heap.elements(tern)[2];
    assert_eq!(nested.layout(), MemLayout::Standard);
    assert_eq!(as_ints(&heap.elements(nested)), vec![0, 1]);

    let boxed = elems[2];
    assert_eq!(heap.tag_index(boxed), Some(7));
    let inner = heap.untag(boxed).unwrap();
    assert_eq!(inner.layout(), MemLayout::Standard);
    assert!(inner.is_set());
    heap.release(inner);

    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn folded_tags_survive() {
    let heap = test_heap();
    let committed = heap.speculate(|heap| {
        let seq = heap.build_seq(&ints(0..3));
        Ok(heap.tag(9, seq))
    }).unwrap();
    assert_eq!(heap.tag_index(committed), Some(9));
    assert_eq!(committed.physical_type(), ValueType::Sequence);
    assert_eq!(committed.layout(), MemLayout::Standard);
    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn permanent_children_are_retained() {
    let heap = test_heap();
    let permanent = heap.build_seq(&ints(0..3));
    let committed = heap.speculate(|heap| {
        Ok(heap.build_seq(&[permanent, permanent]))
    }).unwrap();
    assert_eq!(heap.ref_count(permanent), Some(3));
    heap.release(committed);
    assert_eq!(heap.ref_count(permanent), Some(1));
    heap.release(permanent);
    assert_no_leaks(&heap);
}

#[test]
fn inline_results_pass_through() {
    let heap = test_heap();
    let result = heap.speculate(|_| Ok(Value::int(42))).unwrap();
    assert_eq!(result.as_int(), Some(42));
    let empty = heap.speculate(|_| Ok(Value::empty_seq())).unwrap();
    assert!(empty.is_empty_seq());
}

#[test]
fn deep_commit() {
    let heap = test_heap();
    let committed = heap.speculate(|heap| {
        let mut chain = heap.build_seq(&[Value::int(0)]);
        for _ in 0..100_000 {
            chain = heap.build_seq(&[chain]);
        }
        Ok(chain)
    }).unwrap();
    assert_eq!(heap.stats().unwrap().live_objects, 100_001);
    heap.release(committed);
    assert_no_leaks(&heap);
}

#[test]
fn soft_failures_abort() -> anyhow::Result<()> {
    let heap = test_heap();
    let result = heap.speculate(|heap| {
        let seq = heap.build_seq(&ints(0..5));
        heap.seq_at(seq, 5)
    });
    match result {
        Err(Failure::Soft(message)) => assert!(message.contains("Invalid sequence index")),
        other => panic!("Unexpected result: {:?}", other),
    }
    assert_eq!(heap.state(), MemState::Normal);
    assert_eq!(heap.speculative_outstanding_bytes(), 0);

    // The heap is still usable afterwards
    let ok = heap.speculate(|heap| {
        let seq = heap.build_seq(&ints(0..5));
        let slice = heap.slice(seq, 1, 3)?;
        heap.release(seq);
        Ok(slice)
    })?;
    assert_eq!(as_ints(&heap.elements(ok)), vec![1, 2, 3]);
    heap.release(ok);
    assert_no_leaks(&heap);
    Ok(())
}

#[test]
fn panics_abort() {
    let heap = test_heap();
    let result = catch_unwind(AssertUnwindSafe(|| {
        heap.speculate(|heap| {
            heap.build_seq(&ints(0..5));
            panic!("Interrupted");
        })
    }));
    assert!(result.is_err());
    assert_eq!(heap.state(), MemState::Normal);
    assert_eq!(heap.speculative_outstanding_bytes(), 0);
}

#[test]
#[should_panic(expected = "Implementation limit exceeded")]
fn nested_speculation() {
    let heap = test_heap();
    let _ = heap.speculate(|heap| heap.speculate(|_| Ok(Value::null())));
}

#[test]
fn illegal_transitions() {
    let heap = test_heap();
    assert!(heap.enter_committing().is_err());
    assert!(heap.finish_commit().is_err());
    assert!(heap.abort_speculative().is_err());
    assert!(heap.resume_speculative().is_err());
    assert_eq!(heap.state(), MemState::Normal);

    heap.enter_speculative().unwrap();
    let err = heap.enter_speculative().unwrap_err();
    assert_eq!(err.from, MemState::Speculative);
    assert!(heap.finish_commit().is_err());
    assert_eq!(heap.state(), MemState::Speculative);

    heap.enter_committing().unwrap();
    assert!(heap.abort_speculative().is_err());
    assert!(heap.enter_speculative().is_err());
    assert_eq!(heap.state(), MemState::Committing);
    heap.finish_commit().unwrap();
}

#[test]
fn resume_then_abort() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..3));
    let outer = heap.build_seq(&[seq]);
    heap.enter_committing().unwrap();
    // Copied, but the transaction carries on
    let partial = heap.copy_for_commit(outer);
    heap.resume_speculative().unwrap();
    assert_eq!(heap.state(), MemState::Speculative);
    // Forwarded blocks are left to the arena
    heap.release(outer);
    heap.abort_speculative().unwrap();
    assert_eq!(heap.speculative_outstanding_bytes(), 0);
    heap.release(partial);
    assert_no_leaks(&heap);
}

#[test]
#[should_panic(expected = "Copying for commit")]
fn copy_outside_commit() {
    let heap = test_heap();
    heap.copy_for_commit(Value::int(1));
}

#[test]
fn soft_failures_while_speculating() {
    let heap = test_heap();
    heap.enter_speculative().unwrap();
    let seq = heap.build_seq(&ints(0..3));
    let failure = heap.slice(seq, 1, 5).unwrap_err();
    assert!(failure.is_recoverable());
    assert!(heap.seq_at(Value::int(3), 0).is_err());
    heap.abort_speculative().unwrap();
}
