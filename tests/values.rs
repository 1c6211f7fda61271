use relheap::{Heap, MemLayout, RuntimeConfig, Value, ValueType};

mod common;
use common::test_heap;

#[test]
fn scalars() {
    assert_eq!(Value::int(-7).as_int(), Some(-7));
    assert_eq!(Value::float(0.25).as_float(), Some(0.25));
    assert_eq!(Value::symbol(300).as_symbol(), Some(300));
    assert_eq!(Value::bool(true).as_bool(), Some(true));
    assert_eq!(Value::bool(false).as_bool(), Some(false));
    assert_eq!(Value::int(1).as_float(), None);
    assert!(Value::null().is_null());
    assert!(Value::BLANK.is_blank());
    assert!(Value::default().is_blank());
    for value in [Value::int(1), Value::symbol(1), Value::empty_seq(), Value::empty_rel()] {
        assert!(value.is_inline());
        assert_eq!(value.layout(), MemLayout::Inline);
        assert!(!value.uses_speculative_memory());
    }
    assert!(Value::int(5).shallow_eq(Value::int(5)));
    assert!(!Value::int(5).shallow_eq(Value::symbol(5)));
}

#[test]
fn heap_value_types() {
    let heap = test_heap();
    let values = [
        (heap.build_seq(&[Value::int(1)]), ValueType::Sequence),
        (heap.build_set(&[Value::int(1)]), ValueType::Set),
        (heap.build_bin_rel(&[Value::int(1)], &[Value::int(2)]), ValueType::BinaryRelation),
        (heap.build_map(&[Value::int(1)], &[Value::int(2)]), ValueType::Map),
        (heap.new_log_map(1), ValueType::LogicalMap),
        (heap.build_tern_rel(&[Value::int(1)], &[Value::int(2)], &[Value::int(3)]), ValueType::TernaryRelation),
        (heap.new_tag_box(1, Value::null()), ValueType::TaggedUnion),
    ];
    for &(value, ty) in &values {
        assert_eq!(value.physical_type(), ty, "{:?}", value);
        assert_eq!(value.layout(), MemLayout::Standard);
        assert!(!value.is_inline());
    }
    assert!(values[1].0.is_set());
    assert!(values[2].0.is_bin_rel());
    assert!(values[3].0.is_map());
    assert!(values[5].0.is_tern_rel());
    assert!(values[6].0.is_tagged());
    for (value, _) in values {
        heap.release(value);
    }
}

#[test]
fn tagging_inline_values() {
    let heap = Heap::new();
    let once = heap.tag(4, Value::int(3));
    assert_eq!(once.physical_type(), ValueType::Integer);
    assert_eq!(once.logical_type(), ValueType::TaggedUnion);
    assert_eq!(once.tag_count(), 1);
    // Tagged values aren't plain integers anymore
    assert_eq!(once.as_int(), None);
    let twice = heap.tag(5, once);
    assert!(twice.is_inline());
    assert_eq!(heap.tag_index(twice), Some(5));
    let boxed = heap.tag(6, twice);
    assert!(!boxed.is_inline());
    assert_eq!(boxed.physical_type(), ValueType::TaggedUnion);

    let unboxed = heap.untag(boxed).unwrap();
    assert!(unboxed.shallow_eq(twice));
    let unfolded = heap.untag(unboxed).unwrap();
    assert_eq!(heap.tag_index(unfolded), Some(4));
    let plain = heap.untag(unfolded).unwrap();
    assert_eq!(plain.as_int(), Some(3));
    heap.release(boxed);

    let empty = heap.tag(1, Value::empty_seq());
    assert!(empty.is_inline());
    assert!(!empty.is_empty_seq());
    assert_eq!(heap.untag(empty).map(Value::is_empty_seq), Some(true));
}

#[test]
fn debug_output() {
    let heap = Heap::new();
    let seq = heap.build_seq(&[Value::int(1), Value::int(2)]);
    let text = format!("{:?}", seq);
    assert!(text.contains("Sequence"), "{}", text);
    assert!(format!("{:?}", Value::int(17)).contains("Integer"));
    heap.release(seq);
}

#[test]
fn sequence_reads() {
    let heap = Heap::new();
    let seq = heap.build_seq(&[Value::int(1), Value::symbol(2)]);
    assert_eq!(heap.len(seq), Some(2));
    assert_eq!(heap.seq_at(seq, 1).unwrap().as_symbol(), Some(2));
    assert_eq!(heap.len(Value::empty_seq()), Some(0));
    assert_eq!(heap.len(Value::empty_rel()), Some(0));
    assert_eq!(heap.len(Value::int(3)), None);
    assert!(heap.elements(Value::empty_seq()).is_empty());
    heap.release(seq);
}

#[test]
fn default_config() {
    let config = RuntimeConfig::default();
    assert_eq!(config.region_pages, 16);
    assert_eq!(config.release_queue_capacity, 1024);
}

#[cfg(feature = "serde1")]
#[test]
fn config_from_json() -> anyhow::Result<()> {
    let config: RuntimeConfig = serde_json::from_str(r#"{ "region_pages": 4, "poison_freed": true }"#)?;
    assert_eq!(config.region_pages, 4);
    assert!(config.poison_freed);
    assert_eq!(config.release_queue_capacity, 1024);
    let text = serde_json::to_string(&config)?;
    let reparsed: RuntimeConfig = serde_json::from_str(&text)?;
    assert_eq!(reparsed, config);
    Ok(())
}
