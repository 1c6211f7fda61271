//! The value representation and memory core of a relational runtime.
//!
//! ## Values
//! A [Value] is a 16-byte tagged word pair. Scalars (symbols, integers, floats)
//! and empty collections are stored inline. Everything else points at a
//! reference-counted heap block.
//!
//! ## Ownership
//! Ownership is explicit: constructors return a value owned once,
//! [Heap::retain] adds an owner and [Heap::release] drops one.
//! Destroying a block never recurses, so arbitrarily deep values are fine.
//!
//! ## Transactions
//! A computation that may fail can run speculatively
//! (see [Heap::speculate]). Its blocks come from a disposable arena.
//! Aborting throws the whole arena away at once, while committing
//! copies the result into permanent memory first ([Heap::copy_for_commit]).
//!
//! ```
//! use relheap::{Heap, Value};
//!
//! let heap = Heap::new();
//! let committed = heap.speculate(|heap| {
//!     let elems: Vec<Value> = (0..10).map(Value::int).collect();
//!     Ok(heap.build_seq(&elems))
//! }).unwrap();
//! assert_eq!(heap.len(committed), Some(10));
//! heap.release(committed);
//! ```

pub mod block;
mod copy;
pub mod heap;
mod transaction;
pub mod value;

pub use self::heap::Heap;
pub use self::value::{Descriptor, MemLayout, Value, ValueType};
pub use relheap_context::{
    Failure, MemState, Runtime, RuntimeConfig, TransitionError
};
pub use relheap_alloc::AllocStats;
