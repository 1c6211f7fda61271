//! Running fallible computations speculatively
use scopeguard::guard_on_unwind;
use slog::debug;

use relheap_context::{Failure, MemState};

use crate::heap::Heap;
use crate::value::Value;

impl Heap {
    /// Run `func` in the speculative state, keeping its result only if it succeeds
    ///
    /// On success the result is copied into permanent memory
    /// and the arena is released. On failure (or a panic) the arena is discarded
    /// along with everything allocated inside it.
    ///
    /// Speculative regions can't be nested. Calling this
    /// outside the [MemState::Normal] state is an implementation-limit failure.
    pub fn speculate<F>(&self, func: F) -> Result<Value, Failure>
        where F: FnOnce(&Heap) -> Result<Value, Failure> {
        if let Err(cause) = self.enter_speculative() {
            self.runtime().impl_fail(cause);
        }
        let heap = guard_on_unwind(self, |heap| {
            // Best effort, the panic is propagated regardless
            if heap.state() == MemState::Committing {
                let _ = heap.resume_speculative();
            }
            let _ = heap.abort_speculative();
        });
        match func(&heap) {
            Ok(result) => {
                heap.transition_or_fail(heap.enter_committing());
                let committed = heap.copy_for_commit(result);
                heap.transition_or_fail(heap.finish_commit());
                Ok(committed)
            },
            Err(failure) => {
                debug!(
                    heap.logger(), "Aborting speculative computation";
                    "failure" => %failure,
                );
                heap.transition_or_fail(heap.abort_speculative());
                Err(failure)
            }
        }
    }
    fn transition_or_fail(&self, result: Result<(), relheap_context::TransitionError>) {
        if let Err(cause) = result {
            self.runtime().internal_fail(cause);
        }
    }
}
