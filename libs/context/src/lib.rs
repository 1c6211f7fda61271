#![allow(
    clippy::missing_safety_doc, // Entirely internal code
)]
//! The runtime context shared by every relheap operation.
//!
//! A [Runtime] owns the two allocator instances
//! (permanent memory and the speculative arena),
//! the current [MemState] and the logger.
//! It is passed explicitly to everything that allocates,
//! so there is no process-wide allocator state.
//!
//! The runtime is single-threaded (`!Send`).
//! Multiple threads need one runtime each,
//! and values must never cross between runtimes.

use std::cell::Cell;
use std::fmt::{self, Debug, Formatter};
use std::ptr::NonNull;

use once_cell::unsync::OnceCell;
use slog::{debug, o, trace, warn, Logger};

use relheap_alloc::{AllocStats, AllocationError, SlabAllocator};

pub mod config;
pub mod errors;
pub mod state;
pub mod utils;

pub use crate::config::RuntimeConfig;
pub use crate::errors::Failure;
pub use crate::state::{MemLayout, MemState, Transition, TransitionError};
use crate::utils::MemorySize;

/// A block of memory freshly handed out by the runtime
#[derive(Copy, Clone, Debug)]
pub struct RawBlock {
    /// The start of the block
    pub ptr: NonNull<u8>,
    /// The number of usable bytes, at least the requested size
    pub usable_size: usize,
    /// The allocator the block came from
    pub layout: MemLayout,
}

/// The context of a single runtime
pub struct Runtime {
    permanent: SlabAllocator,
    /// Created the first time a speculative region is entered
    speculative: OnceCell<SlabAllocator>,
    state: Cell<MemState>,
    config: RuntimeConfig,
    logger: Logger,
}
impl Runtime {
    /// Create a runtime with the default configuration,
    /// discarding all log messages
    pub fn new() -> Runtime {
        Runtime::with_config(
            RuntimeConfig::default(),
            Logger::root(slog::Discard, o!())
        )
    }
    /// Create a runtime with the specified configuration and logger
    pub fn with_config(config: RuntimeConfig, logger: Logger) -> Runtime {
        let logger = logger.new(o!("runtime" => "relheap"));
        trace!(logger, "Initializing runtime"; "config" => ?config);
        Runtime {
            permanent: SlabAllocator::new("permanent", config.permanent_slab(), &logger),
            speculative: OnceCell::new(),
            state: Cell::new(MemState::Normal),
            config, logger
        }
    }
    /// The logger for this runtime
    #[inline]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }
    /// The configuration this runtime was created with
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
    /// The current memory state
    #[inline]
    pub fn state(&self) -> MemState {
        self.state.get()
    }
    /// The layout of newly allocated blocks
    #[inline]
    pub fn allocation_layout(&self) -> MemLayout {
        self.state.get().allocation_layout()
    }
    /// Whether blocks with the specified layout are currently owner-counted
    ///
    /// Inline values never are. Otherwise only the generation currently
    /// being allocated into is counted: permanent blocks are frozen
    /// while speculating, and arena blocks are left alone while committing.
    #[inline]
    pub fn is_refcounted(&self, layout: MemLayout) -> bool {
        layout == self.allocation_layout()
    }
    fn speculative_slab(&self) -> &SlabAllocator {
        self.speculative.get_or_init(|| {
            SlabAllocator::new("speculative", self.config.speculative_slab(), &self.logger)
        })
    }
    fn slab_for(&self, layout: MemLayout) -> &SlabAllocator {
        match layout {
            MemLayout::Standard => &self.permanent,
            MemLayout::Speculative => match self.speculative.get() {
                Some(arena) => arena,
                None => self.internal_fail("Speculative block without an arena"),
            },
            MemLayout::Inline => self.internal_fail("Inline values have no block"),
        }
    }
    /// Allocate a block of at least `size` bytes from the active allocator
    ///
    /// Oversized requests are an implementation-limit failure,
    /// and running out of memory is fatal.
    pub fn alloc_block(&self, size: usize) -> RawBlock {
        let layout = self.allocation_layout();
        let slab = match layout {
            MemLayout::Speculative => self.speculative_slab(),
            _ => &self.permanent,
        };
        match slab.alloc_with_size(size) {
            Ok((ptr, usable_size)) => RawBlock { ptr, usable_size, layout },
            Err(AllocationError::InvalidSize { size, cause }) => {
                self.impl_fail(format_args!("Unable to allocate {} bytes: {}", size, cause))
            },
            Err(cause) => cause.consider_fatal(),
        }
    }
    /// Return a block to the allocator that owns `layout`
    ///
    /// ## Safety
    /// The block must have come from [Runtime::alloc_block] with the same layout,
    /// and a size in the same class as `size`. It must not be used again.
    pub unsafe fn free_block(&self, ptr: NonNull<u8>, size: usize, layout: MemLayout) {
        self.slab_for(layout).release(ptr, size)
    }
    fn transition(&self, transition: Transition) -> Result<(), TransitionError> {
        let target = self.state.get().apply(transition)?;
        if transition == Transition::EnterSpeculative {
            self.speculative_slab();
        }
        self.state.set(target);
        if transition.releases_arena() {
            /*
             * Every survivor has been migrated (or the computation
             * was discarded), so nothing refers to the arena anymore.
             */
            let released = match self.speculative.get() {
                Some(arena) => unsafe { arena.release_all() },
                None => 0,
            };
            debug!(
                self.logger, "Released speculative arena";
                "transition" => %transition,
                "released" => %MemorySize { bytes: released },
            );
        } else {
            trace!(
                self.logger, "Changed memory state";
                "transition" => %transition,
                "state" => ?target,
            );
        }
        Ok(())
    }
    /// Begin a speculative computation.
    ///
    /// Only legal from [MemState::Normal].
    pub fn enter_speculative(&self) -> Result<(), TransitionError> {
        self.transition(Transition::EnterSpeculative)
    }
    /// Start migrating survivors into permanent memory.
    ///
    /// Only legal from [MemState::Speculative].
    pub fn enter_committing(&self) -> Result<(), TransitionError> {
        self.transition(Transition::EnterCommitting)
    }
    /// Go back to allocating speculatively in the middle of a commit.
    ///
    /// Only legal from [MemState::Committing].
    pub fn resume_speculative(&self) -> Result<(), TransitionError> {
        self.transition(Transition::ResumeSpeculative)
    }
    /// Finish the commit and release the whole speculative arena.
    ///
    /// Only legal from [MemState::Committing].
    /// Values still pointing into the arena become dangling.
    pub fn finish_commit(&self) -> Result<(), TransitionError> {
        self.transition(Transition::FinishCommit)
    }
    /// Discard everything allocated since entering the speculative state.
    ///
    /// Only legal from [MemState::Speculative].
    /// Values still pointing into the arena become dangling.
    pub fn abort_speculative(&self) -> Result<(), TransitionError> {
        self.transition(Transition::AbortSpeculative)
    }
    /// The bytes currently held by the speculative arena
    #[inline]
    pub fn speculative_outstanding_bytes(&self) -> usize {
        self.speculative.get().map_or(0, SlabAllocator::outstanding_bytes)
    }
    /// The bytes currently held by permanent memory
    #[inline]
    pub fn permanent_outstanding_bytes(&self) -> usize {
        self.permanent.outstanding_bytes()
    }
    /// Permanent allocation counters, if tracking is enabled
    #[inline]
    pub fn stats(&self) -> Option<AllocStats> {
        self.permanent.stats()
    }
    /// Whether a permanent block is live, if tracking is enabled
    #[inline]
    pub fn is_alive(&self, ptr: NonNull<u8>) -> Option<bool> {
        self.permanent.is_live(ptr)
    }
    /// Every live permanent block with its size, if tracking is enabled
    pub fn live_blocks(&self) -> Option<Vec<(NonNull<u8>, usize)>> {
        self.permanent.live_blocks()
    }
    /// Check whether the block lies in memory owned by the allocator for `layout`
    pub fn owns_block(&self, ptr: NonNull<u8>, layout: MemLayout) -> bool {
        match layout {
            MemLayout::Standard => self.permanent.contains(ptr),
            MemLayout::Speculative => self.speculative.get()
                .map_or(false, |arena| arena.contains(ptr)),
            MemLayout::Inline => false,
        }
    }
}
impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}
impl Debug for Runtime {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state.get())
            .field("permanent_bytes", &self.permanent_outstanding_bytes())
            .field("speculative_bytes", &self.speculative_outstanding_bytes())
            .field("config", &self.config)
            .finish()
    }
}
impl Drop for Runtime {
    fn drop(&mut self) {
        if self.state.get() != MemState::Normal {
            warn!(
                self.logger, "Dropping runtime inside a transaction";
                "state" => ?self.state.get(),
            );
        }
    }
}
