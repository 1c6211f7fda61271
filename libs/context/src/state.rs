//! The transactional memory states and the transitions between them
use std::fmt::{self, Display, Formatter};

use bitbybit::bitenum;

/// Which allocator owns the block behind a value
///
/// This is the two layout bits stored in a value's descriptor.
#[derive(Debug, PartialEq, Eq, Hash)]
#[bitenum(u2, exhaustive = false)]
pub enum MemLayout {
    /// No heap block at all
    Inline = 0,
    /// Permanent memory
    Standard = 1,
    /// The disposable speculative arena
    Speculative = 2,
}

/// The state of the runtime's memory
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemState {
    /// All allocation goes to permanent memory
    Normal,
    /// Inside a computation that may be rolled back.
    ///
    /// New blocks come from the speculative arena,
    /// and permanent blocks are frozen.
    Speculative,
    /// Migrating the survivors of a speculative computation
    /// into permanent memory
    Committing,
}
impl MemState {
    /// The layout of blocks allocated in this state
    ///
    /// This is also the only layout that is owner-counted:
    /// blocks from the other generation are left untouched
    /// by retain and release.
    #[inline]
    pub const fn allocation_layout(self) -> MemLayout {
        match self {
            MemState::Speculative => MemLayout::Speculative,
            MemState::Normal | MemState::Committing => MemLayout::Standard,
        }
    }
    /// Whether a speculative region is open
    #[inline]
    pub const fn in_transaction(self) -> bool {
        !matches!(self, MemState::Normal)
    }
    /// Apply the transition, if it is legal from this state
    pub fn apply(self, transition: Transition) -> Result<MemState, TransitionError> {
        if self == transition.required_state() {
            Ok(transition.target_state())
        } else {
            Err(TransitionError { from: self, transition })
        }
    }
}
impl Default for MemState {
    #[inline]
    fn default() -> Self {
        MemState::Normal
    }
}

/// A change between two [MemState]s
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// `Normal` to `Speculative`
    EnterSpeculative,
    /// `Speculative` to `Committing`
    EnterCommitting,
    /// `Committing` back to `Speculative`
    ResumeSpeculative,
    /// `Committing` to `Normal`, releasing the arena
    FinishCommit,
    /// `Speculative` to `Normal`, releasing the arena
    AbortSpeculative,
}
impl Transition {
    /// The only state this transition is legal from
    pub const fn required_state(self) -> MemState {
        match self {
            Transition::EnterSpeculative => MemState::Normal,
            Transition::EnterCommitting | Transition::AbortSpeculative => MemState::Speculative,
            Transition::ResumeSpeculative | Transition::FinishCommit => MemState::Committing,
        }
    }
    /// The state after the transition
    pub const fn target_state(self) -> MemState {
        match self {
            Transition::EnterSpeculative | Transition::ResumeSpeculative => MemState::Speculative,
            Transition::EnterCommitting => MemState::Committing,
            Transition::FinishCommit | Transition::AbortSpeculative => MemState::Normal,
        }
    }
    /// Whether the speculative arena is discarded afterwards
    pub const fn releases_arena(self) -> bool {
        matches!(self, Transition::FinishCommit | Transition::AbortSpeculative)
    }
}
impl Display for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Transition::EnterSpeculative => "enter speculative state",
            Transition::EnterCommitting => "enter committing state",
            Transition::ResumeSpeculative => "resume speculative state",
            Transition::FinishCommit => "finish commit",
            Transition::AbortSpeculative => "abort speculative state",
        })
    }
}

/// Indicates a state transition was attempted from the wrong state
///
/// The state is left unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unable to {transition} from {from:?} state")]
pub struct TransitionError {
    /// The state at the time of the attempt
    pub from: MemState,
    /// The attempted transition
    pub transition: Transition,
}
