//! Failure reporting
//!
//! There are three kinds of failure, in increasing severity.
//! Only a soft failure inside a speculative region can be recovered from,
//! by aborting the region. Everything else is logged
//! (with a backtrace) and then panics.
use std::backtrace::Backtrace;
use std::fmt::Display;

use slog::{crit, debug};

use crate::{MemState, Runtime};

/// A failure reported by the runtime
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// Caller-supplied data violated a precondition
    #[error("{0}")]
    Soft(String),
    /// A request exceeded what the representation supports,
    /// like an overlong sequence
    #[error("Implementation limit exceeded: {0}")]
    ImplementationLimit(String),
    /// A broken invariant of the runtime itself
    #[error("Internal error: {0}")]
    Internal(String),
}
impl Failure {
    /// A short name for the kind of failure
    pub fn kind(&self) -> &'static str {
        match *self {
            Failure::Soft(_) => "soft",
            Failure::ImplementationLimit(_) => "implementation-limit",
            Failure::Internal(_) => "internal",
        }
    }
    /// Whether this failure can abort a speculative region
    /// instead of halting
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(*self, Failure::Soft(_))
    }
}

impl Runtime {
    /// Report a precondition violated by caller-supplied data
    ///
    /// Inside a speculative region, this returns the failure
    /// so the caller can propagate it and abort the region.
    /// Everywhere else it is fatal.
    pub fn soft_fail(&self, message: impl Display) -> Failure {
        let failure = Failure::Soft(message.to_string());
        if self.state() == MemState::Speculative {
            debug!(
                self.logger(), "Soft failure in speculative state";
                "message" => %failure,
            );
            failure
        } else {
            self.fatal(failure)
        }
    }
    /// Report a request beyond the limits of the representation
    #[cold]
    pub fn impl_fail(&self, message: impl Display) -> ! {
        self.fatal(Failure::ImplementationLimit(message.to_string()))
    }
    /// Report a broken internal invariant
    #[cold]
    pub fn internal_fail(&self, message: impl Display) -> ! {
        self.fatal(Failure::Internal(message.to_string()))
    }
    #[cold]
    #[inline(never)]
    fn fatal(&self, failure: Failure) -> ! {
        let backtrace = Backtrace::force_capture();
        crit!(
            self.logger(), "Fatal failure";
            "kind" => failure.kind(),
            "message" => %failure,
            "state" => ?self.state(),
            "backtrace" => %backtrace,
        );
        panic!("{}", failure)
    }
}
