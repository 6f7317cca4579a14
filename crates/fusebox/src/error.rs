//! Errors returned by a guarded call.

use std::time::Duration;
use thiserror::Error;

/// Outcome of a guarded call that did not produce a value.
///
/// Action errors pass through untouched while the breaker is closed. The
/// breaker substitutes its own variant only when it refuses to run the
/// action, or when a recovery probe fails.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The action ran and failed.
    #[error("{0}")]
    Action(E),

    /// The call was rejected without running the action.
    #[error(
        "circuit open: action failed {failure_threshold} times in a row, \
         calls are rejected for {cooldown:?} before a recovery probe"
    )]
    Open {
        failure_threshold: u32,
        cooldown: Duration,
    },

    /// A recovery probe ran and failed.
    #[error(
        "circuit half-open: action still failing after the {cooldown:?} cooldown \
         ({trial_limit} failed probes reopen the circuit)"
    )]
    HalfOpen {
        trial_limit: u32,
        cooldown: Duration,
        #[source]
        source: E,
    },
}

impl<E> BreakerError<E> {
    /// True if the breaker refused to run the action.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// True if a recovery probe failed.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    /// True if the error came from the breaker rather than straight from the action.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Action(_))
    }

    /// Borrow the action's error, if the action ran.
    pub fn as_action(&self) -> Option<&E> {
        match self {
            Self::Action(e) | Self::HalfOpen { source: e, .. } => Some(e),
            Self::Open { .. } => None,
        }
    }

    /// Take the action's error, if the action ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Action(e) | Self::HalfOpen { source: e, .. } => Some(e),
            Self::Open { .. } => None,
        }
    }
}
