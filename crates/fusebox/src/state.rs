//! Circuit state and the cell that stores it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls run the action
    Closed,

    /// Calls are rejected without running the action
    Open,

    /// Calls run the action as recovery probes
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

/// Everything a state transition writes, updated as one unit under the
/// breaker's lock.
///
/// `epoch` counts entries into [`CircuitState::Open`]. A cooldown timer
/// remembers the epoch it was armed for and is ignored once the circuit has
/// left that open period.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StateCell {
    pub state: CircuitState,
    pub epoch: u64,
    opened_at: Option<Instant>,
}

impl StateCell {
    pub fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            epoch: 0,
            opened_at: None,
        }
    }

    /// Enter the open state, returning the epoch of this open period.
    pub fn open(&mut self, now: Instant) -> u64 {
        self.state = CircuitState::Open;
        self.epoch += 1;
        self.opened_at = Some(now);
        self.epoch
    }

    /// Move to half-open if still inside the open period `epoch`.
    pub fn half_open(&mut self, epoch: u64) -> bool {
        if self.state != CircuitState::Open || self.epoch != epoch {
            return false;
        }
        self.state = CircuitState::HalfOpen;
        self.opened_at = None;
        true
    }

    pub fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    /// Epoch of the current open period if its cooldown has run out.
    pub fn expired(&self, cooldown: Duration, now: Instant) -> Option<u64> {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at)) if now.duration_since(opened_at) >= cooldown => {
                Some(self.epoch)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half_open\""
        );
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let now = Instant::now();
        let mut cell = StateCell::closed();

        let first = cell.open(now);
        cell.close();
        let second = cell.open(now);

        assert!(!cell.half_open(first));
        assert_eq!(cell.state, CircuitState::Open);
        assert!(cell.half_open(second));
        assert_eq!(cell.state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_expiry() {
        let now = Instant::now();
        let cooldown = Duration::from_millis(100);
        let mut cell = StateCell::closed();
        assert_eq!(cell.expired(cooldown, now), None);

        let epoch = cell.open(now);
        assert_eq!(cell.expired(cooldown, now + Duration::from_millis(50)), None);
        assert_eq!(cell.expired(cooldown, now + cooldown), Some(epoch));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Open,
        Close,
        HalfOpen { back: u64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Open),
            Just(Op::Close),
            (0u64..3).prop_map(|back| Op::HalfOpen { back }),
        ]
    }

    proptest! {
        #[test]
        fn epochs_only_grow_and_half_open_needs_current_epoch(ops in prop::collection::vec(op(), 0..64)) {
            let now = Instant::now();
            let mut cell = StateCell::closed();

            for op in ops {
                let before = cell;
                match op {
                    Op::Open => {
                        let epoch = cell.open(now);
                        prop_assert_eq!(epoch, before.epoch + 1);
                        prop_assert_eq!(cell.state, CircuitState::Open);
                    }
                    Op::Close => {
                        cell.close();
                        prop_assert_eq!(cell.epoch, before.epoch);
                        prop_assert_eq!(cell.state, CircuitState::Closed);
                    }
                    Op::HalfOpen { back } => {
                        let epoch = before.epoch.saturating_sub(back);
                        let moved = cell.half_open(epoch);
                        let expected = before.state == CircuitState::Open && epoch == before.epoch;
                        prop_assert_eq!(moved, expected);
                        prop_assert_eq!(cell.epoch, before.epoch);
                        if !moved {
                            prop_assert_eq!(cell.state, before.state);
                        }
                    }
                }
            }
        }
    }
}
