//! Order lifecycle state machine.
//!
//! Pure transition validation over the canonical lifecycle; no I/O, no
//! clock. The lifecycle machine is the only mutator of the state recorded
//! alongside a tracked order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical lifecycle state of a tracked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Created locally, not yet acknowledged by the broker.
    New,
    /// Accepted / working at the broker.
    Accepted,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Cancelled,
    /// Rejected by the broker.
    Rejected,
    /// Expired (e.g. DAY order at close).
    Expired,
}

impl LifecycleState {
    /// Returns true if the state is terminal (no outbound transitions).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is still open at the broker.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Accepted | Self::PartiallyFilled)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Lifecycle validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The requested transition is not in the canonical table.
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
}

/// Lifecycle machine validating transitions against the canonical table.
pub struct LifecycleMachine;

impl LifecycleMachine {
    /// Check if a transition is in the canonical table.
    #[must_use]
    pub fn is_valid_transition(from: LifecycleState, to: LifecycleState) -> bool {
        matches!(
            (from, to),
            // From New
            (LifecycleState::New, LifecycleState::Accepted)
                | (LifecycleState::New, LifecycleState::Rejected)
                // From Accepted
                | (LifecycleState::Accepted, LifecycleState::PartiallyFilled)
                | (LifecycleState::Accepted, LifecycleState::Filled)
                | (LifecycleState::Accepted, LifecycleState::Cancelled)
                | (LifecycleState::Accepted, LifecycleState::Expired)
                | (LifecycleState::Accepted, LifecycleState::Rejected)
                // From PartiallyFilled
                | (LifecycleState::PartiallyFilled, LifecycleState::PartiallyFilled)
                | (LifecycleState::PartiallyFilled, LifecycleState::Filled)
                | (LifecycleState::PartiallyFilled, LifecycleState::Cancelled)
                | (LifecycleState::PartiallyFilled, LifecycleState::Expired)
        )
    }

    /// Validate and apply a transition, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidTransition` if the transition is not
    /// in the canonical table.
    pub fn apply(
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<LifecycleState, LifecycleError> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(LifecycleError::InvalidTransition { from, to })
        }
    }

    /// All valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: LifecycleState) -> Vec<LifecycleState> {
        match from {
            LifecycleState::New => vec![LifecycleState::Accepted, LifecycleState::Rejected],
            LifecycleState::Accepted => vec![
                LifecycleState::PartiallyFilled,
                LifecycleState::Filled,
                LifecycleState::Cancelled,
                LifecycleState::Expired,
                LifecycleState::Rejected,
            ],
            LifecycleState::PartiallyFilled => vec![
                LifecycleState::PartiallyFilled,
                LifecycleState::Filled,
                LifecycleState::Cancelled,
                LifecycleState::Expired,
            ],
            // Terminal states
            LifecycleState::Filled
            | LifecycleState::Cancelled
            | LifecycleState::Rejected
            | LifecycleState::Expired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ALL_STATES: [LifecycleState; 7] = [
        LifecycleState::New,
        LifecycleState::Accepted,
        LifecycleState::PartiallyFilled,
        LifecycleState::Filled,
        LifecycleState::Cancelled,
        LifecycleState::Rejected,
        LifecycleState::Expired,
    ];

    #[test_case(LifecycleState::New, LifecycleState::Accepted)]
    #[test_case(LifecycleState::New, LifecycleState::Rejected)]
    #[test_case(LifecycleState::Accepted, LifecycleState::PartiallyFilled)]
    #[test_case(LifecycleState::Accepted, LifecycleState::Filled)]
    #[test_case(LifecycleState::Accepted, LifecycleState::Cancelled)]
    #[test_case(LifecycleState::Accepted, LifecycleState::Expired)]
    #[test_case(LifecycleState::Accepted, LifecycleState::Rejected)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::PartiallyFilled)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::Filled)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::Cancelled)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::Expired)]
    fn valid_transition(from: LifecycleState, to: LifecycleState) {
        assert!(LifecycleMachine::is_valid_transition(from, to));
        assert_eq!(LifecycleMachine::apply(from, to), Ok(to));
    }

    #[test_case(LifecycleState::New, LifecycleState::Filled)]
    #[test_case(LifecycleState::New, LifecycleState::PartiallyFilled)]
    #[test_case(LifecycleState::New, LifecycleState::Cancelled)]
    #[test_case(LifecycleState::New, LifecycleState::Expired)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::Rejected)]
    #[test_case(LifecycleState::PartiallyFilled, LifecycleState::Accepted)]
    fn invalid_transition(from: LifecycleState, to: LifecycleState) {
        assert!(!LifecycleMachine::is_valid_transition(from, to));
        assert_eq!(
            LifecycleMachine::apply(from, to),
            Err(LifecycleError::InvalidTransition { from, to })
        );
    }

    #[test]
    fn terminal_states_have_no_outbound_transitions() {
        for terminal in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            assert!(LifecycleMachine::valid_next_states(*terminal).is_empty());
            for to in ALL_STATES {
                assert!(!LifecycleMachine::is_valid_transition(*terminal, to));
            }
        }
    }

    #[test]
    fn open_and_terminal_partition_the_states() {
        for state in ALL_STATES {
            assert_ne!(state.is_open(), state.is_terminal());
        }
    }

    #[test]
    fn valid_next_states_match_transition_table() {
        for from in ALL_STATES {
            let next = LifecycleMachine::valid_next_states(from);
            for to in ALL_STATES {
                assert_eq!(
                    next.contains(&to),
                    LifecycleMachine::is_valid_transition(from, to)
                );
            }
        }
    }

    #[test]
    fn display_matches_wire_format() {
        assert_eq!(
            format!("{}", LifecycleState::PartiallyFilled),
            "PARTIALLY_FILLED"
        );
        assert_eq!(format!("{}", LifecycleState::Cancelled), "CANCELLED");
        assert_eq!(
            serde_json::to_string(&LifecycleState::Cancelled).unwrap(),
            "\"CANCELLED\""
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_state() -> impl Strategy<Value = LifecycleState> {
            prop::sample::select(ALL_STATES.to_vec())
        }

        proptest! {
            #[test]
            fn terminal_states_are_stable(from in any_state(), to in any_state()) {
                if from.is_terminal() {
                    prop_assert!(LifecycleMachine::apply(from, to).is_err());
                }
            }

            #[test]
            fn apply_never_invents_states(from in any_state(), to in any_state()) {
                if let Ok(new_state) = LifecycleMachine::apply(from, to) {
                    prop_assert_eq!(new_state, to);
                }
            }
        }
    }
}
