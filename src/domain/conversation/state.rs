//! Session phase state machine.
//!
//! Tracks where a single connection is in the lifecycle of its current
//! conversation. The phase is per connection; the persisted conversation
//! carries its own open/closed status through `end_time`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// The phase of the conversation bound to one connection.
///
/// - `Idle`: authenticated, no open conversation
/// - `Active`: conversation open, messages flow
/// - `Ending`: end sequence in flight (summary being produced)
/// - `Ended`: the conversation instance is finished; the connection goes
///   back to `Idle` right after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Ending,
    Ended,
}

impl SessionPhase {
    /// Returns true if a user message can be accepted in this phase.
    pub fn accepts_user_input(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if a new conversation may be started.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl StateMachine for SessionPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            (Idle, Active)
                | (Active, Ending)
                // end sequence failed, conversation still open
                | (Ending, Active)
                | (Ending, Ended)
                | (Ended, Idle)
                // conversation closed elsewhere (timeout or auto-close)
                | (Active, Idle)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SessionPhase::*;
        match self {
            Idle => vec![Active],
            Active => vec![Ending, Idle],
            Ending => vec![Active, Ended],
            Ended => vec![Idle],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_idle() {
        assert_eq!(SessionPhase::default(), SessionPhase::Idle);
    }

    #[test]
    fn full_lifecycle_is_valid() {
        let phase = SessionPhase::Idle;
        let phase = phase.transition_to(SessionPhase::Active).unwrap();
        let phase = phase.transition_to(SessionPhase::Ending).unwrap();
        let phase = phase.transition_to(SessionPhase::Ended).unwrap();
        let phase = phase.transition_to(SessionPhase::Idle).unwrap();
        assert_eq!(phase, SessionPhase::Idle);
    }

    #[test]
    fn failed_end_rolls_back_to_active() {
        assert!(SessionPhase::Ending.can_transition_to(&SessionPhase::Active));
    }

    #[test]
    fn cannot_start_twice() {
        assert!(SessionPhase::Active.transition_to(SessionPhase::Active).is_err());
        assert!(!SessionPhase::Active.can_start());
    }

    #[test]
    fn idle_cannot_end() {
        assert!(SessionPhase::Idle.transition_to(SessionPhase::Ending).is_err());
    }

    #[test]
    fn no_phase_is_terminal() {
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Active,
            SessionPhase::Ending,
            SessionPhase::Ended,
        ] {
            assert!(!phase.is_terminal(), "{:?} should have an exit", phase);
        }
    }

    #[test]
    fn only_active_accepts_input() {
        assert!(SessionPhase::Active.accepts_user_input());
        assert!(!SessionPhase::Ending.accepts_user_input());
        assert!(!SessionPhase::Idle.accepts_user_input());
    }
}
