//! The deploy state machine.
//!
//! ```text
//! Idle ──► Terminating ──► AwaitingEvent ──► Applying ──► AwaitingEvent ──► SmokeTesting ──► AwaitingHealth ──► Succeeded
//!   │           │                               ▲               │                                ▲
//!   │           └──────── (nothing to delete) ──┘               └──────── (no smoke test) ───────┘
//!   └──────────────────────── (no phoenix) ─────┘
//! ```
//!
//! Any non-terminal state may move to `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployState {
    /// Nothing issued yet
    #[default]
    Idle,
    /// Phoenix mode: deleting the remote environment
    Terminating,
    /// Issuing create or update
    Applying,
    /// Consuming the event log until the issued operation completes
    AwaitingEvent,
    /// Running the post-deploy smoke test
    SmokeTesting,
    /// Polling health until Green
    AwaitingHealth,
    /// Deploy completed
    Succeeded,
    /// Deploy aborted
    Failed,
}

impl DeployState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeployState::Succeeded | DeployState::Failed)
    }

    pub fn can_transition_to(self, next: DeployState) -> bool {
        use DeployState::*;

        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Terminating) | (Idle, Applying) => true,
            (Terminating, AwaitingEvent) | (Terminating, Applying) => true,
            (Applying, AwaitingEvent) => true,
            (AwaitingEvent, Applying)
            | (AwaitingEvent, SmokeTesting)
            | (AwaitingEvent, AwaitingHealth) => true,
            (SmokeTesting, AwaitingHealth) => true,
            (AwaitingHealth, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployState::Idle => "idle",
            DeployState::Terminating => "terminating",
            DeployState::Applying => "applying",
            DeployState::AwaitingEvent => "awaiting-event",
            DeployState::SmokeTesting => "smoke-testing",
            DeployState::AwaitingHealth => "awaiting-health",
            DeployState::Succeeded => "succeeded",
            DeployState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeployState::*;

    const ALL: [DeployState; 8] = [
        Idle,
        Terminating,
        Applying,
        AwaitingEvent,
        SmokeTesting,
        AwaitingHealth,
        Succeeded,
        Failed,
    ];

    #[test]
    fn test_happy_paths_are_legal() {
        let full = [
            Idle,
            Terminating,
            AwaitingEvent,
            Applying,
            AwaitingEvent,
            SmokeTesting,
            AwaitingHealth,
            Succeeded,
        ];
        let minimal = [Idle, Applying, AwaitingEvent, AwaitingHealth, Succeeded];
        let nothing_to_terminate = [Idle, Terminating, Applying, AwaitingEvent, AwaitingHealth];

        for path in [&full[..], &minimal[..], &nothing_to_terminate[..]] {
            for pair in path.windows(2) {
                assert!(
                    pair[0].can_transition_to(pair[1]),
                    "{} -> {} should be legal",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in ALL {
            assert!(!Succeeded.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_every_live_state_can_fail() {
        for state in ALL.into_iter().filter(|state| !state.is_terminal()) {
            assert!(state.can_transition_to(Failed), "{} cannot fail", state);
        }
    }

    #[test]
    fn test_steps_cannot_be_skipped_or_reordered() {
        assert!(!Idle.can_transition_to(AwaitingHealth));
        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Applying.can_transition_to(SmokeTesting));
        assert!(!SmokeTesting.can_transition_to(Applying));
        assert!(!AwaitingHealth.can_transition_to(SmokeTesting));
        assert!(!Terminating.can_transition_to(Terminating));
    }
}
