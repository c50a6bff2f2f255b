//! Deploy state machine
//!
//! Idle → SpecFetched → SpecMutated → Submitted → EvaluationPending →
//! EvaluationSettled → AllocationsPending → AllocationsSettled → Done
//!
//! Any non-terminal state may jump straight to Done when the deploy ends
//! early (fatal error, fire-and-forget submission, cancellation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deploy state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployState {
    Idle,
    SpecFetched,
    SpecMutated,
    Submitted,
    EvaluationPending,
    EvaluationSettled,
    AllocationsPending,
    AllocationsSettled,
    Done,
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Done)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: DeployState) -> bool {
        use DeployState::*;
        match (self, target) {
            (Done, _) => false,
            (_, Done) => true,
            (Idle, SpecFetched) => true,
            (SpecFetched, SpecMutated) => true,
            (SpecMutated, Submitted) => true,
            (Submitted, EvaluationPending) => true,
            (EvaluationPending, EvaluationSettled) => true,
            (EvaluationSettled, AllocationsPending) => true,
            (AllocationsPending, AllocationsSettled) => true,
            _ => false,
        }
    }
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: DeployState,
    pub to: DeployState,
    pub at: DateTime<Utc>,
}

/// Errors for deploy state operations
#[derive(Debug, thiserror::Error)]
pub enum DeployStateError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: DeployState, to: DeployState },
}

/// Current state plus the transitions that led to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    state: DeployState,
    history: Vec<Transition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: DeployState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Transition to a new state
    pub fn transition(&mut self, to: DeployState) -> Result<(), DeployStateError> {
        if !self.state.can_transition_to(to) {
            return Err(DeployStateError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        tracing::info!(from = ?self.state, to = ?to, "deploy state");
        self.history.push(Transition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        self.state = to;
        Ok(())
    }

    /// States visited so far, starting with Idle
    pub fn path(&self) -> Vec<DeployState> {
        std::iter::once(DeployState::Idle)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeployState::*;

    #[test]
    fn test_full_path() {
        let mut machine = StateMachine::new();
        for state in [
            SpecFetched,
            SpecMutated,
            Submitted,
            EvaluationPending,
            EvaluationSettled,
            AllocationsPending,
            AllocationsSettled,
            Done,
        ] {
            machine.transition(state).unwrap();
        }

        assert_eq!(machine.state(), Done);
        assert_eq!(machine.history().len(), 8);
        assert_eq!(machine.path().first(), Some(&Idle));
    }

    #[test]
    fn test_skipping_states_rejected() {
        let mut machine = StateMachine::new();
        let err = machine.transition(Submitted).unwrap_err();
        assert!(err.to_string().contains("Idle"));
        assert_eq!(machine.state(), Idle);
    }

    #[test]
    fn test_early_done_allowed() {
        let mut machine = StateMachine::new();
        machine.transition(SpecFetched).unwrap();
        machine.transition(SpecMutated).unwrap();
        machine.transition(Submitted).unwrap();
        machine.transition(Done).unwrap();

        assert_eq!(machine.path(), vec![Idle, SpecFetched, SpecMutated, Submitted, Done]);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut machine = StateMachine::new();
        machine.transition(Done).unwrap();

        assert!(machine.state().is_terminal());
        assert!(machine.transition(Done).is_err());
        assert!(machine.transition(SpecFetched).is_err());
    }
}
