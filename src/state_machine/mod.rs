// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic, reusable state machine types for modeling lifecycles. All
//! state machines are pure functional - transitions are deterministic
//! functions with no side effects, which keeps lifecycle logic testable
//! in isolation from the engine that drives it.
//!
//! The one machine in this crate is the target lifecycle
//! ([`target_lifecycle`]): a Mealy machine whose output tells the health
//! gate what to do with traffic routing.

pub mod target_lifecycle;

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Business rule prevents transition
    #[error("Business rule violated: {0}")]
    BusinessRuleViolation(String),
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    ///
    /// # Returns
    /// - Ok((new_state, output)) if transition is valid
    /// - Err(TransitionError) if transition is invalid
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Get all valid inputs from current state (if enumerable)
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        // Override if Input is enumerable
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Simple test FSM: On/Off switch
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Switch {
        Off,
        On,
    }

    #[derive(Clone)]
    enum SwitchInput {
        Press,
    }

    impl StateMachine for Switch {
        type Input = SwitchInput;
        type Output = ();

        fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match (self, input) {
                (Switch::Off, SwitchInput::Press) => Ok((Switch::On, ())),
                (Switch::On, SwitchInput::Press) => Ok((Switch::Off, ())),
            }
        }
    }

    #[test]
    fn test_simple_transition() {
        let switch = Switch::Off;
        let (new_state, _) = switch.transition(&SwitchInput::Press).unwrap();
        assert_eq!(new_state, Switch::On);
    }

    #[test]
    fn test_can_transition() {
        let switch = Switch::Off;
        assert!(switch.can_transition(&SwitchInput::Press));
    }
}
