// Copyright (c) 2025 - Cowboy AI, Inc.
//! Target Lifecycle State Machine
//!
//! Formal FSM for a compute instance registered as a load-balancer
//! target. Uses the generic StateMachine trait from the parent module.
//!
//! # State Machine Type
//!
//! This is a **Mealy Machine**: outputs depend on both state and input.
//!
//! # States
//!
//! - Registering: attach requested, nothing observed yet
//! - HealthCheckPending: attached, waiting to pass enough checks
//! - Healthy: receiving traffic
//! - Unhealthy: failed too many checks, no traffic
//! - Draining: being removed, in-flight connections finishing
//! - Removed: gone (terminal)
//!
//! # Inputs
//!
//! The health gate counts consecutive check results and feeds threshold
//! crossings in as `MarkHealthy` / `MarkUnhealthy`; individual checks are
//! not FSM inputs.
//!
//! # Outputs
//!
//! Each transition reports its routing consequence, so the caller can
//! start or stop traffic exactly on the transition - an unhealthy target
//! stops receiving traffic the moment it is marked.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Lifecycle state of a registered target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Attach requested
    Registering,
    /// Attached, not yet past the healthy threshold
    HealthCheckPending,
    /// Routable
    Healthy,
    /// Failed past the unhealthy threshold
    Unhealthy,
    /// Connections draining ahead of removal
    Draining,
    /// Removed (terminal)
    Removed,
}

impl TargetStatus {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::HealthCheckPending => "health_check_pending",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Draining => "draining",
            Self::Removed => "removed",
        }
    }

    /// Whether the target currently receives traffic
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Whether the target still counts toward the service's capacity
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Draining | Self::Removed)
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Removed)
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle command (FSM input)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetCommand {
    /// Attach to the target group
    Attach,

    /// Healthy threshold reached
    MarkHealthy,

    /// Unhealthy threshold reached
    MarkUnhealthy,

    /// Begin graceful removal
    Drain,

    /// Drain finished (connections done or timeout expired)
    DrainComplete,
}

/// Routing consequence of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficEffect {
    /// Routing unchanged
    Unchanged,
    /// Start routing traffic to the target
    StartRouting,
    /// Stop routing traffic immediately
    StopRouting,
}

impl StateMachine for TargetStatus {
    type Input = TargetCommand;
    type Output = TrafficEffect;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use TargetCommand::*;
        use TargetStatus::*;

        match (self, input) {
            (Registering, Attach) => Ok((HealthCheckPending, TrafficEffect::Unchanged)),

            (HealthCheckPending, MarkHealthy) => Ok((Healthy, TrafficEffect::StartRouting)),
            (HealthCheckPending, MarkUnhealthy) => Ok((Unhealthy, TrafficEffect::Unchanged)),

            (Healthy, MarkUnhealthy) => Ok((Unhealthy, TrafficEffect::StopRouting)),
            (Unhealthy, MarkHealthy) => Ok((Healthy, TrafficEffect::StartRouting)),

            // Drain is reachable from every live state; only a previously
            // routable target changes the routing set
            (Healthy, Drain) => Ok((Draining, TrafficEffect::StopRouting)),
            (Registering | HealthCheckPending | Unhealthy, Drain) => {
                Ok((Draining, TrafficEffect::Unchanged))
            }

            (Draining, DrainComplete) => Ok((Removed, TrafficEffect::Unchanged)),

            (Removed, _) => Err(TransitionError::InvalidTransition {
                from: "removed".to_string(),
                to: "any state".to_string(),
            }),
            (Healthy, MarkHealthy) | (Unhealthy, MarkUnhealthy) => {
                Err(TransitionError::BusinessRuleViolation(format!(
                    "already {self}"
                )))
            }
            (from, to) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: format!("{to:?}"),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use TargetCommand::*;
        use TargetStatus::*;

        match self {
            Registering => vec![Attach, Drain],
            HealthCheckPending => vec![MarkHealthy, MarkUnhealthy, Drain],
            Healthy => vec![MarkUnhealthy, Drain],
            Unhealthy => vec![MarkHealthy, Drain],
            Draining => vec![DrainComplete],
            Removed => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_then_healthy_routes_traffic() {
        let (pending, effect) = TargetStatus::Registering
            .transition(&TargetCommand::Attach)
            .unwrap();
        assert_eq!(pending, TargetStatus::HealthCheckPending);
        assert_eq!(effect, TrafficEffect::Unchanged);

        let (healthy, effect) = pending.transition(&TargetCommand::MarkHealthy).unwrap();
        assert_eq!(healthy, TargetStatus::Healthy);
        assert_eq!(effect, TrafficEffect::StartRouting);
        assert!(healthy.is_routable());
    }

    #[test]
    fn test_unhealthy_stops_traffic_on_transition() {
        let (unhealthy, effect) = TargetStatus::Healthy
            .transition(&TargetCommand::MarkUnhealthy)
            .unwrap();
        assert_eq!(unhealthy, TargetStatus::Unhealthy);
        assert_eq!(effect, TrafficEffect::StopRouting);
        assert!(!unhealthy.is_routable());
    }

    #[test]
    fn test_unhealthy_can_recover() {
        let (healthy, effect) = TargetStatus::Unhealthy
            .transition(&TargetCommand::MarkHealthy)
            .unwrap();
        assert_eq!(healthy, TargetStatus::Healthy);
        assert_eq!(effect, TrafficEffect::StartRouting);
    }

    #[test]
    fn test_drain_from_every_live_state() {
        for state in [
            TargetStatus::Registering,
            TargetStatus::HealthCheckPending,
            TargetStatus::Healthy,
            TargetStatus::Unhealthy,
        ] {
            let (next, _) = state.transition(&TargetCommand::Drain).unwrap();
            assert_eq!(next, TargetStatus::Draining);
        }
    }

    #[test]
    fn test_only_healthy_drain_stops_traffic() {
        let (_, effect) = TargetStatus::Healthy.transition(&TargetCommand::Drain).unwrap();
        assert_eq!(effect, TrafficEffect::StopRouting);

        let (_, effect) = TargetStatus::Unhealthy.transition(&TargetCommand::Drain).unwrap();
        assert_eq!(effect, TrafficEffect::Unchanged);
    }

    #[test]
    fn test_removed_is_terminal() {
        for command in [
            TargetCommand::Attach,
            TargetCommand::MarkHealthy,
            TargetCommand::Drain,
        ] {
            assert!(TargetStatus::Removed.transition(&command).is_err());
        }
        assert!(TargetStatus::Removed.valid_inputs().is_empty());
    }

    #[test]
    fn test_draining_only_completes() {
        assert!(TargetStatus::Draining
            .transition(&TargetCommand::MarkHealthy)
            .is_err());
        let (removed, _) = TargetStatus::Draining
            .transition(&TargetCommand::DrainComplete)
            .unwrap();
        assert_eq!(removed, TargetStatus::Removed);
    }

    #[test]
    fn test_valid_inputs_match_transitions() {
        for state in [
            TargetStatus::Registering,
            TargetStatus::HealthCheckPending,
            TargetStatus::Healthy,
            TargetStatus::Unhealthy,
            TargetStatus::Draining,
            TargetStatus::Removed,
        ] {
            for input in state.valid_inputs() {
                assert!(state.can_transition(&input), "{state} should accept {input:?}");
            }
        }
    }
}
