// Copyright (c) 2025 - Cowboy AI, Inc.
//! Apply Pass Events
//!
//! One event per resource step, recorded into the apply report. Events are
//! plain data with stable serde form so callers can persist or ship them;
//! the engine also logs each one as it happens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ResourceId;

/// Terminal outcome of one resource's step within a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Resource reached applied state; `changed` is false for a no-op
    Applied { changed: bool },

    /// The create-or-update call failed; retried next pass
    Failed { cause: String },

    /// Never attempted: a dependency failed, or the pass was cancelled
    Skipped { reason: SkipReason },
}

/// Why a resource was never attempted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A (possibly transitive) dependency terminally failed this pass
    DependencyFailed { dependency: ResourceId },

    /// The pass was cancelled before this resource's step began
    Cancelled,
}

/// Event recorded for every resource step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyEvent {
    /// Unique event id
    pub event_id: Uuid,

    /// When the step reached its outcome
    pub timestamp: DateTime<Utc>,

    /// Resource the step belonged to
    pub resource: ResourceId,

    /// What happened
    pub outcome: StepOutcome,
}

impl ApplyEvent {
    /// Record an outcome, stamped now
    pub fn record(resource: ResourceId, outcome: StepOutcome) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            resource,
            outcome,
        }
    }
}

impl StepOutcome {
    /// Whether the resource reached applied state
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Whether the step performed an actual create or update
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied { changed: true })
    }
}
