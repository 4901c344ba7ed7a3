// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Placement & Health Gate
//!
//! Registers compute instances as load-balancer targets and tracks their
//! health-check state before routing traffic. The desired replica count is
//! a convergence target, not an instantaneous guarantee: each call to
//! [`ServicePlacement::converge`] moves the registered set toward it,
//! tolerating transient over- or under-provisioning bounded by the
//! configured healthy percentages.
//!
//! Threshold counting lives here; the lifecycle transitions themselves are
//! the [`TargetStatus`] state machine. Checks against a draining or
//! removed target are ignored.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::ResourceId;
use crate::state_machine::target_lifecycle::{TargetCommand, TargetStatus, TrafficEffect};
use crate::state_machine::{StateMachine, TransitionError};

/// Placement failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// Target id is not registered in the group
    #[error("unknown target: {0}")]
    UnknownTarget(TargetId),

    /// Target id is already registered
    #[error("target already registered: {0}")]
    DuplicateTarget(TargetId),

    /// Underlying lifecycle transition was invalid
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Identifier of one registered target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(String);

impl TargetId {
    /// Create a target id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Health check parameters of a target group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    /// Path probed on each target
    pub path: String,

    /// Time between checks
    pub interval: Duration,

    /// Per-check timeout; exceeding it counts as a failure
    pub timeout: Duration,

    /// Consecutive passes required before routing begins
    pub healthy_threshold: u32,

    /// Consecutive failures required before routing stops
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            healthy_threshold: 5,
            unhealthy_threshold: 2,
        }
    }
}

/// Boundary contract toward a target's health endpoint: the named path
/// must answer successfully within the configured timeout. No body schema
/// is mandated.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe one target; true means the check passed
    async fn check(&self, target: &TargetId, path: &str) -> bool;
}

/// One registered target with its health counters
#[derive(Debug, Clone)]
pub struct Target {
    /// Identifier within the group
    pub id: TargetId,

    /// Lifecycle state
    pub status: TargetStatus,

    /// Deadline after which a drain is forced to complete
    pub drain_deadline: Option<DateTime<Utc>>,

    consecutive_passes: u32,
    consecutive_failures: u32,
}

impl Target {
    fn new(id: TargetId) -> Self {
        Self {
            id,
            status: TargetStatus::Registering,
            drain_deadline: None,
            consecutive_passes: 0,
            consecutive_failures: 0,
        }
    }
}

/// A load balancer target group: health-check parameters plus the set of
/// registered targets
#[derive(Debug, Clone)]
pub struct TargetGroup {
    /// Group name
    pub name: String,

    /// Traffic port of the registered targets
    pub port: u16,

    /// Health check parameters
    pub health: HealthCheckSpec,

    targets: BTreeMap<TargetId, Target>,
}

impl TargetGroup {
    /// Create an empty group
    pub fn new(name: impl Into<String>, port: u16, health: HealthCheckSpec) -> Self {
        Self {
            name: name.into(),
            port,
            health,
            targets: BTreeMap::new(),
        }
    }

    /// Register and attach a target; it starts health-check pending and
    /// receives no traffic
    pub fn register(&mut self, id: TargetId) -> Result<(), PlacementError> {
        if self.targets.contains_key(&id) {
            return Err(PlacementError::DuplicateTarget(id));
        }
        let mut target = Target::new(id.clone());
        let (status, _) = target.status.transition(&TargetCommand::Attach)?;
        target.status = status;
        info!(group = %self.name, target = %id, "target registered");
        self.targets.insert(id, target);
        Ok(())
    }

    /// Record one health-check result
    ///
    /// Counts consecutive outcomes and drives the lifecycle machine when a
    /// threshold is crossed. A single failure below the unhealthy
    /// threshold only resets the pass streak; it never reverts a healthy
    /// target by itself.
    pub fn record_check(&mut self, id: &TargetId, passed: bool) -> Result<TargetStatus, PlacementError> {
        let healthy_threshold = self.health.healthy_threshold;
        let unhealthy_threshold = self.health.unhealthy_threshold;
        let name = self.name.clone();
        let target = self
            .targets
            .get_mut(id)
            .ok_or_else(|| PlacementError::UnknownTarget(id.clone()))?;

        if !target.status.is_active() {
            return Ok(target.status);
        }

        if passed {
            target.consecutive_failures = 0;
            target.consecutive_passes += 1;
            if target.status != TargetStatus::Healthy
                && target.consecutive_passes >= healthy_threshold
            {
                let (status, effect) = target.status.transition(&TargetCommand::MarkHealthy)?;
                target.status = status;
                target.consecutive_passes = 0;
                if effect == TrafficEffect::StartRouting {
                    info!(group = %name, target = %id, "target healthy, routing traffic");
                }
            }
        } else {
            target.consecutive_passes = 0;
            target.consecutive_failures += 1;
            if target.status != TargetStatus::Unhealthy
                && target.consecutive_failures >= unhealthy_threshold
            {
                let (status, effect) = target.status.transition(&TargetCommand::MarkUnhealthy)?;
                target.status = status;
                target.consecutive_failures = 0;
                if effect == TrafficEffect::StopRouting {
                    warn!(group = %name, target = %id, "target unhealthy, traffic stopped");
                }
            }
        }

        Ok(target.status)
    }

    /// Run one round of checks over every active target
    pub async fn run_checks(&mut self, probe: &dyn HealthProbe) -> Result<(), PlacementError> {
        let active: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| t.status.is_active())
            .map(|t| t.id.clone())
            .collect();

        for id in active {
            let passed = tokio::time::timeout(
                self.health.timeout,
                probe.check(&id, &self.health.path),
            )
            .await
            .unwrap_or(false);
            self.record_check(&id, passed)?;
        }
        Ok(())
    }

    /// Begin draining a target; in-flight connections may finish until
    /// `deadline`
    pub fn begin_drain(&mut self, id: &TargetId, deadline: DateTime<Utc>) -> Result<(), PlacementError> {
        let name = self.name.clone();
        let target = self
            .targets
            .get_mut(id)
            .ok_or_else(|| PlacementError::UnknownTarget(id.clone()))?;
        let (status, effect) = target.status.transition(&TargetCommand::Drain)?;
        target.status = status;
        target.drain_deadline = Some(deadline);
        if effect == TrafficEffect::StopRouting {
            info!(group = %name, target = %id, "draining, traffic stopped");
        } else {
            debug!(group = %name, target = %id, "draining");
        }
        Ok(())
    }

    /// Finish a drain early (all connections completed)
    pub fn complete_drain(&mut self, id: &TargetId) -> Result<(), PlacementError> {
        let target = self
            .targets
            .get_mut(id)
            .ok_or_else(|| PlacementError::UnknownTarget(id.clone()))?;
        let (status, _) = target.status.transition(&TargetCommand::DrainComplete)?;
        target.status = status;
        target.drain_deadline = None;
        Ok(())
    }

    /// Force-complete every drain whose deadline has passed
    pub fn expire_drains(&mut self, now: DateTime<Utc>) -> Vec<TargetId> {
        let expired: Vec<TargetId> = self
            .targets
            .values()
            .filter(|t| {
                t.status == TargetStatus::Draining
                    && t.drain_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|t| t.id.clone())
            .collect();

        for id in &expired {
            if let Some(target) = self.targets.get_mut(id) {
                if let Ok((status, _)) = target.status.transition(&TargetCommand::DrainComplete) {
                    warn!(group = %self.name, target = %id, "drain timeout expired, removed");
                    target.status = status;
                    target.drain_deadline = None;
                }
            }
        }
        expired
    }

    /// Targets currently receiving traffic
    pub fn routable(&self) -> Vec<&Target> {
        self.targets
            .values()
            .filter(|t| t.status.is_routable())
            .collect()
    }

    /// Targets counting toward capacity (not draining, not removed)
    pub fn active_count(&self) -> usize {
        self.targets
            .values()
            .filter(|t| t.status.is_active())
            .count()
    }

    /// Healthy target count
    pub fn healthy_count(&self) -> usize {
        self.routable().len()
    }

    /// Look up one target
    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.targets.get(id)
    }

    /// All targets, including draining and removed ones
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }
}

/// What one convergence step decided to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Convergence {
    /// Newly registered targets
    pub registered: Vec<TargetId>,

    /// Targets put into draining
    pub draining: Vec<TargetId>,
}

impl Convergence {
    /// Whether the step changed nothing
    pub fn is_settled(&self) -> bool {
        self.registered.is_empty() && self.draining.is_empty()
    }
}

/// Converges a target group toward a desired replica count
#[derive(Debug, Clone)]
pub struct ServicePlacement {
    /// Service the targets belong to
    pub service: ResourceId,

    group: TargetGroup,
    desired: u32,
    min_healthy_percent: u32,
    max_healthy_percent: u32,
    drain_timeout: Duration,
    seq: u64,
}

impl ServicePlacement {
    /// Create a placement for a service
    pub fn new(
        service: ResourceId,
        group: TargetGroup,
        desired: u32,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            service,
            group,
            desired,
            min_healthy_percent: 100,
            max_healthy_percent: 200,
            drain_timeout,
            seq: 0,
        }
    }

    /// Override the rollout bounds
    pub fn with_healthy_percentages(mut self, min: u32, max: u32) -> Self {
        self.min_healthy_percent = min;
        self.max_healthy_percent = max.max(100);
        self
    }

    /// Change the desired replica count
    pub fn set_desired(&mut self, desired: u32) {
        if self.desired != desired {
            info!(service = %self.service, from = self.desired, to = desired, "desired count changed");
            self.desired = desired;
        }
    }

    /// Current desired replica count
    pub fn desired(&self) -> u32 {
        self.desired
    }

    /// The underlying target group
    pub fn group(&self) -> &TargetGroup {
        &self.group
    }

    /// Mutable access to the group, for recording health checks
    pub fn group_mut(&mut self) -> &mut TargetGroup {
        &mut self.group
    }

    /// One convergence step toward the desired count
    ///
    /// Under-provisioned: registers new targets, bounded so the active set
    /// never exceeds `max_healthy_percent` of desired. Over-provisioned:
    /// drains the excess, never taking the healthy set below
    /// `min_healthy_percent` of desired. Draining everything is allowed
    /// when desired is zero.
    pub fn converge(&mut self, now: DateTime<Utc>) -> Convergence {
        let mut outcome = Convergence::default();

        self.group.expire_drains(now);

        let active = self.group.active_count() as u32;
        let desired = self.desired;

        if active < desired {
            let ceiling = (desired * self.max_healthy_percent / 100).max(desired);
            let room = ceiling.saturating_sub(active);
            let to_register = (desired - active).min(room);
            for _ in 0..to_register {
                self.seq += 1;
                let id = TargetId::new(format!("{}/target-{:04}", self.service, self.seq));
                // The id is fresh by construction
                if self.group.register(id.clone()).is_ok() {
                    outcome.registered.push(id);
                }
            }
        } else if active > desired {
            let min_healthy = (desired * self.min_healthy_percent).div_ceil(100);
            let mut excess = active - desired;
            let deadline =
                now + ChronoDuration::from_std(self.drain_timeout).unwrap_or_else(|_| ChronoDuration::zero());

            // Drain the least valuable targets first; healthy ones go only
            // while the floor holds
            let mut candidates: Vec<(TargetId, TargetStatus)> = self
                .group
                .targets()
                .filter(|t| t.status.is_active())
                .map(|t| (t.id.clone(), t.status))
                .collect();
            candidates.sort_by_key(|(_, status)| match status {
                TargetStatus::Unhealthy => 0,
                TargetStatus::Registering | TargetStatus::HealthCheckPending => 1,
                _ => 2,
            });

            let mut healthy_left = self.group.healthy_count() as u32;
            for (id, status) in candidates {
                if excess == 0 {
                    break;
                }
                if status == TargetStatus::Healthy {
                    if healthy_left <= min_healthy {
                        continue;
                    }
                    healthy_left -= 1;
                }
                if self.group.begin_drain(&id, deadline).is_ok() {
                    outcome.draining.push(id);
                    excess -= 1;
                }
            }
        }

        outcome
    }
}
