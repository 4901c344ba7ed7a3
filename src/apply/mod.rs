// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topological Apply Engine
//!
//! Reconciles declared desired state with applied state, one pass per
//! invocation. Resources are processed in dependency order with bounded
//! concurrency: everything whose dependencies have reached applied state
//! may run at once, and a step blocked on the provider is a suspension
//! point that never stalls independent branches.
//!
//! # Pass Semantics
//!
//! For each resource, in topological order:
//! 1. Resolve reference expressions against already-applied state (pure).
//! 2. Diff against the last applied desired state; unchanged resources are
//!    no-ops.
//! 3. Create or update through the [`Provisioner`] and publish the
//!    concrete attributes, unblocking dependents.
//!
//! A failed step fails only its own resource; dependents are skipped and
//! the rest of the graph keeps going. The report enumerates every
//! resource's terminal status - silent partial success is not a thing.
//! Re-running a pass over a partial result resumes it: applied, unchanged
//! resources no-op and failed or skipped ones are retried.
//!
//! Cancellation is honored between steps. In-flight provider calls are
//! never aborted; killing one could leave the remote resource in an
//! undefined state.

pub mod provisioner;
pub mod state;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ApplyConfig;
use crate::domain::{Deployment, Resource, ResourceId, ResourceKind, SecurityRule};
use crate::errors::{DeploymentError, DeploymentResult};
use crate::events::{ApplyEvent, SkipReason, StepOutcome};
use crate::graph::DependencyGraph;
use crate::reachability::{self, ReachabilityMatrix, SecurityViolation, TargetRegistration};
use crate::resolve::resolve_attributes;

pub use provisioner::{InMemoryProvisioner, ProvisionError, Provisioner};
pub use state::{AppliedResource, AppliedSet};

/// Everything a pass produced: applied state, per-resource outcomes, the
/// event trail, and the post-apply security validation result
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Applied state after the pass; feed it into the next pass
    pub state: AppliedSet,

    /// Terminal outcome of every declared resource
    statuses: BTreeMap<ResourceId, StepOutcome>,

    /// Step events in completion order
    pub events: Vec<ApplyEvent>,

    /// Reachability matrix resolved from the applied security rules
    pub matrix: ReachabilityMatrix,

    /// Target registrations the matrix no longer admits
    pub violations: Vec<SecurityViolation>,
}

impl ApplyReport {
    /// Outcome of one resource
    pub fn status(&self, id: &ResourceId) -> Option<&StepOutcome> {
        self.statuses.get(id)
    }

    /// Ids that reached applied state, in id order
    pub fn applied_ids(&self) -> Vec<&ResourceId> {
        self.ids_where(StepOutcome::is_applied)
    }

    /// Ids whose step failed, in id order
    pub fn failed_ids(&self) -> Vec<&ResourceId> {
        self.ids_where(|o| matches!(o, StepOutcome::Failed { .. }))
    }

    /// Ids that were never attempted, in id order
    pub fn skipped_ids(&self) -> Vec<&ResourceId> {
        self.ids_where(|o| matches!(o, StepOutcome::Skipped { .. }))
    }

    /// Whether every resource reached applied state
    pub fn is_complete(&self) -> bool {
        self.statuses.values().all(StepOutcome::is_applied)
    }

    /// Number of steps that performed an actual create or update
    pub fn changed_count(&self) -> usize {
        self.statuses.values().filter(|o| o.changed()).count()
    }

    /// Promote recorded security violations into an error
    pub fn ensure_secure(&self) -> DeploymentResult<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(DeploymentError::SecurityViolationDetected {
                violations: self.violations.clone(),
            })
        }
    }

    fn ids_where(&self, predicate: impl Fn(&StepOutcome) -> bool) -> Vec<&ResourceId> {
        self.statuses
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .map(|(id, _)| id)
            .collect()
    }
}

/// One completed provider call: arena index, identity, the desired state
/// that was sent, and what came back
type StepDone = (
    usize,
    ResourceId,
    ResourceKind,
    BTreeMap<String, Value>,
    Result<BTreeMap<String, Value>, ProvisionError>,
);

type StepFuture = Pin<Box<dyn Future<Output = StepDone> + Send>>;

/// The apply engine
///
/// Owns the provisioner handle and the run configuration; everything else
/// is per-pass state. One engine value is meant to be scoped to one
/// deployment run and passed where needed - there is no global client.
pub struct ApplyEngine {
    provisioner: Arc<dyn Provisioner>,
    config: ApplyConfig,
}

impl ApplyEngine {
    /// Create an engine over a provisioner
    pub fn new(provisioner: Arc<dyn Provisioner>, config: ApplyConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    /// Run one deployment pass
    ///
    /// `prior` is the applied state of the previous pass (empty on the
    /// first). Structural problems have already been rejected by
    /// [`DependencyGraph::build`]; the only fatal error left is
    /// `UnresolvedReference`, which signals an engine bug.
    pub async fn apply(
        &self,
        deployment: &Deployment,
        graph: &DependencyGraph,
        prior: &AppliedSet,
        cancel: Option<&CancellationToken>,
    ) -> DeploymentResult<ApplyReport> {
        let resources = deployment.resources();
        let n = resources.len();

        let mut pass = Pass {
            outcomes: vec![None; n],
            remaining: (0..n).map(|i| graph.dependencies_of(i).len()).collect(),
            ready: (0..n).filter(|&i| graph.dependencies_of(i).is_empty()).collect(),
            state: prior.clone(),
            events: Vec::new(),
        };
        let mut in_flight: FuturesUnordered<StepFuture> = FuturesUnordered::new();

        loop {
            let cancelled = cancel.map_or(false, |c| c.is_cancelled());

            if !cancelled {
                self.start_ready(deployment, graph, &mut pass, &mut in_flight)?;
            }

            if in_flight.is_empty() {
                break;
            }

            // Safe boundary: exactly one step completes per turn of the loop
            let Some((idx, id, kind, desired, result)) = in_flight.next().await else {
                continue;
            };

            match result {
                Ok(attributes) => {
                    info!(resource = %id, kind = %kind, "applied");
                    pass.state.publish(AppliedResource {
                        resource: id.clone(),
                        kind,
                        desired,
                        attributes,
                        applied_at: Utc::now(),
                    });
                    pass.finish(idx, id, StepOutcome::Applied { changed: true });
                    pass.unblock(graph, idx);
                }
                Err(error) => {
                    warn!(resource = %id, error = %error, "apply step failed");
                    pass.finish(
                        idx,
                        id.clone(),
                        StepOutcome::Failed {
                            cause: error.to_string(),
                        },
                    );
                    pass.skip_dependents(deployment, graph, idx, &id);
                }
            }
        }

        // Whatever is still unmarked was reached neither by a completion
        // nor by failure propagation: the pass was cancelled under it.
        for idx in 0..n {
            if pass.outcomes[idx].is_none() {
                let id = resources[idx].id.clone();
                debug!(resource = %id, "skipped: pass cancelled");
                pass.finish(
                    idx,
                    id,
                    StepOutcome::Skipped {
                        reason: SkipReason::Cancelled,
                    },
                );
            }
        }

        let (matrix, violations) = validate_security(deployment, &pass.state);

        let statuses = pass
            .outcomes
            .into_iter()
            .enumerate()
            .map(|(idx, outcome)| {
                // The sweep above marked every remaining resource
                let outcome = outcome.unwrap_or(StepOutcome::Skipped {
                    reason: SkipReason::Cancelled,
                });
                (resources[idx].id.clone(), outcome)
            })
            .collect();

        Ok(ApplyReport {
            state: pass.state,
            statuses,
            events: pass.events,
            matrix,
            violations,
        })
    }

    /// Start steps for every ready resource, in declaration order, up to
    /// the concurrency bound. No-ops and outputs complete inline and can
    /// make more resources ready, so this loops until the bound is hit or
    /// nothing is ready.
    fn start_ready(
        &self,
        deployment: &Deployment,
        graph: &DependencyGraph,
        pass: &mut Pass,
        in_flight: &mut FuturesUnordered<StepFuture>,
    ) -> DeploymentResult<()> {
        while in_flight.len() < self.config.max_concurrency {
            let Some(&idx) = pass.ready.iter().next() else {
                break;
            };
            pass.ready.remove(&idx);
            if pass.outcomes[idx].is_some() {
                continue;
            }

            let resource = &deployment.resources()[idx];
            let resolved = match resolve_attributes(resource, &pass.state) {
                Ok(resolved) => resolved,
                Err(err @ DeploymentError::UnresolvedReference { .. }) => return Err(err),
                Err(err) => {
                    // A bad attribute path is the resource's own failure,
                    // not the engine's
                    let id = resource.id.clone();
                    warn!(resource = %id, error = %err, "apply step failed");
                    pass.finish(
                        idx,
                        id.clone(),
                        StepOutcome::Failed {
                            cause: err.to_string(),
                        },
                    );
                    pass.skip_dependents(deployment, graph, idx, &id);
                    continue;
                }
            };

            // Idempotence: unchanged desired state never reaches the provider
            let unchanged = pass
                .state
                .get(&resource.id)
                .is_some_and(|record| record.desired == resolved);
            if unchanged {
                debug!(resource = %resource.id, "unchanged, no-op");
                pass.finish(idx, resource.id.clone(), StepOutcome::Applied { changed: false });
                pass.unblock(graph, idx);
                continue;
            }

            // Outputs are resolved entirely from applied state
            if !resource.kind.requires_provisioning() {
                info!(resource = %resource.id, "output resolved");
                pass.state.publish(AppliedResource {
                    resource: resource.id.clone(),
                    kind: resource.kind,
                    desired: resolved.clone(),
                    attributes: resolved,
                    applied_at: Utc::now(),
                });
                pass.finish(idx, resource.id.clone(), StepOutcome::Applied { changed: true });
                pass.unblock(graph, idx);
                continue;
            }

            in_flight.push(self.launch_step(idx, resource, resolved, pass.state.get(&resource.id).cloned()));
        }
        Ok(())
    }

    /// Build the provider-call future for one resource step
    fn launch_step(
        &self,
        idx: usize,
        resource: &Resource,
        desired: BTreeMap<String, Value>,
        current: Option<AppliedResource>,
    ) -> StepFuture {
        let provisioner = Arc::clone(&self.provisioner);
        let id = resource.id.clone();
        let kind = resource.kind;

        Box::pin(async move {
            let result = match &current {
                None => provisioner.create(&id, kind, &desired).await,
                Some(record) => {
                    provisioner
                        .update(&id, kind, &desired, &record.attributes)
                        .await
                }
            };

            // Credentials are generated exactly once. Whatever the provider
            // returned, the previously recorded credential attributes win.
            let result = result.map(|mut attributes| {
                if let Some(record) = &current {
                    for key in kind.credential_attributes() {
                        if let Some(value) = record.attributes.get(*key) {
                            attributes.insert((*key).to_string(), value.clone());
                        }
                    }
                }
                attributes
            });

            (idx, id, kind, desired, result)
        })
    }
}

/// Mutable per-pass bookkeeping
struct Pass {
    outcomes: Vec<Option<StepOutcome>>,
    remaining: Vec<usize>,
    ready: BTreeSet<usize>,
    state: AppliedSet,
    events: Vec<ApplyEvent>,
}

impl Pass {
    fn finish(&mut self, idx: usize, id: ResourceId, outcome: StepOutcome) {
        self.events.push(ApplyEvent::record(id, outcome.clone()));
        self.outcomes[idx] = Some(outcome);
    }

    /// A resource reached applied state; its dependents lose one blocker
    fn unblock(&mut self, graph: &DependencyGraph, idx: usize) {
        for &dependent in graph.dependents_of(idx) {
            if self.outcomes[dependent].is_some() {
                continue;
            }
            self.remaining[dependent] -= 1;
            if self.remaining[dependent] == 0 {
                self.ready.insert(dependent);
            }
        }
    }

    /// A resource terminally failed; everything downstream of it is
    /// skipped, transitively, attributed to the originating failure
    fn skip_dependents(
        &mut self,
        deployment: &Deployment,
        graph: &DependencyGraph,
        failed_idx: usize,
        failed_id: &ResourceId,
    ) {
        let mut queue: VecDeque<usize> = graph.dependents_of(failed_idx).iter().copied().collect();
        while let Some(idx) = queue.pop_front() {
            if self.outcomes[idx].is_some() {
                continue;
            }
            let id = deployment.resources()[idx].id.clone();
            debug!(resource = %id, blocked_on = %failed_id, "skipped");
            self.finish(
                idx,
                id,
                StepOutcome::Skipped {
                    reason: SkipReason::DependencyFailed {
                        dependency: failed_id.clone(),
                    },
                },
            );
            self.ready.remove(&idx);
            queue.extend(graph.dependents_of(idx));
        }
    }
}

/// Re-resolve the reachability matrix from applied security rules and
/// re-validate every load-balancer target registration against it.
///
/// Violations are reported, never silently dropped, and never roll back
/// already-applied resources.
fn validate_security(
    deployment: &Deployment,
    state: &AppliedSet,
) -> (ReachabilityMatrix, Vec<SecurityViolation>) {
    let mut rules = Vec::new();
    for resource in deployment.of_kind(ResourceKind::SecurityRule) {
        let Some(record) = state.get(&resource.id) else {
            continue;
        };
        match SecurityRule::from_resolved(&resource.id, &record.attributes) {
            Ok(rule) => rules.push(rule),
            Err(error) => {
                warn!(resource = %resource.id, error = %error, "unparseable applied security rule");
            }
        }
    }
    let matrix = reachability::resolve(&rules);

    let registrations = target_registrations(deployment, state);
    let violations = reachability::validate_registrations(&matrix, &registrations);
    for violation in &violations {
        warn!(%violation, "security violation detected");
    }

    (matrix, violations)
}

/// Derive the load balancer -> compute service registrations present in
/// the applied topology
fn target_registrations(deployment: &Deployment, state: &AppliedSet) -> Vec<TargetRegistration> {
    let mut registrations = Vec::new();

    for balancer in deployment.of_kind(ResourceKind::LoadBalancer) {
        if !state.contains(&balancer.id) {
            continue;
        }
        let Some(target) = balancer.attribute("target_service") else {
            continue;
        };
        let Some(service_id) = target.reference_target() else {
            continue;
        };
        let Some(service) = deployment.get(service_id) else {
            continue;
        };
        if !state.contains(service_id) {
            continue;
        }

        let Some(source_group) = balancer.literal_str("security_group") else {
            continue;
        };
        let Some(target_group) = service.literal_str("security_group") else {
            continue;
        };
        let port = balancer
            .attribute("target_port")
            .or_else(|| service.attribute("container_port"))
            .and_then(|v| v.as_literal())
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(80);

        registrations.push(TargetRegistration {
            load_balancer: balancer.id.clone(),
            service: service_id.clone(),
            source_group: source_group.to_string(),
            target_group: target_group.to_string(),
            port,
        });
    }

    registrations
}
