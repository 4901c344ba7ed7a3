//! Declarative topology model and apply engine for small web-service stacks
//!
//! A deployment is declared as typed resources with cross-references
//! (network segment -> security rule -> compute service -> load balancer ->
//! data store -> output). This crate determines a valid creation/update
//! order over those references, applies each resource idempotently with
//! bounded concurrency, propagates generated identifiers into dependents,
//! resolves the effective security reachability matrix, and gates
//! load-balancer targets on health checks before they receive traffic.
//!
//! # Flow
//!
//! ```text
//! Deployment::declare  ->  DependencyGraph::build  ->  ApplyEngine::apply
//!        |                        |                          |
//!   per-kind validation      cycle detection          resolve -> diff ->
//!   (InvalidAttribute,       (CyclicDependency)       create-or-update,
//!    DuplicateId)                                     partial failure
//!                                                     isolation
//!                                                          |
//!                                       outputs::collect + ReachabilityMatrix
//! ```

pub mod apply;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod events;
pub mod graph;
pub mod outputs;
pub mod placement;
pub mod reachability;
pub mod resolve;
pub mod state_machine;

// Re-export commonly used types
pub use apply::{ApplyEngine, ApplyReport, AppliedResource, AppliedSet, InMemoryProvisioner, ProvisionError, Provisioner};
pub use config::ApplyConfig;
pub use credentials::{BackoffPolicy, CredentialsError, DbCredentials, SecretRef, SecretsProvider};
pub use domain::{AttrValue, Deployment, Resource, ResourceId, ResourceKind};
pub use errors::{DeploymentError, DeploymentResult};
pub use events::{ApplyEvent, SkipReason, StepOutcome};
pub use graph::DependencyGraph;
pub use placement::{HealthCheckSpec, ServicePlacement, TargetGroup, TargetId};
pub use reachability::{ReachabilityMatrix, SecurityViolation, TargetRegistration};
pub use state_machine::target_lifecycle::TargetStatus;
