//! Error types for deployment operations

use thiserror::Error;

use crate::domain::ResourceId;
use crate::reachability::SecurityViolation;

/// Errors that can occur while declaring, ordering, or applying a deployment
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeploymentError {
    /// A required or malformed attribute on a declared resource
    #[error("resource `{resource}`: attribute `{attribute}` {reason}")]
    InvalidAttribute {
        resource: ResourceId,
        attribute: String,
        reason: String,
    },

    /// Resource id collision within one deployment
    #[error("duplicate resource id `{0}`")]
    DuplicateId(ResourceId),

    /// A reference expression names a resource that was never declared
    #[error("resource `{resource}` references undeclared resource `{target}`")]
    UnknownReference {
        resource: ResourceId,
        target: ResourceId,
    },

    /// The declared references form a cycle
    #[error("cyclic dependency: {}", fmt_cycle(.path))]
    CyclicDependency { path: Vec<ResourceId> },

    /// Two outputs claim the same exported name
    #[error("duplicate output name `{name}` (declared by `{first}` and `{second}`)")]
    DuplicateOutput {
        name: String,
        first: ResourceId,
        second: ResourceId,
    },

    /// A reference was resolved before its dependency reached applied state.
    /// This cannot happen under a correct topological order; it indicates an
    /// engine bug, not a user error.
    #[error("internal: resource `{resource}` resolved `{expression}` before its dependency was applied")]
    UnresolvedReference {
        resource: ResourceId,
        expression: String,
    },

    /// A reference names an attribute the applied dependency never produced
    #[error("resource `{resource}`: reference `{expression}` names an attribute the dependency never produced")]
    UnknownAttributePath {
        resource: ResourceId,
        expression: String,
    },

    /// A single resource's create-or-update step failed; retried on the next pass
    #[error("apply failed for `{resource}`: {cause}")]
    ApplyFailure { resource: ResourceId, cause: String },

    /// Post-apply validation found registered targets the resolved
    /// reachability matrix no longer admits
    #[error("{} security violation(s) detected after apply", .violations.len())]
    SecurityViolationDetected { violations: Vec<SecurityViolation> },

    /// An output's source resource never reached applied state
    #[error("output `{name}`: source `{source_id}` never reached applied state")]
    OutputUnresolved { name: String, source_id: ResourceId },
}

/// Result type for deployment operations
pub type DeploymentResult<T> = Result<T, DeploymentError>;

fn fmt_cycle(path: &[ResourceId]) -> String {
    let mut joined = path
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");
    if let Some(first) = path.first() {
        joined.push_str(" -> ");
        joined.push_str(first.as_str());
    }
    joined
}
