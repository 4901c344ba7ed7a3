// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Kind Taxonomy
//!
//! Defines the closed set of resource kinds a deployment can declare, and
//! the attributes each kind requires at declare time. The tables here are
//! the single source of truth the declare-time validators consult.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment resource kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Addressable slice of a network (CIDR range in one availability zone)
    NetworkSegment,
    /// Single ingress or egress allowance attached to a security group
    SecurityRule,
    /// Replicated container service
    ComputeService,
    /// Managed relational store
    DataStore,
    /// Listener plus target group in front of a compute service
    LoadBalancer,
    /// Named value exported for downstream consumers
    Output,
}

impl ResourceKind {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkSegment => "network_segment",
            Self::SecurityRule => "security_rule",
            Self::ComputeService => "compute_service",
            Self::DataStore => "data_store",
            Self::LoadBalancer => "load_balancer",
            Self::Output => "output",
        }
    }

    /// Attributes a declaration of this kind must carry
    pub fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::NetworkSegment => &["network", "cidr", "tier", "availability_zone"],
            Self::SecurityRule => &["direction", "protocol", "port", "source", "destination"],
            Self::ComputeService => &["segment", "security_group", "image", "desired_count"],
            Self::DataStore => &["segment", "security_group", "engine", "database_name"],
            Self::LoadBalancer => &["segment", "security_group", "listener_port"],
            Self::Output => &["name", "value"],
        }
    }

    /// Whether applying this kind goes through the provisioner.
    ///
    /// Outputs are resolved entirely from already-applied state and never
    /// reach the provider.
    pub fn requires_provisioning(&self) -> bool {
        !matches!(self, Self::Output)
    }

    /// Attributes whose values are generated once by the provider and must
    /// survive every later apply pass untouched.
    pub fn credential_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::DataStore => &["master_username", "master_password", "secret_ref"],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
