// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Domain Models
//!
//! Core domain concepts for the declarative topology: the resource kind
//! taxonomy, the deployment arena, and the value objects attribute literals
//! parse into.
//!
//! # Value Objects with Invariants
//!
//! - [`CidrBlock`] - IPv4 range in canonical CIDR form
//! - [`Tier`] - public/private visibility of a segment
//! - [`PortRange`] - inclusive, non-zero port span
//! - [`Protocol`] / [`Direction`] / [`Peer`] - security rule vocabulary
//! - [`ResourceKind`] - the closed resource taxonomy
//!
//! # Entities
//!
//! - [`Resource`] - one declared unit of infrastructure
//! - [`Deployment`] - the arena of declared resources, the system's sole
//!   configuration surface

pub mod invariants;
pub mod kind;
pub mod network;
pub mod resource;
pub mod security;

// Re-export value objects
pub use kind::ResourceKind;
pub use network::{CidrBlock, NetworkError, Tier};
pub use resource::{AttrValue, Deployment, Resource, ResourceId};
pub use security::{
    Direction, Peer, PortRange, Protocol, SecurityError, SecurityRule,
};
