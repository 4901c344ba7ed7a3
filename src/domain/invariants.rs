// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Declaration Invariants
//!
//! All declare-time business rules for deployment resources. Every function
//! here is pure (no I/O, no mutation) and reports failures through the
//! deployment error taxonomy.
//!
//! # Invariant Categories
//!
//! 1. **Structural**: required attributes present per kind
//! 2. **Value**: attribute literals parse into their value objects
//! 3. **Topology**: sibling network segments do not overlap

use serde_json::Value;

use crate::domain::kind::ResourceKind;
use crate::domain::network::{CidrBlock, Tier};
use crate::domain::resource::{AttrValue, Resource, ResourceId};
use crate::domain::security::{Direction, PortRange, Protocol};
use crate::errors::{DeploymentError, DeploymentResult};

/// Composite declare-time validation for one resource against everything
/// declared before it.
pub fn validate_declaration(resource: &Resource, earlier: &[Resource]) -> DeploymentResult<()> {
    validate_required_attributes(resource)?;

    match resource.kind {
        ResourceKind::NetworkSegment => validate_segment(resource, earlier),
        ResourceKind::SecurityRule => validate_security_rule(resource),
        ResourceKind::ComputeService => validate_compute_service(resource),
        ResourceKind::LoadBalancer => validate_port_attribute(resource, "listener_port"),
        ResourceKind::Output => validate_output(resource),
        ResourceKind::DataStore => Ok(()),
    }
}

/// Every required attribute for the resource's kind must be present
pub fn validate_required_attributes(resource: &Resource) -> DeploymentResult<()> {
    for required in resource.kind.required_attributes() {
        if !resource.attributes.contains_key(*required) {
            return Err(missing(resource, required));
        }
    }
    Ok(())
}

/// Segment invariants: literal CIDR and tier parse, and the CIDR does not
/// overlap any sibling segment of the same network.
///
/// Attributes supplied as references cannot be checked until apply time and
/// are skipped here.
fn validate_segment(resource: &Resource, earlier: &[Resource]) -> DeploymentResult<()> {
    if let Some(tier) = literal_str(resource, "tier") {
        tier.parse::<Tier>()
            .map_err(|e| invalid(resource, "tier", &e.to_string()))?;
    }

    let Some(cidr) = literal_str(resource, "cidr") else {
        return Ok(());
    };
    let cidr = CidrBlock::new(cidr).map_err(|e| invalid(resource, "cidr", &e.to_string()))?;

    let Some(network) = literal_str(resource, "network") else {
        return Ok(());
    };

    if let Some((sibling, other)) = overlapping_sibling(network, &cidr, earlier) {
        return Err(invalid(
            resource,
            "cidr",
            &format!("overlaps sibling segment `{sibling}` ({other})"),
        ));
    }
    Ok(())
}

/// Find a previously declared segment of the same network whose CIDR
/// overlaps the candidate block.
pub fn overlapping_sibling<'a>(
    network: &str,
    cidr: &CidrBlock,
    earlier: &'a [Resource],
) -> Option<(&'a ResourceId, CidrBlock)> {
    earlier
        .iter()
        .filter(|r| r.kind == ResourceKind::NetworkSegment)
        .filter(|r| literal_str(r, "network") == Some(network))
        .filter_map(|r| {
            let other = CidrBlock::new(literal_str(r, "cidr")?).ok()?;
            other.overlaps(cidr).then_some((&r.id, other))
        })
        .next()
}

/// Rule invariants: direction, protocol, and port literals parse
fn validate_security_rule(resource: &Resource) -> DeploymentResult<()> {
    if let Some(direction) = literal_str(resource, "direction") {
        direction
            .parse::<Direction>()
            .map_err(|e| invalid(resource, "direction", &e.to_string()))?;
    }
    if let Some(protocol) = literal_str(resource, "protocol") {
        protocol
            .parse::<Protocol>()
            .map_err(|e| invalid(resource, "protocol", &e.to_string()))?;
    }
    validate_port_attribute(resource, "port")
}

/// Service invariants: desired count is a non-negative integer literal
fn validate_compute_service(resource: &Resource) -> DeploymentResult<()> {
    match resource.attribute("desired_count").and_then(AttrValue::as_literal) {
        None => Ok(()),
        Some(Value::Number(n)) if n.as_u64().is_some() => Ok(()),
        Some(other) => Err(invalid(
            resource,
            "desired_count",
            &format!("must be a non-negative integer, got {other}"),
        )),
    }
}

/// Output invariants: the exported name is a literal string, known before
/// any resource is touched, so collisions can fail the pass up front.
fn validate_output(resource: &Resource) -> DeploymentResult<()> {
    match resource.attribute("name") {
        Some(value) if value.as_str().is_some() => Ok(()),
        Some(_) => Err(invalid(resource, "name", "must be a literal string")),
        None => Err(missing(resource, "name")),
    }
}

/// A port attribute, when literal, must be a valid port number or range
fn validate_port_attribute(resource: &Resource, attribute: &str) -> DeploymentResult<()> {
    match resource.attribute(attribute).and_then(AttrValue::as_literal) {
        None => Ok(()),
        Some(Value::Number(n)) => {
            n.as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .filter(|&p| p > 0)
                .ok_or_else(|| invalid(resource, attribute, &format!("is not a valid port: {n}")))?;
            Ok(())
        }
        Some(Value::String(s)) => {
            s.parse::<PortRange>()
                .map_err(|e| invalid(resource, attribute, &e.to_string()))?;
            Ok(())
        }
        Some(other) => Err(invalid(
            resource,
            attribute,
            &format!("is not a valid port: {other}"),
        )),
    }
}

fn literal_str<'a>(resource: &'a Resource, name: &str) -> Option<&'a str> {
    resource.attribute(name).and_then(AttrValue::as_str)
}

fn missing(resource: &Resource, attribute: &str) -> DeploymentError {
    DeploymentError::InvalidAttribute {
        resource: resource.id.clone(),
        attribute: attribute.to_string(),
        reason: "is required but missing".to_string(),
    }
}

fn invalid(resource: &Resource, attribute: &str, reason: &str) -> DeploymentError {
    DeploymentError::InvalidAttribute {
        resource: resource.id.clone(),
        attribute: attribute.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::Deployment;
    use serde_json::json;

    fn segment(network: &str, cidr: &str) -> Vec<(&'static str, AttrValue)> {
        vec![
            ("network", AttrValue::literal(network.to_string())),
            ("cidr", AttrValue::literal(cidr.to_string())),
            ("tier", AttrValue::literal("private")),
            ("availability_zone", AttrValue::literal("us-east-1a")),
        ]
    }

    #[test]
    fn test_sibling_overlap_rejected() {
        let mut deployment = Deployment::new();
        deployment
            .declare("a", ResourceKind::NetworkSegment, segment("core", "10.0.0.0/24"))
            .unwrap();

        let err = deployment
            .declare("b", ResourceKind::NetworkSegment, segment("core", "10.0.0.128/25"))
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::InvalidAttribute { attribute, .. } if attribute == "cidr"
        ));
    }

    #[test]
    fn test_disjoint_siblings_accepted() {
        let mut deployment = Deployment::new();
        deployment
            .declare("a", ResourceKind::NetworkSegment, segment("core", "10.0.0.0/24"))
            .unwrap();
        deployment
            .declare("b", ResourceKind::NetworkSegment, segment("core", "10.0.1.0/24"))
            .unwrap();
    }

    #[test]
    fn test_overlap_across_networks_allowed() {
        let mut deployment = Deployment::new();
        deployment
            .declare("a", ResourceKind::NetworkSegment, segment("core", "10.0.0.0/24"))
            .unwrap();
        // Same range, different network: not siblings
        deployment
            .declare("b", ResourceKind::NetworkSegment, segment("edge", "10.0.0.0/24"))
            .unwrap();
    }

    #[test]
    fn test_bad_tier_rejected() {
        let mut deployment = Deployment::new();
        let err = deployment
            .declare(
                "a",
                ResourceKind::NetworkSegment,
                vec![
                    ("network", AttrValue::literal("core")),
                    ("cidr", AttrValue::literal("10.0.0.0/24")),
                    ("tier", AttrValue::literal("dmz")),
                    ("availability_zone", AttrValue::literal("us-east-1a")),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::InvalidAttribute { attribute, .. } if attribute == "tier"
        ));
    }

    #[test]
    fn test_rule_port_validation() {
        let mut deployment = Deployment::new();
        let err = deployment
            .declare(
                "rule",
                ResourceKind::SecurityRule,
                vec![
                    ("direction", AttrValue::literal("ingress")),
                    ("protocol", AttrValue::literal("tcp")),
                    ("port", AttrValue::literal(json!(0))),
                    ("source", AttrValue::literal("app")),
                    ("destination", AttrValue::literal("db")),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::InvalidAttribute { attribute, .. } if attribute == "port"
        ));
    }

    #[test]
    fn test_output_name_must_be_literal() {
        let mut deployment = Deployment::new();
        let err = deployment
            .declare(
                "out",
                ResourceKind::Output,
                vec![
                    ("name", AttrValue::reference("lb", "dns_name")),
                    ("value", AttrValue::reference("lb", "dns_name")),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::InvalidAttribute { attribute, .. } if attribute == "name"
        ));
    }

    #[test]
    fn test_desired_count_must_be_integer() {
        let mut deployment = Deployment::new();
        let err = deployment
            .declare(
                "svc",
                ResourceKind::ComputeService,
                vec![
                    ("segment", AttrValue::literal("seg")),
                    ("security_group", AttrValue::literal("app")),
                    ("image", AttrValue::literal("repo/app:1")),
                    ("desired_count", AttrValue::literal("two")),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::InvalidAttribute { attribute, .. } if attribute == "desired_count"
        ));
    }
}
