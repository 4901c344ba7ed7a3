// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Rule Value Objects
//!
//! Typed form of declared security rules: protocol, port range, direction,
//! and the peer on the far side of the allowance. Rules are additive only;
//! there is no deny rule. The reachability resolver composes these into the
//! effective allow/deny matrix.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::network::CidrBlock;
use crate::domain::resource::ResourceId;

/// Security rule validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Invalid protocol: {0} (must be tcp, udp, or icmp)")]
    InvalidProtocol(String),

    #[error("Invalid direction: {0} (must be ingress or egress)")]
    InvalidDirection(String),

    #[error("Invalid port specification: {0}")]
    InvalidPort(String),

    #[error("Invalid peer: {0}")]
    InvalidPeer(String),

    #[error("Rule {rule} is missing field `{field}`")]
    MissingField { rule: ResourceId, field: &'static str },
}

/// Transport protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }

    /// Whether a connection over this protocol needs a return path, and so
    /// an egress allowance on the source in addition to the destination's
    /// ingress allowance.
    pub fn requires_return_traffic(&self) -> bool {
        matches!(self, Self::Tcp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            other => Err(SecurityError::InvalidProtocol(other.to_string())),
        }
    }
}

/// Direction of a rule relative to the group it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingress" => Ok(Self::Ingress),
            "egress" => Ok(Self::Egress),
            other => Err(SecurityError::InvalidDirection(other.to_string())),
        }
    }
}

/// Inclusive port range
///
/// Invariants:
/// - `from <= to`
/// - Port 0 is not addressable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    from: u16,
    to: u16,
}

impl PortRange {
    /// Create a range with validation
    pub fn new(from: u16, to: u16) -> Result<Self, SecurityError> {
        if from == 0 || from > to {
            return Err(SecurityError::InvalidPort(format!("{from}-{to}")));
        }
        Ok(Self { from, to })
    }

    /// Single-port range
    pub fn single(port: u16) -> Result<Self, SecurityError> {
        Self::new(port, port)
    }

    /// Lowest port in the range
    pub fn from_port(&self) -> u16 {
        self.from
    }

    /// Highest port in the range
    pub fn to_port(&self) -> u16 {
        self.to
    }

    /// Whether the range covers a port
    pub fn contains(&self, port: u16) -> bool {
        port >= self.from && port <= self.to
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

impl FromStr for PortRange {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| SecurityError::InvalidPort(s.to_string()))
        };
        match s.split_once('-') {
            Some((from, to)) => Self::new(parse(from)?, parse(to)?),
            None => Self::single(parse(s)?),
        }
    }
}

/// The far side of a rule: a named group, a CIDR block, or anywhere
///
/// `Anywhere` on an egress rule is the only way a group's outbound policy
/// becomes unrestricted; there is no default-allow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Another named security group
    Group(String),
    /// An address range
    Cidr(CidrBlock),
    /// Any peer (0.0.0.0/0 equivalent)
    Anywhere,
}

impl Peer {
    /// Parse a peer expression: `any`, a CIDR block, or a group name
    pub fn parse(s: &str) -> Result<Self, SecurityError> {
        if s.is_empty() {
            return Err(SecurityError::InvalidPeer(s.to_string()));
        }
        if s == "any" {
            return Ok(Self::Anywhere);
        }
        if s.contains('/') {
            let block = CidrBlock::new(s)
                .map_err(|e| SecurityError::InvalidPeer(format!("{s}: {e}")))?;
            return Ok(Self::Cidr(block));
        }
        Ok(Self::Group(s.to_string()))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(name) => write!(f, "{name}"),
            Self::Cidr(block) => write!(f, "{block}"),
            Self::Anywhere => write!(f, "any"),
        }
    }
}

/// A single security allowance, attached to exactly one group
///
/// For ingress rules the attached group is the declared destination and the
/// peer is the declared source; for egress rules the attached group is the
/// declared source and the peer is the declared destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: Direction,
    pub protocol: Protocol,
    pub ports: PortRange,
    /// Group the rule is attached to
    pub group: String,
    /// Source (ingress) or destination (egress) on the far side
    pub peer: Peer,
}

impl SecurityRule {
    /// Ingress allowance on `group` from `peer`
    pub fn ingress(group: impl Into<String>, peer: Peer, protocol: Protocol, ports: PortRange) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol,
            ports,
            group: group.into(),
            peer,
        }
    }

    /// Egress allowance from `group` to `peer`
    pub fn egress(group: impl Into<String>, peer: Peer, protocol: Protocol, ports: PortRange) -> Self {
        Self {
            direction: Direction::Egress,
            protocol,
            ports,
            group: group.into(),
            peer,
        }
    }

    /// Build the typed rule from a security-rule resource's resolved
    /// attributes (`direction`, `protocol`, `port`, `source`, `destination`)
    pub fn from_resolved(
        rule: &ResourceId,
        attrs: &BTreeMap<String, Value>,
    ) -> Result<Self, SecurityError> {
        let field = |name: &'static str| {
            attrs
                .get(name)
                .ok_or(SecurityError::MissingField {
                    rule: rule.clone(),
                    field: name,
                })
        };
        let str_field = |name: &'static str| {
            field(name)?
                .as_str()
                .map(str::to_string)
                .ok_or(SecurityError::MissingField {
                    rule: rule.clone(),
                    field: name,
                })
        };

        let direction: Direction = str_field("direction")?.parse()?;
        let protocol: Protocol = str_field("protocol")?.parse()?;

        let ports = match field("port")? {
            Value::Number(n) => {
                let port = n
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| SecurityError::InvalidPort(n.to_string()))?;
                PortRange::single(port)?
            }
            Value::String(s) => s.parse()?,
            other => return Err(SecurityError::InvalidPort(other.to_string())),
        };

        let source = str_field("source")?;
        let destination = str_field("destination")?;

        // The attached group is the protected side: the destination for
        // ingress, the source for egress.
        let (group, peer) = match direction {
            Direction::Ingress => (destination, Peer::parse(&source)?),
            Direction::Egress => (source, Peer::parse(&destination)?),
        };

        Ok(Self {
            direction,
            protocol,
            ports,
            group,
            peer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("tcp", Protocol::Tcp; "tcp")]
    #[test_case("udp", Protocol::Udp; "udp")]
    #[test_case("icmp", Protocol::Icmp; "icmp")]
    fn test_protocol_parse(input: &str, expected: Protocol) {
        assert_eq!(input.parse::<Protocol>().unwrap(), expected);
    }

    #[test]
    fn test_only_tcp_needs_return_traffic() {
        assert!(Protocol::Tcp.requires_return_traffic());
        assert!(!Protocol::Udp.requires_return_traffic());
        assert!(!Protocol::Icmp.requires_return_traffic());
    }

    #[test]
    fn test_port_range_validation() {
        assert!(PortRange::new(80, 80).is_ok());
        assert!(PortRange::new(1000, 2000).is_ok());
        assert!(PortRange::new(0, 80).is_err()); // Port 0
        assert!(PortRange::new(2000, 1000).is_err()); // Inverted
    }

    #[test]
    fn test_port_range_parse_forms() {
        assert_eq!("3306".parse::<PortRange>().unwrap(), PortRange::single(3306).unwrap());
        assert_eq!(
            "1000-2000".parse::<PortRange>().unwrap(),
            PortRange::new(1000, 2000).unwrap()
        );
        assert!("eighty".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_peer_parse() {
        assert_eq!(Peer::parse("any").unwrap(), Peer::Anywhere);
        assert_eq!(
            Peer::parse("172.56.165.110/32").unwrap(),
            Peer::Cidr(CidrBlock::new("172.56.165.110/32").unwrap())
        );
        assert_eq!(Peer::parse("app").unwrap(), Peer::Group("app".to_string()));
        assert!(Peer::parse("10.0.0.0/99").is_err());
        assert!(Peer::parse("").is_err());
    }

    #[test]
    fn test_from_resolved_ingress_maps_destination_to_group() {
        let attrs = BTreeMap::from([
            ("direction".to_string(), json!("ingress")),
            ("protocol".to_string(), json!("tcp")),
            ("port".to_string(), json!(3306)),
            ("source".to_string(), json!("app")),
            ("destination".to_string(), json!("db")),
        ]);

        let rule = SecurityRule::from_resolved(&"db-from-app".into(), &attrs).unwrap();
        assert_eq!(rule.group, "db");
        assert_eq!(rule.peer, Peer::Group("app".to_string()));
        assert!(rule.ports.contains(3306));
    }

    #[test]
    fn test_from_resolved_egress_maps_source_to_group() {
        let attrs = BTreeMap::from([
            ("direction".to_string(), json!("egress")),
            ("protocol".to_string(), json!("tcp")),
            ("port".to_string(), json!("1-65535")),
            ("source".to_string(), json!("mgmt")),
            ("destination".to_string(), json!("any")),
        ]);

        let rule = SecurityRule::from_resolved(&"mgmt-egress".into(), &attrs).unwrap();
        assert_eq!(rule.group, "mgmt");
        assert_eq!(rule.peer, Peer::Anywhere);
    }

    #[test]
    fn test_from_resolved_missing_field() {
        let attrs = BTreeMap::from([
            ("direction".to_string(), json!("ingress")),
            ("protocol".to_string(), json!("tcp")),
            ("port".to_string(), json!(22)),
            ("source".to_string(), json!("any")),
        ]);

        let err = SecurityRule::from_resolved(&"rule".into(), &attrs).unwrap_err();
        assert!(matches!(err, SecurityError::MissingField { field: "destination", .. }));
    }
}
