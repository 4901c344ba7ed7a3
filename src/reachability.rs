// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Topology Resolver
//!
//! Composes declared security rules into the effective reachability
//! matrix: the allow/deny decision for every (source, destination, port,
//! protocol) tuple. The default is deny. A connection is allowed only when
//! an explicit ingress rule on the destination matches the source,
//! protocol, and port - and, for protocols that need return traffic, the
//! source's egress policy permits the destination or is unrestricted. A
//! group's egress is unrestricted until its first egress rule is declared;
//! from then on only the declared allowances hold.
//!
//! Rules are additive; removing a rule removes an allowance. Ingress has
//! no default-allow of any kind.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::domain::{Direction, Peer, PortRange, Protocol, ResourceId, SecurityRule};

/// One compiled allowance
#[derive(Debug, Clone, PartialEq, Eq)]
struct Allowance {
    peer: Peer,
    protocol: Protocol,
    ports: PortRange,
}

impl Allowance {
    fn matches_group(&self, group: &str, port: u16, protocol: Protocol) -> bool {
        if self.protocol != protocol || !self.ports.contains(port) {
            return false;
        }
        match &self.peer {
            Peer::Anywhere => true,
            Peer::Group(name) => name == group,
            Peer::Cidr(_) => false,
        }
    }

    fn matches_address(&self, addr: Ipv4Addr, port: u16, protocol: Protocol) -> bool {
        if self.protocol != protocol || !self.ports.contains(port) {
            return false;
        }
        match &self.peer {
            Peer::Anywhere => true,
            Peer::Cidr(block) => block.contains(addr),
            Peer::Group(_) => false,
        }
    }
}

/// Resolved allow/deny decisions over the declared rule set
#[derive(Debug, Clone, Default)]
pub struct ReachabilityMatrix {
    /// Ingress allowances keyed by destination group
    ingress: HashMap<String, Vec<Allowance>>,
    /// Egress allowances keyed by source group
    egress: HashMap<String, Vec<Allowance>>,
}

/// Compose the matrix from a rule set
pub fn resolve(rules: &[SecurityRule]) -> ReachabilityMatrix {
    let mut matrix = ReachabilityMatrix::default();
    for rule in rules {
        let allowance = Allowance {
            peer: rule.peer.clone(),
            protocol: rule.protocol,
            ports: rule.ports,
        };
        let side = match rule.direction {
            Direction::Ingress => &mut matrix.ingress,
            Direction::Egress => &mut matrix.egress,
        };
        side.entry(rule.group.clone()).or_default().push(allowance);
    }
    matrix
}

impl ReachabilityMatrix {
    /// May `source_group` reach `destination_group` on `port`/`protocol`?
    ///
    /// Requires a matching ingress allowance on the destination, plus - for
    /// protocols needing return traffic - a matching egress allowance on
    /// the source (to the destination group or to anywhere).
    pub fn allows_from_group(
        &self,
        source_group: &str,
        destination_group: &str,
        port: u16,
        protocol: Protocol,
    ) -> bool {
        let inbound = self
            .ingress
            .get(destination_group)
            .is_some_and(|allowances| {
                allowances
                    .iter()
                    .any(|a| a.matches_group(source_group, port, protocol))
            });
        if !inbound {
            return false;
        }
        if !protocol.requires_return_traffic() {
            return true;
        }
        self.egress_permits(source_group, destination_group, port, protocol)
    }

    /// May traffic from `addr` reach `destination_group` on `port`/`protocol`?
    ///
    /// For external addresses only the destination's ingress rules decide;
    /// there is no local egress policy to consult.
    pub fn allows_from_address(
        &self,
        addr: Ipv4Addr,
        destination_group: &str,
        port: u16,
        protocol: Protocol,
    ) -> bool {
        self.ingress
            .get(destination_group)
            .is_some_and(|allowances| {
                allowances
                    .iter()
                    .any(|a| a.matches_address(addr, port, protocol))
            })
    }

    /// Whether the source group's egress policy permits the destination
    /// group on the given port
    ///
    /// A group with no declared egress rules is unrestricted; declaring
    /// one narrows the group to its declared allowances.
    fn egress_permits(
        &self,
        source_group: &str,
        destination_group: &str,
        port: u16,
        protocol: Protocol,
    ) -> bool {
        match self.egress.get(source_group) {
            None => true,
            Some(allowances) => allowances
                .iter()
                .any(|a| a.matches_group(destination_group, port, protocol)),
        }
    }

    /// Groups that appear as an ingress destination
    pub fn destination_groups(&self) -> impl Iterator<Item = &str> {
        self.ingress.keys().map(String::as_str)
    }
}

/// A compute service registered as a load-balancer target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistration {
    /// Load balancer owning the target group
    pub load_balancer: ResourceId,
    /// Registered compute service
    pub service: ResourceId,
    /// Security group traffic originates from
    pub source_group: String,
    /// Security group protecting the target
    pub target_group: String,
    /// Traffic port
    pub port: u16,
}

/// A registration the resolved matrix no longer admits
///
/// Produced by post-apply validation; tightening a destination's inbound
/// set must flag orphaned registrations instead of failing silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityViolation {
    pub registration: TargetRegistration,
    pub reason: String,
}

impl fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target `{}` behind `{}`: {}",
            self.registration.service, self.registration.load_balancer, self.reason
        )
    }
}

/// Re-validate every registration against the matrix
pub fn validate_registrations(
    matrix: &ReachabilityMatrix,
    registrations: &[TargetRegistration],
) -> Vec<SecurityViolation> {
    registrations
        .iter()
        .filter(|r| {
            !matrix.allows_from_group(&r.source_group, &r.target_group, r.port, Protocol::Tcp)
        })
        .map(|r| SecurityViolation {
            registration: r.clone(),
            reason: format!(
                "no reachability from group `{}` to group `{}` on tcp/{}",
                r.source_group, r.target_group, r.port
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CidrBlock;

    fn port(p: u16) -> PortRange {
        PortRange::single(p).unwrap()
    }

    fn web_rules() -> Vec<SecurityRule> {
        vec![
            // Internet may reach the balancer on 80
            SecurityRule::ingress("alb", Peer::Anywhere, Protocol::Tcp, port(80)),
            // Balancer may reach the app tier on 80, and its egress is open
            SecurityRule::ingress("app", Peer::Group("alb".into()), Protocol::Tcp, port(80)),
            SecurityRule::egress("alb", Peer::Anywhere, Protocol::Tcp, PortRange::new(1, 65535).unwrap()),
            // App tier may reach the store on 3306; app egress is open
            SecurityRule::ingress("db", Peer::Group("app".into()), Protocol::Tcp, port(3306)),
            SecurityRule::egress("app", Peer::Anywhere, Protocol::Tcp, PortRange::new(1, 65535).unwrap()),
        ]
    }

    #[test]
    fn test_default_deny() {
        let matrix = resolve(&[]);
        assert!(!matrix.allows_from_group("app", "db", 3306, Protocol::Tcp));
        assert!(!matrix.allows_from_address("203.0.113.9".parse().unwrap(), "db", 3306, Protocol::Tcp));
    }

    #[test]
    fn test_no_ingress_rule_denies_every_source_and_port() {
        let matrix = resolve(&web_rules());
        for source in ["alb", "app", "mgmt", "unknown"] {
            for p in [22, 80, 443, 3306, 8080] {
                assert!(!matrix.allows_from_group(source, "cache", p, Protocol::Tcp));
            }
        }
    }

    #[test]
    fn test_allowed_path_requires_matching_port() {
        let matrix = resolve(&web_rules());
        assert!(matrix.allows_from_group("app", "db", 3306, Protocol::Tcp));
        assert!(!matrix.allows_from_group("app", "db", 3307, Protocol::Tcp));
        assert!(!matrix.allows_from_group("alb", "db", 3306, Protocol::Tcp));
    }

    #[test]
    fn test_undeclared_egress_is_unrestricted() {
        // Ingress alone suffices while the source group has no egress rules
        let rules = vec![SecurityRule::ingress(
            "db",
            Peer::Group("app".into()),
            Protocol::Tcp,
            port(3306),
        )];
        let matrix = resolve(&rules);
        assert!(matrix.allows_from_group("app", "db", 3306, Protocol::Tcp));
    }

    #[test]
    fn test_declared_egress_narrows_the_source() {
        // One egress rule to an unrelated group ends the unrestricted
        // default; the store is no longer reachable
        let rules = vec![
            SecurityRule::ingress("db", Peer::Group("app".into()), Protocol::Tcp, port(3306)),
            SecurityRule::egress("app", Peer::Group("cache".into()), Protocol::Tcp, port(6379)),
        ];
        let matrix = resolve(&rules);

        assert!(!matrix.allows_from_group("app", "db", 3306, Protocol::Tcp));
        // Egress alone never grants reachability either
        assert!(!matrix.allows_from_group("app", "cache", 6379, Protocol::Tcp));
    }

    #[test]
    fn test_explicit_egress_to_destination_group_suffices() {
        let rules = vec![
            SecurityRule::ingress("db", Peer::Group("app".into()), Protocol::Tcp, port(3306)),
            SecurityRule::egress("app", Peer::Group("db".into()), Protocol::Tcp, port(3306)),
        ];
        let matrix = resolve(&rules);
        assert!(matrix.allows_from_group("app", "db", 3306, Protocol::Tcp));
    }

    #[test]
    fn test_udp_does_not_consult_egress() {
        let rules = vec![SecurityRule::ingress(
            "db",
            Peer::Group("app".into()),
            Protocol::Udp,
            port(53),
        )];
        let matrix = resolve(&rules);
        assert!(matrix.allows_from_group("app", "db", 53, Protocol::Udp));
        assert!(!matrix.allows_from_group("app", "db", 53, Protocol::Tcp));
    }

    #[test]
    fn test_cidr_ingress_matches_addresses_not_groups() {
        let block = CidrBlock::new("172.56.165.110/32").unwrap();
        let rules = vec![SecurityRule::ingress(
            "mgmt",
            Peer::Cidr(block),
            Protocol::Tcp,
            port(22),
        )];
        let matrix = resolve(&rules);

        assert!(matrix.allows_from_address("172.56.165.110".parse().unwrap(), "mgmt", 22, Protocol::Tcp));
        assert!(!matrix.allows_from_address("172.56.165.111".parse().unwrap(), "mgmt", 22, Protocol::Tcp));
        assert!(!matrix.allows_from_group("app", "mgmt", 22, Protocol::Tcp));
    }

    #[test]
    fn test_validate_registrations_flags_orphans() {
        let matrix = resolve(&web_rules());
        let good = TargetRegistration {
            load_balancer: "lb".into(),
            service: "svc".into(),
            source_group: "alb".into(),
            target_group: "app".into(),
            port: 80,
        };
        let orphaned = TargetRegistration {
            port: 8080,
            ..good.clone()
        };

        assert!(validate_registrations(&matrix, &[good.clone()]).is_empty());

        let violations = validate_registrations(&matrix, &[good, orphaned]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].registration.port, 8080);
    }
}
