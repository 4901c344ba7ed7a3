// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Invalid visibility tier: {0} (must be public or private)")]
    InvalidTier(String),
}

/// IPv4 CIDR block value object
///
/// Represents a network range in CIDR notation, canonicalized so the
/// address is the network address of the block.
/// Invariants:
/// - Valid dotted-quad IPv4 address
/// - Prefix length 0-32
/// - Host bits cleared (canonical form)
///
/// # Examples
///
/// ```rust
/// use stackplan::domain::CidrBlock;
///
/// let block = CidrBlock::new("10.0.1.0/24").unwrap();
/// assert_eq!(block.prefix(), 24);
/// assert!(block.contains("10.0.1.17".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    network: Ipv4Addr,
    prefix: u8,
}

impl CidrBlock {
    /// Create a new CIDR block with validation
    ///
    /// # Invariants
    /// - Valid IPv4 address format
    /// - Prefix length 0-32
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        if prefix > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix));
        }

        // Canonicalize: clear host bits
        let network = Ipv4Addr::from(u32::from(address) & Self::mask_bits(prefix));

        Ok(Self { network, prefix })
    }

    /// Get the network address of the block
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Get the prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// First address of the block (numeric)
    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    /// Last address of the block (numeric)
    fn last(&self) -> u32 {
        u32::from(self.network) | !Self::mask_bits(self.prefix)
    }

    /// Check whether an address falls inside this block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        addr >= self.first() && addr <= self.last()
    }

    /// Check whether two blocks share any addresses
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.first().max(other.first()) <= self.last().min(other.last())
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix)
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for CidrBlock {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CidrBlock> for String {
    fn from(value: CidrBlock) -> Self {
        value.as_cidr()
    }
}

/// Visibility tier of a network segment
///
/// Public segments route to and from the internet; private segments are
/// reachable only from inside the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Internet-routable segment
    Public,
    /// Internal-only segment
    Private,
}

impl Tier {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tier {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(NetworkError::InvalidTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_block_parse() {
        let block = CidrBlock::new("10.0.0.0/16").unwrap();
        assert_eq!(block.network().to_string(), "10.0.0.0");
        assert_eq!(block.prefix(), 16);
        assert_eq!(block.as_cidr(), "10.0.0.0/16");
    }

    #[test]
    fn test_cidr_block_canonicalizes_host_bits() {
        let block = CidrBlock::new("10.0.1.17/24").unwrap();
        assert_eq!(block.as_cidr(), "10.0.1.0/24");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(CidrBlock::new("10.0.0.0").is_err()); // No prefix
        assert!(CidrBlock::new("999.0.0.0/8").is_err());
        assert!(CidrBlock::new("10.0.0.0/33").is_err()); // Prefix out of range
        assert!(CidrBlock::new("10.0.0.0/abc").is_err());
    }

    #[test]
    fn test_contains() {
        let block = CidrBlock::new("10.0.1.0/24").unwrap();
        assert!(block.contains("10.0.1.0".parse().unwrap()));
        assert!(block.contains("10.0.1.255".parse().unwrap()));
        assert!(!block.contains("10.0.2.0".parse().unwrap()));
    }

    #[test]
    fn test_overlaps() {
        let a = CidrBlock::new("10.0.0.0/24").unwrap();
        let b = CidrBlock::new("10.0.1.0/24").unwrap();
        let wide = CidrBlock::new("10.0.0.0/16").unwrap();

        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(wide.overlaps(&a));
        assert!(wide.overlaps(&b));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn test_zero_prefix_covers_everything() {
        let all = CidrBlock::new("0.0.0.0/0").unwrap();
        assert!(all.contains("203.0.113.10".parse().unwrap()));
        assert!(all.overlaps(&CidrBlock::new("10.0.0.0/16").unwrap()));
    }

    #[test]
    fn test_tier_round_trip() {
        assert_eq!("public".parse::<Tier>().unwrap(), Tier::Public);
        assert_eq!("private".parse::<Tier>().unwrap(), Tier::Private);
        assert!("dmz".parse::<Tier>().is_err());
        assert_eq!(Tier::Public.to_string(), "public");
    }
}
