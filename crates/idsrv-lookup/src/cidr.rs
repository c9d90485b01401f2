//! IP address ranges in CIDR notation, used to decide which requesters may
//! trigger recursive lookups.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Ranges allowed to recurse when none are configured: loopback and the
/// private address blocks.
pub const DEFAULT_ALLOWED_CIDRS: [&str; 5] = [
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "::1/128",
];

/// An address block such as `10.0.0.0/8`.
///
/// A bare address parses as a single-host range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("invalid address in CIDR range {0:?}")]
    InvalidAddress(String),

    #[error("invalid prefix length in CIDR range {0:?}")]
    InvalidPrefix(String),
}

impl CidrRange {
    pub fn parse(raw: &str) -> Result<Self, CidrError> {
        let (addr, prefix) = match raw.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (raw, None),
        };
        let network: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| CidrError::InvalidAddress(raw.to_string()))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            None => max,
            Some(p) => p
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|len| *len <= max)
                .ok_or_else(|| CidrError::InvalidPrefix(raw.to_string()))?,
        };
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Loopback and private ranges.
    pub fn default_allowed() -> Vec<CidrRange> {
        DEFAULT_ALLOWED_CIDRS
            .iter()
            .filter_map(|raw| Self::parse(raw).ok())
            .collect()
    }

    /// Whether `addr` lies inside this range. IPv4-mapped IPv6 addresses are
    /// matched against IPv4 ranges.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let mask = mask_u32(self.prefix_len);
                u32::from(net) & mask == u32::from(*a) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let mask = mask_u128(self.prefix_len);
                u128::from(net) & mask == u128::from(*a) & mask
            }
            (IpAddr::V4(_), IpAddr::V6(a)) => a
                .to_ipv4_mapped()
                .is_some_and(|v4| self.contains(&IpAddr::V4(v4))),
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

impl FromStr for CidrRange {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

fn mask_u128(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n)),
    }
}
