//! Source-address admission control.
//!
//! **This is not authentication.** The render server decides whether to
//! talk to a peer purely from the peer's source IP address, which is
//! trivially spoofable on most local networks. It keeps casual traffic from
//! other segments away from the RPC surface and nothing more; only run a
//! render server on a network segment you already trust.
//!
//! The decision is a pure function of the server's own address, the
//! candidate address, and the [`AllowedNetworks`] loaded at startup.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::CoreError;

/// One entry of the allowed-networks list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSpec {
    /// `address & mask == network & mask`.
    Subnet { network: IpAddr, prefix_len: u8 },
    /// Exactly one host.
    Host(IpAddr),
}

impl NetworkSpec {
    /// Whether `candidate` falls inside this entry.
    ///
    /// Addresses of different families never match.
    pub fn contains(&self, candidate: IpAddr) -> bool {
        let candidate = candidate.to_canonical();
        match *self {
            NetworkSpec::Host(host) => host.to_canonical() == candidate,
            NetworkSpec::Subnet {
                network,
                prefix_len,
            } => match (network.to_canonical(), candidate) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let mask = v4_mask(prefix_len);
                    u32::from(net) & mask == u32::from(addr) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let mask = v6_mask(prefix_len);
                    u128::from(net) & mask == u128::from(addr) & mask
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for NetworkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkSpec::Host(host) => write!(f, "{host}"),
            NetworkSpec::Subnet {
                network,
                prefix_len,
            } => write!(f, "{network}/{prefix_len}"),
        }
    }
}

impl FromStr for NetworkSpec {
    type Err = CoreError;

    /// Accepts `addr`, `addr/prefix` and (IPv4 only) `addr/dotted.mask`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |why: &str| CoreError::Validation(format!("Invalid network \"{s}\": {why}"));

        let Some((addr, mask)) = s.split_once('/') else {
            let host: IpAddr = s.parse().map_err(|_| invalid("not an IP address"))?;
            return Ok(NetworkSpec::Host(host));
        };

        let network: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| invalid("not an IP address"))?;
        let max_len: u8 = if network.is_ipv4() { 32 } else { 128 };
        let mask = mask.trim();

        let prefix_len = if let Ok(len) = mask.parse::<u8>() {
            len
        } else {
            match (network, mask.parse::<IpAddr>()) {
                (IpAddr::V4(_), Ok(IpAddr::V4(dotted))) => {
                    let bits = u32::from(dotted);
                    // Only contiguous masks (ones followed by zeros) are valid.
                    if bits.leading_ones() + bits.trailing_zeros() != 32 {
                        return Err(invalid("mask is not contiguous"));
                    }
                    bits.leading_ones() as u8
                }
                _ => return Err(invalid("mask is neither a prefix length nor a dotted mask")),
            }
        };

        if prefix_len > max_len {
            return Err(invalid("prefix length out of range"));
        }

        Ok(NetworkSpec::Subnet {
            network,
            prefix_len,
        })
    }
}

/// The ordered, read-only list of networks a server accepts callers from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedNetworks {
    entries: Vec<NetworkSpec>,
}

impl AllowedNetworks {
    pub fn new(entries: Vec<NetworkSpec>) -> Self {
        Self { entries }
    }

    /// Parse a comma- or whitespace-separated list of network specs.
    ///
    /// Malformed entries are dropped here, at load time, and returned
    /// alongside the parsed list so the caller can report them.
    pub fn parse(spec: &str) -> (Self, Vec<CoreError>) {
        let mut entries = Vec::new();
        let mut rejected = Vec::new();

        for token in spec
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match token.parse::<NetworkSpec>() {
                Ok(entry) => entries.push(entry),
                Err(e) => rejected.push(e),
            }
        }

        (Self { entries }, rejected)
    }

    pub fn entries(&self) -> &[NetworkSpec] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decide whether `candidate` may reach the render service.
///
/// A candidate is admitted when it is the server itself, or when it falls
/// inside any entry of `networks`.
pub fn allowed(self_addr: IpAddr, candidate: IpAddr, networks: &AllowedNetworks) -> bool {
    if self_addr.to_canonical() == candidate.to_canonical() {
        return true;
    }
    networks.entries.iter().any(|entry| entry.contains(candidate))
}

fn v4_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n if n >= 32 => u32::MAX,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

fn v6_mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n if n >= 128 => u128::MAX,
        n => u128::MAX << (128 - u32::from(n)),
    }
}
