//! Subnet arithmetic for the MetalLB address pool
//!
//! MetalLB hands out LoadBalancer IPs from the kind Docker network. The pool
//! is the `.200`–`.250` window of the last /24 inside the network, which
//! Docker's IPAM allocates to containers last. For the usual `A.B.0.0/16`
//! network this is `A.B.255.200-A.B.255.250`.

use std::fmt;
use std::net::Ipv4Addr;

use crate::{Error, Result};

/// First host octet of the pool window
pub const POOL_FIRST_OCTET: u8 = 200;

/// Last host octet of the pool window
pub const POOL_LAST_OCTET: u8 = 250;

/// An IPv4 network in CIDR form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    /// Network address (host bits cleared)
    pub address: Ipv4Addr,
    /// Prefix length, 0..=32
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// Parse `A.B.C.D/N`. Host bits are cleared.
    pub fn parse(cidr: &str) -> Result<Self> {
        let (addr, prefix) = cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::validation(format!("subnet '{}' is not in CIDR form", cidr)))?;

        let address: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::validation(format!("subnet '{}' is not an IPv4 network", cidr)))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| Error::validation(format!("subnet '{}' has an invalid prefix", cidr)))?;

        Ok(Self {
            address: Ipv4Addr::from(u32::from(address) & Self::mask(prefix)),
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        match prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    /// Highest address in the network
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | !Self::mask(self.prefix))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// An inclusive range of addresses handed to MetalLB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetallbPool {
    /// First address in the pool
    pub start: Ipv4Addr,
    /// Last address in the pool
    pub end: Ipv4Addr,
}

impl MetallbPool {
    /// Derive the pool from a network subnet
    pub fn from_subnet(subnet: &Ipv4Cidr) -> Result<Self> {
        if subnet.prefix > 24 {
            return Err(Error::validation(format!(
                "subnet {} is smaller than a /24; no room for a MetalLB pool",
                subnet
            )));
        }

        let [a, b, c, _] = subnet.broadcast().octets();
        Ok(Self {
            start: Ipv4Addr::new(a, b, c, POOL_FIRST_OCTET),
            end: Ipv4Addr::new(a, b, c, POOL_LAST_OCTET),
        })
    }

    /// Derive the pool from the subnets Docker reports for a network.
    ///
    /// IPv6 entries are skipped; the first IPv4 subnet wins.
    pub fn from_docker_subnets<S: AsRef<str>>(subnets: &[S]) -> Result<Self> {
        let subnet = subnets
            .iter()
            .map(AsRef::as_ref)
            .find(|s| !s.contains(':'))
            .ok_or_else(|| Error::validation("network has no IPv4 subnet"))?;
        Self::from_subnet(&Ipv4Cidr::parse(subnet)?)
    }

    /// Parse a user-supplied `start-end` range
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("invalid address range '{}'", range));
        let (start, end) = range.trim().split_once('-').ok_or_else(invalid)?;
        let start: Ipv4Addr = start.trim().parse().map_err(|_| invalid())?;
        let end: Ipv4Addr = end.trim().parse().map_err(|_| invalid())?;
        if u32::from(start) > u32::from(end) {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for MetallbPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
