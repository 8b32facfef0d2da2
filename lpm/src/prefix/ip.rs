// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-family prefix types and the trait that abstracts over the two
//! IP address families.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{Ipv4Net, Ipv6Net};

use crate::prefix::PrefixError;

/// Abstraction over the two IP address families. The v4 and v6 paths of the
/// routing tables are structurally identical; code is written once against
/// this trait and instantiated twice. `Net` is the masked network type used
/// as the key of the longest-prefix-match tries.
pub trait IpPrefix:
    Sized + Debug + Display + Copy + Eq + Ord + Hash + Default + FromStr
{
    type Addr: Debug + Display + Copy + Eq + Ord + Hash + Into<IpAddr>;
    type Net: Copy + Eq;
    const MAX_LEN: u8;

    /// Build a prefix, zeroing any host bits beyond the mask.
    ///
    /// # Errors
    /// Fails if the length exceeds `Self::MAX_LEN`.
    fn new(addr: Self::Addr, len: u8) -> Result<Self, PrefixError>;

    /// Build a prefix in canonical form, rejecting addresses that have host
    /// bits set beyond the mask.
    ///
    /// # Errors
    /// Fails if the length exceeds `Self::MAX_LEN` or host bits are set.
    fn new_strict(addr: Self::Addr, len: u8) -> Result<Self, PrefixError>;

    /// Build the host prefix (/32 or /128) for an address.
    fn from_host(addr: Self::Addr) -> Self;

    fn network(&self) -> Self::Addr;
    fn len(&self) -> u8;

    fn to_net(self) -> Self::Net;
    fn from_net(net: Self::Net) -> Self;

    /// Tell whether this prefix covers the given address.
    fn covers_addr(&self, addr: &Self::Addr) -> bool;

    /// Tell whether this prefix covers the other prefix.
    fn covers(&self, other: &Self) -> bool;
}

////////////////////////////////////////////////////////////
// IPv4 Prefix
////////////////////////////////////////////////////////////

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Prefix(Ipv4Net);

impl Debug for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Default for Ipv4Prefix {
    fn default() -> Self {
        Self(Ipv4Net::new(Ipv4Addr::new(0, 0, 0, 0), 0).unwrap_or_else(|_| unreachable!()))
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IpPrefix for Ipv4Prefix {
    type Addr = Ipv4Addr;
    type Net = Ipv4Net;
    const MAX_LEN: u8 = 32;

    fn new(addr: Ipv4Addr, len: u8) -> Result<Self, PrefixError> {
        let net = Ipv4Net::new(addr, len).map_err(|_| PrefixError::InvalidLength(len))?;
        Ok(Self(net.trunc()))
    }

    fn new_strict(addr: Ipv4Addr, len: u8) -> Result<Self, PrefixError> {
        let prefix = Self::new(addr, len)?;
        if prefix.network() != addr {
            return Err(PrefixError::HostBitsSet(addr.into(), len));
        }
        Ok(prefix)
    }

    fn from_host(addr: Ipv4Addr) -> Self {
        Self(Ipv4Net::new(addr, Self::MAX_LEN).unwrap_or_else(|_| unreachable!()))
    }

    fn network(&self) -> Ipv4Addr {
        self.0.network()
    }
    fn len(&self) -> u8 {
        self.0.prefix_len()
    }

    fn to_net(self) -> Ipv4Net {
        self.0
    }
    fn from_net(net: Ipv4Net) -> Self {
        Self(net.trunc())
    }

    fn covers_addr(&self, addr: &Ipv4Addr) -> bool {
        self.0.contains(addr)
    }
    fn covers(&self, other: &Self) -> bool {
        self.0.contains(&other.0)
    }
}

impl From<Ipv4Addr> for Ipv4Prefix {
    fn from(addr: Ipv4Addr) -> Self {
        Self::from_host(addr)
    }
}

impl From<Ipv4Net> for Ipv4Prefix {
    fn from(net: Ipv4Net) -> Self {
        Self::from_net(net)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PrefixError::Invalid(s.to_string()))?;
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| PrefixError::Invalid(s.to_string()))?;
        let len = len
            .parse::<u8>()
            .map_err(|_| PrefixError::Invalid(s.to_string()))?;
        Self::new(addr, len)
    }
}

////////////////////////////////////////////////////////////
// IPv6 Prefix
////////////////////////////////////////////////////////////

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv6Prefix(Ipv6Net);

impl Debug for Ipv6Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Default for Ipv6Prefix {
    fn default() -> Self {
        Self(
            Ipv6Net::new(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 0)
                .unwrap_or_else(|_| unreachable!()),
        )
    }
}

impl Display for Ipv6Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IpPrefix for Ipv6Prefix {
    type Addr = Ipv6Addr;
    type Net = Ipv6Net;
    const MAX_LEN: u8 = 128;

    fn new(addr: Ipv6Addr, len: u8) -> Result<Self, PrefixError> {
        let net = Ipv6Net::new(addr, len).map_err(|_| PrefixError::InvalidLength(len))?;
        Ok(Self(net.trunc()))
    }

    fn new_strict(addr: Ipv6Addr, len: u8) -> Result<Self, PrefixError> {
        let prefix = Self::new(addr, len)?;
        if prefix.network() != addr {
            return Err(PrefixError::HostBitsSet(addr.into(), len));
        }
        Ok(prefix)
    }

    fn from_host(addr: Ipv6Addr) -> Self {
        Self(Ipv6Net::new(addr, Self::MAX_LEN).unwrap_or_else(|_| unreachable!()))
    }

    fn network(&self) -> Ipv6Addr {
        self.0.network()
    }
    fn len(&self) -> u8 {
        self.0.prefix_len()
    }

    fn to_net(self) -> Ipv6Net {
        self.0
    }
    fn from_net(net: Ipv6Net) -> Self {
        Self(net.trunc())
    }

    fn covers_addr(&self, addr: &Ipv6Addr) -> bool {
        self.0.contains(addr)
    }
    fn covers(&self, other: &Self) -> bool {
        self.0.contains(&other.0)
    }
}

impl From<Ipv6Addr> for Ipv6Prefix {
    fn from(addr: Ipv6Addr) -> Self {
        Self::from_host(addr)
    }
}

impl From<Ipv6Net> for Ipv6Prefix {
    fn from(net: Ipv6Net) -> Self {
        Self::from_net(net)
    }
}

impl FromStr for Ipv6Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PrefixError::Invalid(s.to_string()))?;
        let addr = addr
            .parse::<Ipv6Addr>()
            .map_err(|_| PrefixError::Invalid(s.to_string()))?;
        let len = len
            .parse::<u8>()
            .map_err(|_| PrefixError::Invalid(s.to_string()))?;
        Self::new(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_prefix_from_str() {
        let prefix = "192.168.1.0/24".parse::<Ipv4Prefix>().unwrap();
        assert_eq!(prefix.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(prefix.len(), 24);
    }

    #[test]
    fn test_ipv4_masking() {
        /* the relaxed constructor zeroes host bits */
        let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, 1, 2, 3), 24).unwrap();
        assert_eq!(prefix.network(), Ipv4Addr::new(10, 1, 2, 0));

        /* the strict one refuses them */
        let err = Ipv4Prefix::new_strict(Ipv4Addr::new(10, 1, 2, 3), 24);
        assert!(matches!(err, Err(PrefixError::HostBitsSet(_, 24))));
        assert!(Ipv4Prefix::new_strict(Ipv4Addr::new(10, 1, 2, 0), 24).is_ok());

        /* bad lengths are rejected by both */
        assert!(Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 33).is_err());
    }

    #[test]
    fn test_ipv4_covers() {
        let prefix = "192.168.1.0/24".parse::<Ipv4Prefix>().unwrap();
        assert!(prefix.covers_addr(&Ipv4Addr::new(192, 168, 1, 1)));
        assert!(!prefix.covers_addr(&Ipv4Addr::new(192, 168, 2, 1)));

        assert!(prefix.covers(&prefix));
        assert!(prefix.covers(&Ipv4Prefix::new(Ipv4Addr::new(192, 168, 1, 0), 25).unwrap()));
        assert!(!prefix.covers(&Ipv4Prefix::new(Ipv4Addr::new(192, 168, 1, 0), 23).unwrap()));

        /* the root prefix covers everything */
        let root = Ipv4Prefix::default();
        assert!(root.covers(&prefix));
        assert!(!prefix.covers(&root));
    }

    #[test]
    fn test_ipv6_prefix_from_str() {
        let prefix = "2001:db8::/32".parse::<Ipv6Prefix>().unwrap();
        assert_eq!(
            prefix.network(),
            Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0)
        );
    }

    #[test]
    fn test_ipv6_masking() {
        let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let prefix = Ipv6Prefix::new(addr, 64).unwrap();
        assert_eq!(
            prefix.network(),
            Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0)
        );
        assert!(Ipv6Prefix::new_strict(addr, 64).is_err());
        assert!(Ipv6Prefix::new_strict(addr, 128).is_ok());
        assert!(Ipv6Prefix::new(addr, 129).is_err());
    }

    #[test]
    fn test_ipv6_covers() {
        let prefix = "2001:db8::/32".parse::<Ipv6Prefix>().unwrap();
        assert!(prefix.covers_addr(&Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)));
        assert!(!prefix.covers_addr(&Ipv6Addr::new(0x2001, 0xdb9, 0, 0, 0, 0, 0, 0)));
        assert!(prefix.covers(&"2001:db8:1::/48".parse::<Ipv6Prefix>().unwrap()));
        assert!(!prefix.covers(&"2001:db9::/32".parse::<Ipv6Prefix>().unwrap()));
    }
}
