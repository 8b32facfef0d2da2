// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type to represent IP-version neutral network prefixes.

use std::fmt::{Debug, Display};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ip;

pub use ip::{IpPrefix, Ipv4Prefix, Ipv6Prefix};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("Invalid prefix: {0}")]
    Invalid(String),
    #[error("Mask length {0} is invalid")]
    InvalidLength(u8),
    #[error("Address {0} has host bits set beyond mask /{1}")]
    HostBitsSet(IpAddr, u8),
}

/// Type to represent both IPv4 and IPv6 prefixes to expose an IP
/// version-independent API. Prefixes are kept in canonical form: the host
/// bits beyond the mask are always zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub enum Prefix {
    IPV4(Ipv4Prefix),
    IPV6(Ipv6Prefix),
}

impl Prefix {
    pub const MAX_LEN_IPV4: u8 = 32;
    pub const MAX_LEN_IPV6: u8 = 128;

    /// Build 0.0.0.0/0. "Default" is a very overloaded term. Calling this `root_v4`.
    #[must_use]
    pub fn root_v4() -> Prefix {
        Prefix::IPV4(Ipv4Prefix::default())
    }
    /// Build `::/0`.
    #[must_use]
    pub fn root_v6() -> Prefix {
        Prefix::IPV6(Ipv6Prefix::default())
    }
    /// Build 169.254.0.0/16, the IPv4 link-local range.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // This should never actually panic
    pub fn ipv4_link_local() -> Prefix {
        Prefix::IPV4(Ipv4Prefix::new(Ipv4Addr::new(169, 254, 0, 0), 16).expect("Bad prefix"))
    }
    /// Build fe80::/10, the IPv6 link-local range.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // This should never actually panic
    pub fn ipv6_link_local() -> Prefix {
        Prefix::IPV6(
            Ipv6Prefix::new(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10).expect("Bad prefix"),
        )
    }

    /// Tell if an address falls in the link-local ranges.
    #[must_use]
    pub fn is_link_local_addr(addr: &IpAddr) -> bool {
        match addr {
            IpAddr::V4(a) => a.is_link_local(),
            IpAddr::V6(a) => (a.segments()[0] & 0xffc0) == 0xfe80,
        }
    }

    /// Build a prefix, zeroing host bits beyond the mask.
    ///
    /// # Errors
    /// Fails if the mask length exceeds the maximum for the address family.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, PrefixError> {
        match addr {
            IpAddr::V4(a) => Ok(Prefix::IPV4(Ipv4Prefix::new(a, len)?)),
            IpAddr::V6(a) => Ok(Prefix::IPV6(Ipv6Prefix::new(a, len)?)),
        }
    }

    /// Build a prefix in canonical form, rejecting set host bits.
    ///
    /// # Errors
    /// Fails if the mask length is invalid or host bits are set.
    pub fn new_strict(addr: IpAddr, len: u8) -> Result<Self, PrefixError> {
        match addr {
            IpAddr::V4(a) => Ok(Prefix::IPV4(Ipv4Prefix::new_strict(a, len)?)),
            IpAddr::V6(a) => Ok(Prefix::IPV6(Ipv6Prefix::new_strict(a, len)?)),
        }
    }

    /// Build the host prefix (/32 or /128) for an address.
    #[must_use]
    pub fn from_host(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => Prefix::IPV4(Ipv4Prefix::from_host(a)),
            IpAddr::V6(a) => Prefix::IPV6(Ipv6Prefix::from_host(a)),
        }
    }

    /// Check whether the prefix is IPv4
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self, Prefix::IPV4(_))
    }

    /// Check whether the prefix is IPv6
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        matches!(self, Prefix::IPV6(_))
    }

    /// Build an `IpAddr` from a prefix
    #[must_use]
    pub fn as_address(&self) -> IpAddr {
        match *self {
            Prefix::IPV4(p) => p.network().into(),
            Prefix::IPV6(p) => p.network().into(),
        }
    }

    /// Get prefix length
    #[must_use]
    pub fn length(&self) -> u8 {
        match *self {
            Prefix::IPV4(p) => p.len(),
            Prefix::IPV6(p) => p.len(),
        }
    }

    /// Tell if prefix is a host
    #[must_use]
    pub fn is_host(&self) -> bool {
        match self {
            Prefix::IPV4(_) => self.length() == Self::MAX_LEN_IPV4,
            Prefix::IPV6(_) => self.length() == Self::MAX_LEN_IPV6,
        }
    }

    /// Check whether prefix covers a given address
    #[must_use]
    pub fn covers_addr(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (Prefix::IPV4(p), IpAddr::V4(a)) => p.covers_addr(a),
            (Prefix::IPV6(p), IpAddr::V6(a)) => p.covers_addr(a),
            _ => false,
        }
    }

    /// Check whether prefix covers another prefix
    #[must_use]
    pub fn covers(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::IPV4(p1), Prefix::IPV4(p2)) => p1.covers(p2),
            (Prefix::IPV6(p1), Prefix::IPV6(p2)) => p1.covers(p2),
            _ => false,
        }
    }

    #[cfg(any(test, feature = "testing"))]
    #[allow(clippy::missing_panics_doc)]
    pub fn expect_from<T>(val: T) -> Self
    where
        T: TryInto<Prefix>,
        T::Error: Debug,
    {
        val.try_into().expect("Invalid prefix")
    }
}

impl TryFrom<(IpAddr, u8)> for Prefix {
    type Error = PrefixError;

    fn try_from(tuple: (IpAddr, u8)) -> Result<Self, Self::Error> {
        Prefix::new(tuple.0, tuple.1)
    }
}

impl TryFrom<(&str, u8)> for Prefix {
    type Error = PrefixError;

    fn try_from((addr_str, mask_len): (&str, u8)) -> Result<Self, Self::Error> {
        let addr = IpAddr::from_str(addr_str)
            .map_err(|_| PrefixError::Invalid(addr_str.to_string()))?;
        Prefix::new(addr, mask_len)
    }
}

impl From<Ipv4Prefix> for Prefix {
    fn from(value: Ipv4Prefix) -> Self {
        Self::IPV4(value)
    }
}

impl From<Ipv6Prefix> for Prefix {
    fn from(value: Ipv6Prefix) -> Self {
        Self::IPV6(value)
    }
}

impl FromStr for Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(p) = s.parse::<Ipv4Prefix>() {
            Ok(Prefix::IPV4(p))
        } else if let Ok(p) = s.parse::<Ipv6Prefix>() {
            Ok(Prefix::IPV6(p))
        } else {
            Err(PrefixError::Invalid(s.to_string()))
        }
    }
}

/// Only for testing. Will panic with badly formatted prefix strings
#[cfg(any(test, feature = "testing"))]
impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        s.parse().unwrap()
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::IPV4(p) => write!(f, "{p}"),
            Prefix::IPV6(p) => write!(f, "{p}"),
        }
    }
}

impl Serialize for Prefix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_parse() {
        let p: Prefix = "10.0.0.0/24".parse().unwrap();
        assert!(p.is_ipv4());
        assert_eq!(p.length(), 24);
        assert_eq!(p.as_address(), IpAddr::from(Ipv4Addr::new(10, 0, 0, 0)));

        let p: Prefix = "2001:db8::/32".parse().unwrap();
        assert!(p.is_ipv6());
        assert_eq!(p.length(), 32);

        assert!("10.0.0.0".parse::<Prefix>().is_err());
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_prefix_host() {
        assert!(Prefix::from_host("10.0.0.1".parse().unwrap()).is_host());
        assert!(Prefix::from_host("2001:db8::1".parse().unwrap()).is_host());
        assert!(!Prefix::expect_from("10.0.0.0/31").is_host());
    }

    #[test]
    fn test_prefix_strict() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(Prefix::new(addr, 24).is_ok());
        assert_eq!(
            Prefix::new_strict(addr, 24),
            Err(PrefixError::HostBitsSet(addr, 24))
        );
    }

    #[test]
    fn test_link_local() {
        assert!(Prefix::ipv4_link_local().covers_addr(&"169.254.0.1".parse().unwrap()));
        assert!(Prefix::ipv6_link_local().covers_addr(&"fe80::1".parse().unwrap()));
        assert!(Prefix::is_link_local_addr(&"169.254.1.1".parse().unwrap()));
        assert!(Prefix::is_link_local_addr(&"fe80::2".parse().unwrap()));
        assert!(!Prefix::is_link_local_addr(&"10.0.0.1".parse().unwrap()));
        assert!(!Prefix::is_link_local_addr(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_prefix_covers_no_family_mix() {
        let v4: Prefix = "0.0.0.0/0".parse().unwrap();
        let v6: Prefix = "::/0".parse().unwrap();
        assert!(!v4.covers(&v6));
        assert!(!v6.covers(&v4));
        assert!(!v4.covers_addr(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_prefix_serde_roundtrip() {
        let p: Prefix = "192.168.0.0/16".parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"192.168.0.0/16\"");
        let back: Prefix = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
