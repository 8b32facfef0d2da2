// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Object definitions for routing next-hops, both as supplied by clients
//! (possibly recursive) and after resolution against the routing table.

use std::collections::BTreeMap;
use std::net::IpAddr;

use lpm::prefix::Prefix;
use serde::{Deserialize, Serialize};

use crate::client::InterfaceId;
use crate::errors::RibError;

/// Largest value an MPLS label can take (20 bits).
pub const MAX_MPLS_LABEL: u32 = 1_048_575;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MplsLabel(u32);

impl MplsLabel {
    /// Build a label, checking the 20-bit bound.
    ///
    /// # Errors
    /// Fails if the value exceeds [`MAX_MPLS_LABEL`].
    pub fn new(label: u32) -> Result<Self, RibError> {
        if label > MAX_MPLS_LABEL {
            return Err(RibError::InvalidLabel(label));
        }
        Ok(Self(label))
    }

    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// An ordered stack of MPLS labels, outermost first.
pub type LabelStack = Vec<MplsLabel>;

/// A next-hop as supplied by a routing client. The gateway may be recursive
/// (resolved through another route) unless an interface scope is present, in
/// which case the next-hop is directly usable. Weight 0 means unweighted
/// (plain equal-cost member).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NextHop {
    pub addr: IpAddr,
    pub interface: Option<InterfaceId>,
    pub weight: u32,
    pub labels: Option<LabelStack>,
}

impl NextHop {
    #[must_use]
    pub fn with_addr(addr: IpAddr) -> Self {
        Self {
            addr,
            interface: None,
            weight: 0,
            labels: None,
        }
    }

    #[must_use]
    pub fn with_addr_interface(addr: IpAddr, interface: InterfaceId) -> Self {
        Self {
            addr,
            interface: Some(interface),
            weight: 0,
            labels: None,
        }
    }

    #[must_use]
    pub fn weighted(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn labeled(mut self, labels: LabelStack) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Tell if the gateway address is link-local. Such next-hops must carry
    /// an interface scope to be usable.
    #[must_use]
    pub fn is_link_local(&self) -> bool {
        Prefix::is_link_local_addr(&self.addr)
    }
}

/// A normalized, deduplicated set of client next-hops. Duplicate gateways
/// (same address and label stack) are collapsed with their weights summed;
/// if any member is unweighted the whole set is unweighted. Unspecified
/// gateways are discarded; link-local gateways without an interface scope
/// reject the set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NextHopSet(Vec<NextHop>);

impl NextHopSet {
    /// Normalize a collection of next-hops.
    ///
    /// # Errors
    /// Fails on scopeless link-local gateways or if nothing usable remains.
    pub fn new(nhops: impl IntoIterator<Item = NextHop>) -> Result<Self, RibError> {
        type Key = (IpAddr, Option<LabelStack>);
        let mut merged: BTreeMap<Key, NextHop> = BTreeMap::new();
        let mut any_unweighted = false;

        for nhop in nhops {
            if nhop.is_link_local() && nhop.interface.is_none() {
                return Err(RibError::LinkLocalNoScope(nhop.addr));
            }
            if nhop.addr.is_unspecified() {
                continue;
            }
            any_unweighted |= nhop.weight == 0;
            let key = (nhop.addr, nhop.labels.clone());
            merged
                .entry(key)
                .and_modify(|prior| {
                    prior.weight = prior.weight.saturating_add(nhop.weight);
                    if prior.interface.is_none() {
                        prior.interface = nhop.interface;
                    }
                })
                .or_insert(nhop);
        }

        if merged.is_empty() {
            return Err(RibError::InvalidNextHops(
                "no usable next-hops".to_string(),
            ));
        }

        let mut nhops: Vec<NextHop> = merged.into_values().collect();
        if any_unweighted {
            for nhop in &mut nhops {
                nhop.weight = 0;
            }
        }
        nhops.sort();
        Ok(Self(nhops))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NextHop> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fully resolved forwarding next-hop: the original gateway address, the
/// egress interface donated by the connected route that terminated
/// resolution, the effective weight (0 when the set is equal-cost), and the
/// label stack carried over from the client next-hop.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResolvedNextHop {
    pub addr: IpAddr,
    pub interface: InterfaceId,
    pub weight: u32,
    pub labels: Option<LabelStack>,
}

/// Canonical set of resolved next-hops: sorted, deduplicated by
/// (gateway, interface, labels) with weight summation, and subject to the
/// same zero-weight policy as [`NextHopSet`]. The canonical form makes the
/// set usable as the identity of a shared ECMP group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResolvedNextHopSet(Vec<ResolvedNextHop>);

impl ResolvedNextHopSet {
    /// Merge raw resolution paths into canonical form.
    #[must_use]
    pub(crate) fn from_paths(paths: Vec<ResolvedNextHop>) -> Self {
        type Key = (IpAddr, InterfaceId, Option<LabelStack>);
        let mut merged: BTreeMap<Key, ResolvedNextHop> = BTreeMap::new();
        let mut any_unweighted = false;

        for path in paths {
            any_unweighted |= path.weight == 0;
            let key = (path.addr, path.interface, path.labels.clone());
            merged
                .entry(key)
                .and_modify(|prior| prior.weight = prior.weight.saturating_add(path.weight))
                .or_insert(path);
        }

        let mut nhops: Vec<ResolvedNextHop> = merged.into_values().collect();
        if any_unweighted {
            for nhop in &mut nhops {
                nhop.weight = 0;
            }
        }
        nhops.sort();
        Self(nhops)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedNextHop> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
