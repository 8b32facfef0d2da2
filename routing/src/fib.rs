// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Forwarding snapshots: the immutable per-VRF view of the resolved best
//! routes, built after each committed transaction and handed to the
//! hardware programmer through the apply callback.

use std::collections::BTreeMap;
use std::sync::Arc;

use lpm::prefix::{Ipv4Prefix, Ipv6Prefix, Prefix};
use lpm::trie::TrieMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::VrfId;
use crate::entry::{Forward, Resolution};
use crate::mpath::{EcmpEgressId, NextHopGroup, NextHopGroupTable};
use crate::nexthop::ResolvedNextHop;
use crate::updater::{Ipv4RouteTable, Ipv6RouteTable};

/// Forwarding state of one prefix in a snapshot. Single-path routes egress
/// directly; wider sets go through a shared ECMP group handle.
#[derive(Debug, Clone, PartialEq)]
pub enum FibRoute {
    Drop,
    ToCpu,
    Single(ResolvedNextHop),
    Ecmp(Arc<NextHopGroup>),
}

impl FibRoute {
    #[must_use]
    pub fn is_ecmp(&self) -> bool {
        matches!(self, FibRoute::Ecmp(_))
    }
}

/// An immutable forwarding table for one VRF. Snapshots are shared as
/// `Arc`s between the RIB (last applied) and any downstream consumer, and
/// are never mutated once built.
#[derive(Debug)]
pub struct ForwardingSnapshot {
    vrf: VrfId,
    generation: u64,
    v4: BTreeMap<Ipv4Prefix, FibRoute>,
    v6: BTreeMap<Ipv6Prefix, FibRoute>,
}

impl ForwardingSnapshot {
    #[must_use]
    pub fn vrf(&self) -> VrfId {
        self.vrf
    }

    /// Monotonic per-RIB sequence number of the snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len_v4(&self) -> usize {
        self.v4.len()
    }

    #[must_use]
    pub fn len_v6(&self) -> usize {
        self.v6.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn iter_v4(&self) -> impl Iterator<Item = (&Ipv4Prefix, &FibRoute)> {
        self.v4.iter()
    }

    pub fn iter_v6(&self) -> impl Iterator<Item = (&Ipv6Prefix, &FibRoute)> {
        self.v6.iter()
    }

    #[must_use]
    pub fn get(&self, prefix: &Prefix) -> Option<&FibRoute> {
        match prefix {
            Prefix::IPV4(p) => self.v4.get(p),
            Prefix::IPV6(p) => self.v6.get(p),
        }
    }

    /// Project the snapshot onto its deterministic serialized form.
    #[must_use]
    pub fn document(&self) -> SnapshotDocument {
        let mut routes = Vec::with_capacity(self.v4.len() + self.v6.len());
        for (prefix, route) in &self.v4 {
            routes.push(RouteDocument::new(Prefix::IPV4(*prefix), route));
        }
        for (prefix, route) in &self.v6 {
            routes.push(RouteDocument::new(Prefix::IPV6(*prefix), route));
        }
        SnapshotDocument {
            vrf: self.vrf,
            routes,
        }
    }
}

/// Builds forwarding snapshots out of committed route tables.
pub struct FibBuilder;

impl FibBuilder {
    /// Scan the tables and materialize the forwarding view of every
    /// resolved entry. Unresolved entries are left out. ECMP sets obtain
    /// their shared group handle from `groups`, so snapshots that share a
    /// set share the handle.
    #[must_use]
    pub fn build(
        vrf: VrfId,
        generation: u64,
        v4: &Ipv4RouteTable,
        v6: &Ipv6RouteTable,
        groups: &mut NextHopGroupTable,
    ) -> ForwardingSnapshot {
        groups.purge();
        let mut snapshot = ForwardingSnapshot {
            vrf,
            generation,
            v4: BTreeMap::new(),
            v6: BTreeMap::new(),
        };
        for (prefix, entry) in v4.iter() {
            if let Resolution::Resolved(fwd) = entry.resolution() {
                snapshot.v4.insert(prefix, Self::fib_route(fwd, groups));
            }
        }
        for (prefix, entry) in v6.iter() {
            if let Resolution::Resolved(fwd) = entry.resolution() {
                snapshot.v6.insert(prefix, Self::fib_route(fwd, groups));
            }
        }
        debug!(
            "Built snapshot gen {generation} for vrf {vrf}: {} v4 + {} v6 routes",
            snapshot.len_v4(),
            snapshot.len_v6()
        );
        snapshot
    }

    fn fib_route(fwd: &Forward, groups: &mut NextHopGroupTable) -> FibRoute {
        match fwd {
            Forward::Drop => FibRoute::Drop,
            Forward::ToCpu => FibRoute::ToCpu,
            Forward::Nexthops(set) => {
                if set.len() == 1 {
                    let only = set.iter().next().cloned().unwrap_or_else(|| unreachable!());
                    FibRoute::Single(only)
                } else {
                    FibRoute::Ecmp(groups.ref_or_create(set))
                }
            }
        }
    }
}

/////////////////////////////////////////////////////////////////////////
// Serialized snapshot document
/////////////////////////////////////////////////////////////////////////

/// Action field of a serialized route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FibAction {
    Drop,
    #[serde(rename = "ToCPU")]
    ToCpu,
    Nexthops,
}

/// One route of the serialized snapshot. Single-path routes carry the
/// egress interface as `egressId`; ECMP routes carry the shared group
/// handle as `ecmpEgressId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDocument {
    pub network: std::net::IpAddr,
    pub mask_len: u8,
    pub action: FibAction,
    pub ecmp: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub egress_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ecmp_egress_id: Option<EcmpEgressId>,
}

impl RouteDocument {
    fn new(prefix: Prefix, route: &FibRoute) -> Self {
        let (action, ecmp, egress_id, ecmp_egress_id) = match route {
            FibRoute::Drop => (FibAction::Drop, false, None, None),
            FibRoute::ToCpu => (FibAction::ToCpu, false, None, None),
            FibRoute::Single(nhop) => (
                FibAction::Nexthops,
                false,
                Some(u64::from(nhop.interface)),
                None,
            ),
            FibRoute::Ecmp(group) => (FibAction::Nexthops, true, None, Some(group.id())),
        };
        Self {
            network: prefix.as_address(),
            mask_len: prefix.length(),
            action,
            ecmp,
            egress_id,
            ecmp_egress_id,
        }
    }
}

/// Deterministic serialized form of a snapshot: routes sorted by
/// (family, network, mask length) for diffability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub vrf: VrfId,
    pub routes: Vec<RouteDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{distance, ClientId};
    use crate::updater::tests::{fwd_entry, mk_addr, TestVrf};
    use crate::updater::RouteUpdater;

    fn build_sample_vrf() -> TestVrf {
        let mut vrf = TestVrf::new();
        let mut updater = vrf.updater();
        updater
            .add_interface_route("10.0.0.0/30".into(), mk_addr("10.0.0.2"), 1)
            .expect("Should succeed");
        updater
            .add_interface_route("10.0.0.4/30".into(), mk_addr("10.0.0.6"), 2)
            .expect("Should succeed");
        /* ecmp over both connected subnets */
        updater.add(
            "8.0.0.0/24".into(),
            ClientId::BGP,
            fwd_entry(distance::EBGP, &["10.0.0.1", "10.0.0.5"]),
        );
        /* a null route and a cpu route */
        updater.add(
            "9.0.0.0/24".into(),
            ClientId::STATIC,
            crate::entry::RouteNextHopEntry::with_drop(distance::STATIC_ROUTE),
        );
        updater.add_link_local_routes();
        /* an unresolvable route: no cover for its gateway */
        updater.add(
            "11.0.0.0/24".into(),
            ClientId::BGP,
            fwd_entry(distance::EBGP, &["99.0.0.1"]),
        );
        updater.commit();
        vrf
    }

    #[test]
    fn test_snapshot_skips_unresolved() {
        let vrf = build_sample_vrf();
        let mut groups = NextHopGroupTable::new();
        let snapshot = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);

        /* 2 connected + 1 ecmp + 1 drop + 1 link-local; the unresolvable
        one is left out */
        assert_eq!(snapshot.len_v4(), 5);
        assert_eq!(snapshot.len_v6(), 1);
        assert!(snapshot.get(&"11.0.0.0/24".into()).is_none());
        assert!(snapshot.get(&"8.0.0.0/24".into()).is_some());
    }

    #[test]
    fn test_snapshot_single_vs_ecmp() {
        let vrf = build_sample_vrf();
        let mut groups = NextHopGroupTable::new();
        let snapshot = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);

        match snapshot.get(&"10.0.0.0/30".into()).expect("Should be there") {
            FibRoute::Single(nhop) => assert_eq!(nhop.interface, 1),
            other => panic!("Expected single path, got {other:?}"),
        }
        match snapshot.get(&"8.0.0.0/24".into()).expect("Should be there") {
            FibRoute::Ecmp(group) => assert_eq!(group.width(), 2),
            other => panic!("Expected ecmp, got {other:?}"),
        }
        assert_eq!(
            snapshot.get(&"9.0.0.0/24".into()),
            Some(&FibRoute::Drop)
        );
        assert_eq!(
            snapshot.get(&"169.254.0.0/16".into()),
            Some(&FibRoute::ToCpu)
        );
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_ecmp_handle_stable_across_snapshots() {
        let vrf = build_sample_vrf();
        let mut groups = NextHopGroupTable::new();

        let first = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);
        let second = FibBuilder::build(0, 2, &vrf.v4, &vrf.v6, &mut groups);

        let id_of = |snap: &ForwardingSnapshot| match snap
            .get(&"8.0.0.0/24".into())
            .expect("Should be there")
        {
            FibRoute::Ecmp(group) => group.id(),
            other => panic!("Expected ecmp, got {other:?}"),
        };
        assert_eq!(id_of(&first), id_of(&second));
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_document_sorted_and_round_trips() {
        let vrf = build_sample_vrf();
        let mut groups = NextHopGroupTable::new();
        let snapshot = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);

        let doc = snapshot.document();
        assert_eq!(doc.routes.len(), 6);

        /* v4 before v6, networks ascending within a family */
        let families: Vec<bool> = doc.routes.iter().map(|r| r.network.is_ipv4()).collect();
        let first_v6 = families.iter().position(|v4| !v4).expect("Has v6");
        assert!(families[..first_v6].iter().all(|v4| *v4));
        assert!(families[first_v6..].iter().all(|v4| !*v4));

        /* serialization is deterministic and round-trips */
        let json = serde_json::to_string_pretty(&doc).expect("Should serialize");
        let parsed: SnapshotDocument = serde_json::from_str(&json).expect("Should parse");
        assert_eq!(parsed, doc);
        let again = serde_json::to_string_pretty(&parsed).expect("Should serialize");
        assert_eq!(json, again);
    }

    #[test]
    fn test_wide_ecmp_resolves_and_dedups() {
        let mut vrf = TestVrf::new();
        let mut updater = vrf.updater();
        updater
            .add_interface_route("10.0.0.0/16".into(), mk_addr("10.0.255.254"), 1)
            .expect("Should succeed");
        let gateways: Vec<String> = (0..256).map(|i| format!("10.0.1.{i}")).collect();
        let gateway_refs: Vec<&str> = gateways.iter().map(String::as_str).collect();
        updater.add(
            "8.0.0.0/8".into(),
            ClientId::BGP,
            fwd_entry(distance::EBGP, &gateway_refs),
        );
        updater.commit();

        let mut groups = NextHopGroupTable::new();
        let first = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);
        let second = FibBuilder::build(0, 2, &vrf.v4, &vrf.v6, &mut groups);
        for snapshot in [&first, &second] {
            match snapshot.get(&"8.0.0.0/8".into()).expect("Should be there") {
                FibRoute::Ecmp(group) => assert_eq!(group.width(), 256),
                other => panic!("Expected ecmp, got {other:?}"),
            }
        }
        /* both snapshots share the one group */
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_document_egress_fields() {
        let vrf = build_sample_vrf();
        let mut groups = NextHopGroupTable::new();
        let snapshot = FibBuilder::build(0, 1, &vrf.v4, &vrf.v6, &mut groups);
        let doc = snapshot.document();

        let route = |network: &str| {
            doc.routes
                .iter()
                .find(|r| r.network == mk_addr(network))
                .expect("Should be there")
        };

        let single = route("10.0.0.0");
        assert_eq!(single.action, FibAction::Nexthops);
        assert!(!single.ecmp);
        assert_eq!(single.egress_id, Some(1));
        assert_eq!(single.ecmp_egress_id, None);

        let ecmp = route("8.0.0.0");
        assert!(ecmp.ecmp);
        assert_eq!(ecmp.egress_id, None);
        assert!(ecmp.ecmp_egress_id.is_some());

        let null = route("9.0.0.0");
        assert_eq!(null.action, FibAction::Drop);
    }
}
