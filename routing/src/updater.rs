// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mutation engine over one VRF's route tables. A `RouteUpdater` is built
//! for a single transaction: the caller applies its additions and removals
//! and then runs `commit()`, which re-resolves the tables.

use std::net::IpAddr;

use ahash::{AHashMap, AHashSet};
use lpm::prefix::{Ipv4Prefix, Ipv6Prefix, Prefix};
use lpm::trie::{PrefixTrieMap, TrieMap};
use tracing::{debug, warn};

use crate::client::{distance, ClientId, ClientPriorities, InterfaceId};
use crate::entry::{Forward, Resolution, RouteAction, RouteEntry, RouteNextHopEntry};
use crate::errors::RibError;
use crate::nexthop::{NextHop, ResolvedNextHop, ResolvedNextHopSet};

/// IPv4 half of a VRF's routing table.
pub type Ipv4RouteTable = PrefixTrieMap<Ipv4Prefix, RouteEntry>;
/// IPv6 half of a VRF's routing table.
pub type Ipv6RouteTable = PrefixTrieMap<Ipv6Prefix, RouteEntry>;

/// Longest next-hop chain followed before a route is declared unresolvable.
pub const MAX_RESOLUTION_DEPTH: usize = 32;

/// Counters reported by a commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub v4_resolved: usize,
    pub v4_unresolved: usize,
    pub v6_resolved: usize,
    pub v6_unresolved: usize,
}

/// Outcome of resolving one client next-hop; paths carry the height of the
/// chain walked below them.
enum NhopResolution {
    Paths(Vec<ResolvedNextHop>, usize),
    Drop,
    ToCpu,
    Unresolved,
}

/// Memoized successful resolutions, with the height of the chain below
/// each entry.
type ResolutionMemo = AHashMap<Prefix, (Resolution, usize)>;

pub struct RouteUpdater<'a> {
    v4: &'a mut Ipv4RouteTable,
    v6: &'a mut Ipv6RouteTable,
    prios: &'a ClientPriorities,
}

impl<'a> RouteUpdater<'a> {
    #[must_use]
    pub fn new(
        v4: &'a mut Ipv4RouteTable,
        v6: &'a mut Ipv6RouteTable,
        prios: &'a ClientPriorities,
    ) -> Self {
        Self { v4, v6, prios }
    }

    /////////////////////////////////////////////////////////////////////////
    // Route insertion and removal
    /////////////////////////////////////////////////////////////////////////

    /// Install or replace one client's candidate for a prefix.
    pub fn add(&mut self, prefix: Prefix, client: ClientId, entry: RouteNextHopEntry) {
        match prefix {
            Prefix::IPV4(p) => Self::add_in(self.v4, p, prefix, client, entry, self.prios),
            Prefix::IPV6(p) => Self::add_in(self.v6, p, prefix, client, entry, self.prios),
        }
    }

    fn add_in<T>(
        table: &mut T,
        key: T::Prefix,
        prefix: Prefix,
        client: ClientId,
        entry: RouteNextHopEntry,
        prios: &ClientPriorities,
    ) where
        T: TrieMap<Value = RouteEntry>,
    {
        if let Some(route) = table.get_mut(&key) {
            route.add_or_replace(client, entry, prios);
        } else {
            let mut route = RouteEntry::new(prefix);
            route.add_or_replace(client, entry, prios);
            table.insert(key, route);
        }
    }

    /// Remove one client's candidate for a prefix; the entry is destroyed
    /// when its last candidate goes. Tells whether a candidate was removed.
    pub fn del(&mut self, prefix: Prefix, client: ClientId) -> bool {
        match prefix {
            Prefix::IPV4(p) => Self::del_in(self.v4, &p, client, self.prios),
            Prefix::IPV6(p) => Self::del_in(self.v6, &p, client, self.prios),
        }
    }

    fn del_in<T>(table: &mut T, key: &T::Prefix, client: ClientId, prios: &ClientPriorities) -> bool
    where
        T: TrieMap<Value = RouteEntry>,
    {
        let Some(route) = table.get_mut(key) else {
            return false;
        };
        let removed = route.remove(client, prios).is_some();
        if route.is_empty() {
            table.remove(key);
        }
        removed
    }

    /// Drop every candidate owned by a client, pruning emptied entries.
    /// Returns the number of candidates removed per family.
    pub fn remove_all_for_client(&mut self, client: ClientId) -> (usize, usize) {
        let v4 = Self::purge_client(self.v4, client, self.prios);
        let v6 = Self::purge_client(self.v6, client, self.prios);
        if v4 + v6 > 0 {
            debug!("Purged {} routes of client {client}", v4 + v6);
        }
        (v4, v6)
    }

    fn purge_client<T>(table: &mut T, client: ClientId, prios: &ClientPriorities) -> usize
    where
        T: TrieMap<Value = RouteEntry>,
    {
        let owned: Vec<T::Prefix> = table
            .iter()
            .filter(|(_, route)| route.has_client(client))
            .map(|(prefix, _)| prefix)
            .collect();
        for prefix in &owned {
            Self::del_in(table, prefix, client, prios);
        }
        owned.len()
    }

    /// Install a connected route: the interface client owns it, and the
    /// interface scope on its next-hop makes it terminate resolution chains.
    ///
    /// # Errors
    /// Fails if the interface address is unusable as a next-hop.
    pub fn add_interface_route(
        &mut self,
        prefix: Prefix,
        address: IpAddr,
        interface: InterfaceId,
    ) -> Result<(), RibError> {
        let nhop = NextHop::with_addr_interface(address, interface);
        let entry = RouteNextHopEntry::from_nexthops(distance::DIRECTLY_CONNECTED, [nhop])?;
        self.add(prefix, ClientId::INTERFACE, entry);
        Ok(())
    }

    /// Ensure the link-local ranges are present, owned by the link-local
    /// client and punted to the CPU.
    pub fn add_link_local_routes(&mut self) {
        let entry = RouteNextHopEntry::with_to_cpu(distance::DIRECTLY_CONNECTED);
        self.add(
            Prefix::ipv4_link_local(),
            ClientId::LINK_LOCAL,
            entry.clone(),
        );
        self.add(Prefix::ipv6_link_local(), ClientId::LINK_LOCAL, entry);
    }

    /////////////////////////////////////////////////////////////////////////
    // Commit: recursive next-hop resolution
    /////////////////////////////////////////////////////////////////////////

    /// Re-resolve both tables. Entries whose chains terminate in connected
    /// routes become `Resolved`; the rest become `Unresolved` and will be
    /// skipped by the FIB builder. Resolution failures never fail the
    /// transaction.
    ///
    /// Each entry is resolved as the root of its own chain walk. Successful
    /// resolutions are memoized together with the height of the chain below
    /// them, so that a reuse deeper in another walk still honors the depth
    /// budget. Failed resolutions are never memoized: whether a chain fits
    /// in the budget depends on where the walk entered it.
    pub fn commit(&mut self) -> ResolutionSummary {
        let mut memo: ResolutionMemo = AHashMap::new();
        let v4keys: Vec<Ipv4Prefix> = self.v4.iter().map(|(p, _)| p).collect();
        let v6keys: Vec<Ipv6Prefix> = self.v6.iter().map(|(p, _)| p).collect();

        let mut summary = ResolutionSummary::default();
        for p in v4keys {
            let mut stack = AHashSet::new();
            let (res, _) = self.resolve_route(Prefix::IPV4(p), &mut memo, &mut stack, 0);
            match res {
                Resolution::Resolved(_) => summary.v4_resolved += 1,
                _ => summary.v4_unresolved += 1,
            }
            if let Some(route) = self.v4.get_mut(&p) {
                route.set_resolution(normalize_outcome(res));
            }
        }
        for p in v6keys {
            let mut stack = AHashSet::new();
            let (res, _) = self.resolve_route(Prefix::IPV6(p), &mut memo, &mut stack, 0);
            match res {
                Resolution::Resolved(_) => summary.v6_resolved += 1,
                _ => summary.v6_unresolved += 1,
            }
            if let Some(route) = self.v6.get_mut(&p) {
                route.set_resolution(normalize_outcome(res));
            }
        }
        debug!(
            "Resolution done: v4 {}/{} v6 {}/{} resolved",
            summary.v4_resolved,
            summary.v4_resolved + summary.v4_unresolved,
            summary.v6_resolved,
            summary.v6_resolved + summary.v6_unresolved
        );
        summary
    }

    /// Resolve one prefix at the given chain depth. Returns the outcome and
    /// the height of the chain hanging below this entry (meaningful only
    /// for resolved outcomes). `Resolving` is returned when the walk loops
    /// back into an entry already on the stack.
    fn resolve_route(
        &self,
        prefix: Prefix,
        memo: &mut ResolutionMemo,
        stack: &mut AHashSet<Prefix>,
        depth: usize,
    ) -> (Resolution, usize) {
        if let Some((res, height)) = memo.get(&prefix) {
            if depth + height > MAX_RESOLUTION_DEPTH {
                return (Resolution::Unresolved, 0);
            }
            return (res.clone(), *height);
        }
        if stack.contains(&prefix) {
            return (Resolution::Resolving, 0);
        }
        stack.insert(prefix);
        let (res, height) = self.resolve_best(prefix, memo, stack, depth);
        stack.remove(&prefix);
        if matches!(res, Resolution::Resolved(_)) {
            memo.insert(prefix, (res.clone(), height));
        }
        (res, height)
    }

    fn resolve_best(
        &self,
        prefix: Prefix,
        memo: &mut ResolutionMemo,
        stack: &mut AHashSet<Prefix>,
        depth: usize,
    ) -> (Resolution, usize) {
        let Some(route) = self.get_route(&prefix) else {
            return (Resolution::Unresolved, 0);
        };
        let Some((_, best)) = route.best() else {
            return (Resolution::Unresolved, 0);
        };
        match best.action() {
            RouteAction::Drop => (Resolution::Resolved(Forward::Drop), 0),
            RouteAction::ToCpu => (Resolution::Resolved(Forward::ToCpu), 0),
            RouteAction::Forward => {
                let mut paths: Vec<ResolvedNextHop> = Vec::new();
                let mut height = 0;
                for nhop in best.nhops().iter() {
                    match self.resolve_nexthop(nhop, memo, stack, depth) {
                        NhopResolution::Paths(mut resolved, nh_height) => {
                            paths.append(&mut resolved);
                            height = height.max(nh_height);
                        }
                        NhopResolution::Drop => {
                            return (Resolution::Resolved(Forward::Drop), 0);
                        }
                        NhopResolution::ToCpu => {
                            return (Resolution::Resolved(Forward::ToCpu), 0);
                        }
                        NhopResolution::Unresolved => return (Resolution::Unresolved, 0),
                    }
                }
                (
                    Resolution::Resolved(Forward::Nexthops(ResolvedNextHopSet::from_paths(paths))),
                    height,
                )
            }
        }
    }

    /// Resolve one client next-hop. Next-hops that already carry an
    /// interface scope need no recursion; the others follow the longest
    /// match of their gateway in the gateway's family.
    fn resolve_nexthop(
        &self,
        nhop: &NextHop,
        memo: &mut ResolutionMemo,
        stack: &mut AHashSet<Prefix>,
        depth: usize,
    ) -> NhopResolution {
        if let Some(interface) = nhop.interface {
            return NhopResolution::Paths(
                vec![ResolvedNextHop {
                    addr: nhop.addr,
                    interface,
                    weight: nhop.weight,
                    labels: nhop.labels.clone(),
                }],
                0,
            );
        }
        if depth >= MAX_RESOLUTION_DEPTH {
            warn!("Next-hop {} exceeds max resolution depth", nhop.addr);
            return NhopResolution::Unresolved;
        }
        let Some(covering) = self.lpm(&nhop.addr) else {
            return NhopResolution::Unresolved;
        };
        let (res, height) = self.resolve_route(covering, memo, stack, depth + 1);
        match res {
            Resolution::Resolved(Forward::Drop) => NhopResolution::Drop,
            Resolution::Resolved(Forward::ToCpu) => NhopResolution::ToCpu,
            Resolution::Resolved(Forward::Nexthops(set)) => {
                /* the chain terminated over connected routes: keep the
                original gateway, inherit each egress interface */
                let paths = set
                    .iter()
                    .map(|resolved| ResolvedNextHop {
                        addr: nhop.addr,
                        interface: resolved.interface,
                        weight: combine_weights(nhop.weight, resolved.weight),
                        labels: nhop.labels.clone(),
                    })
                    .collect();
                NhopResolution::Paths(paths, height + 1)
            }
            /* Resolving here means the chain looped back on itself */
            _ => NhopResolution::Unresolved,
        }
    }

    fn get_route(&self, prefix: &Prefix) -> Option<&RouteEntry> {
        match prefix {
            Prefix::IPV4(p) => self.v4.get(p),
            Prefix::IPV6(p) => self.v6.get(p),
        }
    }

    fn lpm(&self, addr: &IpAddr) -> Option<Prefix> {
        match addr {
            IpAddr::V4(a) => self.v4.lookup(*a).map(|(p, _)| Prefix::IPV4(p)),
            IpAddr::V6(a) => self.v6.lookup(*a).map(|(p, _)| Prefix::IPV6(p)),
        }
    }
}

/// Collapse walk-internal outcomes into the states a route entry may hold.
fn normalize_outcome(res: Resolution) -> Resolution {
    match res {
        Resolution::Resolved(fwd) => Resolution::Resolved(fwd),
        _ => Resolution::Unresolved,
    }
}

/// Weight carried by an expanded path: the original weight share survives
/// the expansion; unweighted members stay unweighted.
fn combine_weights(own: u32, inherited: u32) -> u32 {
    match (own, inherited) {
        (0, _) => 0,
        (w, 0) => w,
        (w, i) => w.saturating_mul(i),
    }
}
