// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The routing information base: one pair of route tables per VRF behind a
//! single writer lock, transactional updates, FIB snapshot publication and
//! the read-only query surface.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use lpm::prefix::Prefix;
use lpm::trie::TrieMap;
use tracing::{debug, info, warn};

use crate::client::{
    default_admin_distance, distance, AdminDistance, ClientId, ClientPriorities, InterfaceId,
    VrfId, DEFAULT_VRF,
};
use crate::entry::{Resolution, RouteAction, RouteEntry, RouteNextHopEntry};
use crate::errors::{ApplyError, RibError};
use crate::fib::{FibBuilder, ForwardingSnapshot};
use crate::logger::{RouteUpdateEvent, RouteUpdateLoggingInstance, UpdateLogger};
use crate::mpath::NextHopGroupTable;
use crate::nexthop::NextHop;
use crate::updater::{Ipv4RouteTable, Ipv6RouteTable, RouteUpdater};

/// Result of the apply callback.
pub type ApplyResult = Result<(), ApplyError>;

/// A route as exchanged with routing clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastRoute {
    pub prefix: Prefix,
    pub action: RouteAction,
    pub next_hops: Vec<NextHop>,
}

impl UnicastRoute {
    #[must_use]
    pub fn to_nexthops(prefix: Prefix, next_hops: Vec<NextHop>) -> Self {
        Self {
            prefix,
            action: RouteAction::Forward,
            next_hops,
        }
    }

    #[must_use]
    pub fn to_cpu(prefix: Prefix) -> Self {
        Self {
            prefix,
            action: RouteAction::ToCpu,
            next_hops: Vec::new(),
        }
    }

    #[must_use]
    pub fn to_null(prefix: Prefix) -> Self {
        Self {
            prefix,
            action: RouteAction::Drop,
            next_hops: Vec::new(),
        }
    }
}

/// Full per-prefix detail for the introspection APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDetails {
    pub prefix: Prefix,
    pub candidates: Vec<(ClientId, RouteNextHopEntry)>,
    pub best_client: Option<ClientId>,
    pub fwd: Resolution,
    pub connected: bool,
}

impl RouteDetails {
    fn from_entry(entry: &RouteEntry) -> Self {
        Self {
            prefix: entry.prefix(),
            candidates: entry.candidates().map(|(c, e)| (c, e.clone())).collect(),
            best_client: entry.best().map(|(c, _)| c),
            fwd: entry.resolution().clone(),
            connected: entry.is_connected(),
        }
    }
}

/// Counters returned by each transaction. Duration spans from lock
/// acquisition to the return of the apply callback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateStatistics {
    pub v4_added: u64,
    pub v4_deleted: u64,
    pub v6_added: u64,
    pub v6_deleted: u64,
    pub duration: Duration,
}

/// A connected subnet of an L3 interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRoute {
    pub prefix: Prefix,
    pub address: IpAddr,
    pub interface: InterfaceId,
}

/// A configured static route with explicit next-hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRouteWithNextHops {
    pub vrf: VrfId,
    pub prefix: Prefix,
    pub next_hops: Vec<NextHop>,
}

/// A configured static route with no next-hops (null or CPU routes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRouteNoNextHops {
    pub vrf: VrfId,
    pub prefix: Prefix,
}

/// Configuration applied by [`Rib::reconfigure`]. The VRF set is exactly
/// the key set of `interface_routes`; statics for other VRFs are ignored.
#[derive(Debug, Clone, Default)]
pub struct RibConfig {
    pub interface_routes: BTreeMap<VrfId, Vec<InterfaceRoute>>,
    pub static_routes_with_next_hops: Vec<StaticRouteWithNextHops>,
    pub static_routes_to_cpu: Vec<StaticRouteNoNextHops>,
    pub static_routes_to_null: Vec<StaticRouteNoNextHops>,
}

/// One VRF's pair of route tables plus the snapshot last handed to the
/// apply callback.
#[derive(Default)]
struct RouteTables {
    v4: Ipv4RouteTable,
    v6: Ipv6RouteTable,
    applied: Option<Arc<ForwardingSnapshot>>,
}

struct RibInner {
    vrfs: BTreeMap<VrfId, RouteTables>,
    groups: NextHopGroupTable,
    logger: UpdateLogger,
    generation: u64,
}

/// The routing information base. A single writer lock serializes every
/// transaction (including the apply callback) across all VRFs; read-only
/// queries take the reader side.
pub struct Rib {
    prios: ClientPriorities,
    inner: RwLock<RibInner>,
}

impl Default for Rib {
    fn default() -> Self {
        Self::new()
    }
}

impl Rib {
    /// Build a RIB with the default client priority order. The default VRF
    /// is present from the start.
    #[must_use]
    pub fn new() -> Self {
        Self::with_priorities(ClientPriorities::default())
    }

    #[must_use]
    pub fn with_priorities(prios: ClientPriorities) -> Self {
        let mut vrfs = BTreeMap::new();
        vrfs.insert(DEFAULT_VRF, RouteTables::default());
        Self {
            prios,
            inner: RwLock::new(RibInner {
                vrfs,
                groups: NextHopGroupTable::new(),
                logger: UpdateLogger::new(),
                generation: 0,
            }),
        }
    }

    /////////////////////////////////////////////////////////////////////////
    // Transactions
    /////////////////////////////////////////////////////////////////////////

    /// Apply one client transaction to a VRF: optionally purge the client's
    /// routes, apply removals, then additions (additions win on prefixes
    /// named by both), re-resolve, build the snapshot and hand it to
    /// `apply_fn`. Input validation happens before anything mutates;
    /// per-prefix resolution failures do not fail the transaction.
    ///
    /// # Errors
    /// Fails on unknown VRF, malformed routes, or apply-callback failure.
    /// The RIB keeps the post-transaction state even when the callback
    /// fails.
    #[allow(clippy::too_many_arguments)]
    pub fn update<F>(
        &self,
        vrf: VrfId,
        client: ClientId,
        admin_distance: AdminDistance,
        to_add: &[UnicastRoute],
        to_delete: &[Prefix],
        reset_client_routes: bool,
        update_type: &str,
        apply_fn: F,
    ) -> Result<UpdateStatistics, RibError>
    where
        F: FnOnce(&str, &Arc<ForwardingSnapshot>) -> ApplyResult,
    {
        /* validate and normalize all additions up front */
        let mut additions: Vec<(Prefix, RouteNextHopEntry)> = Vec::with_capacity(to_add.len());
        for route in to_add {
            additions.push((route.prefix, entry_from_route(route, admin_distance)?));
        }

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        let inner = &mut *guard;

        let Some(tables) = inner.vrfs.get_mut(&vrf) else {
            return Err(RibError::NoSuchVrf(vrf));
        };

        let mut stats = UpdateStatistics::default();
        {
            let mut updater = RouteUpdater::new(&mut tables.v4, &mut tables.v6, &self.prios);
            if reset_client_routes {
                updater.remove_all_for_client(client);
            }
            for prefix in to_delete {
                if updater.del(*prefix, client) {
                    match prefix {
                        Prefix::IPV4(_) => stats.v4_deleted += 1,
                        Prefix::IPV6(_) => stats.v6_deleted += 1,
                    }
                }
            }
            for (prefix, entry) in additions {
                match prefix {
                    Prefix::IPV4(_) => stats.v4_added += 1,
                    Prefix::IPV6(_) => stats.v6_added += 1,
                }
                updater.add(prefix, client, entry);
            }
            updater.commit();
        }

        inner.generation += 1;
        let snapshot = Arc::new(FibBuilder::build(
            vrf,
            inner.generation,
            &tables.v4,
            &tables.v6,
            &mut inner.groups,
        ));

        let apply_result = apply_fn(update_type, &snapshot);
        stats.duration = start.elapsed();

        /* the in-memory state reflects the attempted update regardless of
        the apply outcome; the snapshot handed out is what we diff against
        next time */
        let prev = tables.applied.replace(snapshot.clone());
        inner.logger.log_diff(vrf, prev.as_deref(), &snapshot);

        debug!(
            "{update_type}: vrf {vrf} client {client} +{}/{} -{}/{} in {:?}",
            stats.v4_added, stats.v6_added, stats.v4_deleted, stats.v6_deleted, stats.duration
        );
        apply_result?;
        Ok(stats)
    }

    /// Replace all of one client's routes in a VRF with the given set, in
    /// one transaction.
    ///
    /// # Errors
    /// Same failure modes as [`Rib::update`].
    pub fn sync_fib<F>(
        &self,
        vrf: VrfId,
        client: ClientId,
        routes: &[UnicastRoute],
        apply_fn: F,
    ) -> Result<UpdateStatistics, RibError>
    where
        F: FnOnce(&str, &Arc<ForwardingSnapshot>) -> ApplyResult,
    {
        self.update(
            vrf,
            client,
            default_admin_distance(client),
            routes,
            &[],
            true,
            "syncFib",
            apply_fn,
        )
    }

    /// Add routes for a client without touching its other routes.
    ///
    /// # Errors
    /// Same failure modes as [`Rib::update`].
    pub fn add_unicast_routes<F>(
        &self,
        vrf: VrfId,
        client: ClientId,
        routes: &[UnicastRoute],
        apply_fn: F,
    ) -> Result<UpdateStatistics, RibError>
    where
        F: FnOnce(&str, &Arc<ForwardingSnapshot>) -> ApplyResult,
    {
        self.update(
            vrf,
            client,
            default_admin_distance(client),
            routes,
            &[],
            false,
            "addUnicastRoutes",
            apply_fn,
        )
    }

    /// Delete specific prefixes of a client.
    ///
    /// # Errors
    /// Same failure modes as [`Rib::update`].
    pub fn delete_unicast_routes<F>(
        &self,
        vrf: VrfId,
        client: ClientId,
        prefixes: &[Prefix],
        apply_fn: F,
    ) -> Result<UpdateStatistics, RibError>
    where
        F: FnOnce(&str, &Arc<ForwardingSnapshot>) -> ApplyResult,
    {
        self.update(
            vrf,
            client,
            default_admin_distance(client),
            &[],
            prefixes,
            false,
            "deleteUnicastRoutes",
            apply_fn,
        )
    }

    /// Atomically replace the VRF set and, per VRF, the interface and
    /// static routes, from configuration. VRFs absent from the new config
    /// are dropped with all their routes; VRFs that persist keep the routes
    /// of all non-config clients. Link-local routes are seeded into every
    /// VRF. Each VRF's snapshot is rebuilt and applied in turn.
    ///
    /// # Errors
    /// Fails on malformed config routes before mutating, or on apply
    /// failure (remaining VRFs are not processed).
    pub fn reconfigure<F>(&self, config: &RibConfig, mut apply_fn: F) -> Result<(), RibError>
    where
        F: FnMut(&str, &Arc<ForwardingSnapshot>) -> ApplyResult,
    {
        /* validate every configured static up front */
        let mut statics: BTreeMap<VrfId, Vec<(Prefix, RouteNextHopEntry)>> = BTreeMap::new();
        for route in &config.static_routes_with_next_hops {
            let entry = RouteNextHopEntry::from_nexthops(
                distance::STATIC_ROUTE,
                route.next_hops.iter().cloned(),
            )?;
            statics
                .entry(route.vrf)
                .or_default()
                .push((route.prefix, entry));
        }
        for route in &config.static_routes_to_cpu {
            statics
                .entry(route.vrf)
                .or_default()
                .push((route.prefix, RouteNextHopEntry::with_to_cpu(distance::STATIC_ROUTE)));
        }
        for route in &config.static_routes_to_null {
            statics
                .entry(route.vrf)
                .or_default()
                .push((route.prefix, RouteNextHopEntry::with_drop(distance::STATIC_ROUTE)));
        }
        /* and every interface route */
        let mut connected: BTreeMap<VrfId, Vec<(Prefix, RouteNextHopEntry)>> = BTreeMap::new();
        for (vrf, routes) in &config.interface_routes {
            let prepared = connected.entry(*vrf).or_default();
            for route in routes {
                let nhop = NextHop::with_addr_interface(route.address, route.interface);
                let entry =
                    RouteNextHopEntry::from_nexthops(distance::DIRECTLY_CONNECTED, [nhop])?;
                prepared.push((route.prefix, entry));
            }
        }

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;

        /* rebuild the VRF set: keep surviving tables, create new ones,
        drop the rest */
        let mut old = std::mem::take(&mut inner.vrfs);
        for vrf in config.interface_routes.keys() {
            let tables = old.remove(vrf).unwrap_or_default();
            inner.vrfs.insert(*vrf, tables);
        }
        for vrf in old.keys() {
            info!("Dropping VRF {vrf}: absent from new configuration");
        }
        drop(old);

        for (vrf, tables) in &mut inner.vrfs {
            {
                let mut updater = RouteUpdater::new(&mut tables.v4, &mut tables.v6, &self.prios);

                /* static routes become exactly those configured */
                updater.remove_all_for_client(ClientId::STATIC);
                if let Some(routes) = statics.get(vrf) {
                    for (prefix, entry) in routes {
                        updater.add(*prefix, ClientId::STATIC, entry.clone());
                    }
                }

                /* same for interface routes */
                updater.remove_all_for_client(ClientId::INTERFACE);
                if let Some(routes) = connected.get(vrf) {
                    for (prefix, entry) in routes {
                        updater.add(*prefix, ClientId::INTERFACE, entry.clone());
                    }
                }

                updater.add_link_local_routes();
                updater.commit();
            }

            inner.generation += 1;
            let snapshot = Arc::new(FibBuilder::build(
                *vrf,
                inner.generation,
                &tables.v4,
                &tables.v6,
                &mut inner.groups,
            ));
            let apply_result = apply_fn("reconfigure", &snapshot);
            let prev = tables.applied.replace(snapshot.clone());
            inner.logger.log_diff(*vrf, prev.as_deref(), &snapshot);
            apply_result?;
        }
        info!("Reconfigured: {} VRFs", inner.vrfs.len());
        Ok(())
    }

    /////////////////////////////////////////////////////////////////////////
    // Read-only queries
    /////////////////////////////////////////////////////////////////////////

    /// All routes of one client in a VRF.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn routes_for_client(
        &self,
        vrf: VrfId,
        client: ClientId,
    ) -> Result<Vec<UnicastRoute>, RibError> {
        self.with_tables(vrf, |tables| {
            let mut routes = Vec::new();
            for (_, entry) in tables.v4.iter() {
                if let Some(candidate) = entry.client_entry(client) {
                    routes.push(unicast_from_entry(entry.prefix(), candidate));
                }
            }
            for (_, entry) in tables.v6.iter() {
                if let Some(candidate) = entry.client_entry(client) {
                    routes.push(unicast_from_entry(entry.prefix(), candidate));
                }
            }
            routes
        })
    }

    /// The best route of every prefix in a VRF.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn all_routes(&self, vrf: VrfId) -> Result<Vec<UnicastRoute>, RibError> {
        self.with_tables(vrf, |tables| {
            let mut routes = Vec::new();
            for (_, entry) in tables.v4.iter() {
                if let Some((_, best)) = entry.best() {
                    routes.push(unicast_from_entry(entry.prefix(), best));
                }
            }
            for (_, entry) in tables.v6.iter() {
                if let Some((_, best)) = entry.best() {
                    routes.push(unicast_from_entry(entry.prefix(), best));
                }
            }
            routes
        })
    }

    /// Every prefix of a VRF with its full multi-client detail.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn route_details(&self, vrf: VrfId) -> Result<Vec<RouteDetails>, RibError> {
        self.with_tables(vrf, |tables| {
            let mut details = Vec::new();
            for (_, entry) in tables.v4.iter() {
                details.push(RouteDetails::from_entry(entry));
            }
            for (_, entry) in tables.v6.iter() {
                details.push(RouteDetails::from_entry(entry));
            }
            details
        })
    }

    /// The best route covering an address, by longest-prefix match.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn ip_route(&self, vrf: VrfId, addr: IpAddr) -> Result<Option<UnicastRoute>, RibError> {
        self.with_tables(vrf, |tables| {
            lpm_entry(tables, &addr)
                .and_then(|entry| entry.best().map(|(_, best)| unicast_from_entry(entry.prefix(), best)))
        })
    }

    /// Like [`Rib::ip_route`] but returning full detail.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn ip_route_details(
        &self,
        vrf: VrfId,
        addr: IpAddr,
    ) -> Result<Option<RouteDetails>, RibError> {
        self.with_tables(vrf, |tables| {
            lpm_entry(tables, &addr).map(RouteDetails::from_entry)
        })
    }

    /// The snapshot last handed to the apply callback for a VRF.
    ///
    /// # Errors
    /// Fails if the VRF does not exist.
    pub fn applied_snapshot(
        &self,
        vrf: VrfId,
    ) -> Result<Option<Arc<ForwardingSnapshot>>, RibError> {
        self.with_tables(vrf, |tables| tables.applied.clone())
    }

    /// The configured VRF ids.
    #[must_use]
    pub fn vrfs(&self) -> Vec<VrfId> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.vrfs.keys().copied().collect()
    }

    fn with_tables<R>(
        &self,
        vrf: VrfId,
        f: impl FnOnce(&RouteTables) -> R,
    ) -> Result<R, RibError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let tables = guard.vrfs.get(&vrf).ok_or(RibError::NoSuchVrf(vrf))?;
        Ok(f(tables))
    }

    /////////////////////////////////////////////////////////////////////////
    // Update logging subscriptions
    /////////////////////////////////////////////////////////////////////////

    pub fn start_logging(&self, prefix: Prefix, identifier: &str, exact: bool) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.logger.start_logging(RouteUpdateLoggingInstance {
            prefix,
            identifier: identifier.to_string(),
            exact,
        });
    }

    pub fn stop_logging(&self, prefix: Prefix, identifier: &str) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.logger.stop_logging(prefix, identifier);
    }

    pub fn stop_logging_by_identifier(&self, identifier: &str) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.logger.stop_logging_by_identifier(identifier);
    }

    #[must_use]
    pub fn tracked_prefixes(&self) -> Vec<RouteUpdateLoggingInstance> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.logger.tracked_prefixes()
    }

    /// Events recorded by the update logger, oldest first.
    #[must_use]
    pub fn recent_update_events(&self) -> Vec<RouteUpdateEvent> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.logger.recent_events()
    }
}

fn lpm_entry<'a>(tables: &'a RouteTables, addr: &IpAddr) -> Option<&'a RouteEntry> {
    match addr {
        IpAddr::V4(a) => tables.v4.lookup(*a).map(|(_, entry)| entry),
        IpAddr::V6(a) => tables.v6.lookup(*a).map(|(_, entry)| entry),
    }
}

fn unicast_from_entry(prefix: Prefix, candidate: &RouteNextHopEntry) -> UnicastRoute {
    UnicastRoute {
        prefix,
        action: candidate.action(),
        next_hops: candidate.nhops().iter().cloned().collect(),
    }
}

/// Build the normalized candidate for one client-supplied route.
fn entry_from_route(
    route: &UnicastRoute,
    admin_distance: AdminDistance,
) -> Result<RouteNextHopEntry, RibError> {
    match route.action {
        RouteAction::Forward => {
            RouteNextHopEntry::from_nexthops(admin_distance, route.next_hops.iter().cloned())
        }
        RouteAction::Drop => {
            if !route.next_hops.is_empty() {
                warn!("Ignoring next-hops on null route for {}", route.prefix);
            }
            Ok(RouteNextHopEntry::with_drop(admin_distance))
        }
        RouteAction::ToCpu => Ok(RouteNextHopEntry::with_to_cpu(admin_distance)),
    }
}

#[cfg(test)]
#[allow(clippy::too_many_lines)]
mod tests {
    use super::*;
    use crate::fib::FibRoute;
    use crate::logger::UpdateKind;
    use std::str::FromStr;
    use tracing_test::traced_test;

    fn mk_addr(a: &str) -> IpAddr {
        IpAddr::from_str(a).expect("Bad address")
    }

    fn apply_ok(_: &str, _: &Arc<ForwardingSnapshot>) -> ApplyResult {
        Ok(())
    }

    fn nh_route(prefix: &str, gateways: &[&str]) -> UnicastRoute {
        UnicastRoute::to_nexthops(
            prefix.into(),
            gateways
                .iter()
                .map(|a| NextHop::with_addr(mk_addr(a)))
                .collect(),
        )
    }

    /// Two VRFs; VRF 0 has a connected subnet over interface 1.
    fn base_config() -> RibConfig {
        let mut interface_routes = BTreeMap::new();
        interface_routes.insert(
            0,
            vec![InterfaceRoute {
                prefix: "10.0.0.0/24".into(),
                address: mk_addr("10.0.0.254"),
                interface: 1,
            }],
        );
        interface_routes.insert(1, Vec::new());
        RibConfig {
            interface_routes,
            ..Default::default()
        }
    }

    fn configured_rib() -> Rib {
        let rib = Rib::new();
        rib.reconfigure(&base_config(), apply_ok).expect("Should reconfigure");
        rib
    }

    #[test]
    fn test_unknown_vrf_is_an_error() {
        let rib = Rib::new();
        let err = rib.update(
            7,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        );
        assert_eq!(err.unwrap_err(), RibError::NoSuchVrf(7));
    }

    #[test]
    fn test_validation_fails_before_mutation() {
        let rib = configured_rib();
        /* scopeless link-local next-hop fails the whole transaction */
        let err = rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[
                nh_route("8.0.0.0/24", &["10.0.0.1"]),
                nh_route("9.0.0.0/24", &["fe80::1"]),
            ],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        );
        assert_eq!(
            err.unwrap_err(),
            RibError::LinkLocalNoScope(mk_addr("fe80::1"))
        );
        /* nothing was committed, not even the valid route */
        assert!(rib
            .routes_for_client(0, ClientId::BGP)
            .expect("Should succeed")
            .is_empty());
    }

    #[test]
    fn test_admin_distance_tie_break_in_fib() {
        let rib = configured_rib();
        rib.update(
            0,
            ClientId::BGP,
            distance::IBGP,
            &[nh_route("5.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");
        rib.update(
            0,
            ClientId::STATIC,
            distance::STATIC_ROUTE,
            &[nh_route("5.0.0.0/24", &["10.0.0.2"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");

        let snapshot = rib
            .applied_snapshot(0)
            .expect("Should succeed")
            .expect("Should be applied");
        match snapshot.get(&"5.0.0.0/24".into()).expect("Should be there") {
            FibRoute::Single(nhop) => {
                assert_eq!(nhop.addr, mk_addr("10.0.0.2"));
                assert_eq!(nhop.interface, 1);
            }
            other => panic!("Expected single path, got {other:?}"),
        }
    }

    #[test]
    fn test_sync_fib_replaces_client_routes() {
        let rib = configured_rib();
        /* another client's route for one of the prefixes must survive */
        rib.update(
            0,
            ClientId::STATIC,
            distance::STATIC_ROUTE,
            &[nh_route("1.0.0.0/24", &["10.0.0.9"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");

        let stats = rib
            .update(
                0,
                ClientId::BGP,
                distance::EBGP,
                &[
                    nh_route("1.0.0.0/24", &["10.0.0.1"]),
                    nh_route("2.0.0.0/24", &["10.0.0.1"]),
                    nh_route("3.0.0.0/24", &["10.0.0.1"]),
                ],
                &[],
                true,
                "addUnicastRoutes",
                apply_ok,
            )
            .expect("Should succeed");
        assert_eq!(stats.v4_added, 3);

        rib.sync_fib(
            0,
            ClientId::BGP,
            &[
                nh_route("1.0.0.0/24", &["10.0.0.1"]),
                nh_route("4.0.0.0/24", &["10.0.0.1"]),
            ],
            apply_ok,
        )
        .expect("Should succeed");

        let mut bgp: Vec<Prefix> = rib
            .routes_for_client(0, ClientId::BGP)
            .expect("Should succeed")
            .iter()
            .map(|r| r.prefix)
            .collect();
        bgp.sort();
        assert_eq!(
            bgp,
            vec![Prefix::from("1.0.0.0/24"), Prefix::from("4.0.0.0/24")]
        );

        /* the static candidate on the shared prefix is untouched */
        let stat: Vec<Prefix> = rib
            .routes_for_client(0, ClientId::STATIC)
            .expect("Should succeed")
            .iter()
            .map(|r| r.prefix)
            .collect();
        assert_eq!(stat, vec![Prefix::from("1.0.0.0/24")]);
    }

    #[traced_test]
    #[test]
    fn test_reconfigure_seeds_link_local_everywhere() {
        let rib = configured_rib();
        for vrf in rib.vrfs() {
            let snapshot = rib
                .applied_snapshot(vrf)
                .expect("Should succeed")
                .expect("Should be applied");
            assert_eq!(
                snapshot.get(&"169.254.0.0/16".into()),
                Some(&FibRoute::ToCpu),
                "v4 link-local missing in vrf {vrf}"
            );
            assert_eq!(
                snapshot.get(&"fe80::/10".into()),
                Some(&FibRoute::ToCpu),
                "v6 link-local missing in vrf {vrf}"
            );
        }
        let details = rib.route_details(1).expect("Should succeed");
        assert!(details
            .iter()
            .all(|d| d.candidates.iter().any(|(c, _)| *c == ClientId::LINK_LOCAL)));
    }

    #[test]
    fn test_reconfigure_preserves_other_clients_and_drops_vrfs() {
        let rib = configured_rib();
        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");

        /* reconfigure without VRF 1: BGP routes in VRF 0 survive, VRF 1
        goes away with everything in it */
        let mut config = base_config();
        config.interface_routes.remove(&1);
        rib.reconfigure(&config, apply_ok).expect("Should reconfigure");

        assert_eq!(rib.vrfs(), vec![0]);
        assert_eq!(
            rib.routes_for_client(0, ClientId::BGP)
                .expect("Should succeed")
                .len(),
            1
        );
        assert_eq!(
            rib.routes_for_client(1, ClientId::BGP).unwrap_err(),
            RibError::NoSuchVrf(1)
        );

        /* statics are replaced wholesale on each reconfigure */
        let mut config = base_config();
        config.static_routes_to_null.push(StaticRouteNoNextHops {
            vrf: 0,
            prefix: "100.0.0.0/8".into(),
        });
        rib.reconfigure(&config, apply_ok).expect("Should reconfigure");
        assert_eq!(
            rib.routes_for_client(0, ClientId::STATIC)
                .expect("Should succeed")
                .len(),
            1
        );

        rib.reconfigure(&base_config(), apply_ok)
            .expect("Should reconfigure");
        assert!(rib
            .routes_for_client(0, ClientId::STATIC)
            .expect("Should succeed")
            .is_empty());
    }

    #[test]
    fn test_apply_error_propagates_but_state_stays() {
        let rib = configured_rib();
        let err = rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            |_, _| Err(ApplyError("asic unhappy".to_string())),
        );
        assert_eq!(err.unwrap_err(), RibError::Apply("asic unhappy".to_string()));

        /* the route is in the RIB and the snapshot was recorded */
        assert_eq!(
            rib.routes_for_client(0, ClientId::BGP)
                .expect("Should succeed")
                .len(),
            1
        );
        let snapshot = rib
            .applied_snapshot(0)
            .expect("Should succeed")
            .expect("Should be applied");
        assert!(snapshot.get(&"8.0.0.0/24".into()).is_some());
    }

    #[test]
    fn test_update_statistics() {
        let rib = configured_rib();
        let stats = rib
            .update(
                0,
                ClientId::BGP,
                distance::EBGP,
                &[
                    nh_route("8.0.0.0/24", &["10.0.0.1"]),
                    nh_route("2001:db8::/32", &["10.0.0.1"]),
                ],
                &[],
                false,
                "addUnicastRoutes",
                apply_ok,
            )
            .expect("Should succeed");
        assert_eq!(stats.v4_added, 1);
        assert_eq!(stats.v6_added, 1);
        assert_eq!(stats.v4_deleted, 0);

        let stats = rib
            .delete_unicast_routes(0, ClientId::BGP, &["8.0.0.0/24".into()], apply_ok)
            .expect("Should succeed");
        assert_eq!(stats.v4_deleted, 1);
        /* deleting what is not there counts nothing */
        let stats = rib
            .delete_unicast_routes(0, ClientId::BGP, &["8.0.0.0/24".into()], apply_ok)
            .expect("Should succeed");
        assert_eq!(stats.v4_deleted, 0);
    }

    #[test]
    fn test_adds_win_over_deletes_in_one_transaction() {
        let rib = configured_rib();
        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &["8.0.0.0/24".into()],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");
        assert_eq!(
            rib.routes_for_client(0, ClientId::BGP)
                .expect("Should succeed")
                .len(),
            1
        );
    }

    #[test]
    fn test_ip_route_longest_match() {
        let rib = configured_rib();
        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[
                nh_route("0.0.0.0/0", &["10.0.0.1"]),
                nh_route("8.8.0.0/16", &["10.0.0.1"]),
            ],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");

        let hit = rib
            .ip_route(0, mk_addr("8.8.8.8"))
            .expect("Should succeed")
            .expect("Should match");
        assert_eq!(hit.prefix, Prefix::from("8.8.0.0/16"));

        let hit = rib
            .ip_route(0, mk_addr("9.9.9.9"))
            .expect("Should succeed")
            .expect("Should match");
        assert_eq!(hit.prefix, Prefix::from("0.0.0.0/0"));

        let details = rib
            .ip_route_details(0, mk_addr("10.0.0.7"))
            .expect("Should succeed")
            .expect("Should match");
        assert!(details.connected);
    }

    #[test]
    fn test_snapshot_generation_is_monotonic() {
        let rib = configured_rib();
        let first = rib
            .applied_snapshot(0)
            .expect("Should succeed")
            .expect("Should be applied")
            .generation();
        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");
        let second = rib
            .applied_snapshot(0)
            .expect("Should succeed")
            .expect("Should be applied")
            .generation();
        assert!(second > first);
    }

    #[test]
    fn test_update_logging_through_rib() {
        let rib = configured_rib();
        rib.start_logging("8.0.0.0/8".into(), "ops", false);
        assert_eq!(rib.tracked_prefixes().len(), 1);

        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.8.0.0/16", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            apply_ok,
        )
        .expect("Should succeed");

        let events = rib.recent_update_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, UpdateKind::Added);
        assert_eq!(events[0].prefix, "8.8.0.0/16".into());
        assert_eq!(events[0].vrf, 0);

        rib.stop_logging_by_identifier("ops");
        assert!(rib.tracked_prefixes().is_empty());
    }

    #[test]
    fn test_snapshot_visible_to_apply_callback() {
        let rib = configured_rib();
        let mut seen: Option<(String, u64, usize)> = None;
        rib.update(
            0,
            ClientId::BGP,
            distance::EBGP,
            &[nh_route("8.0.0.0/24", &["10.0.0.1"])],
            &[],
            false,
            "addUnicastRoutes",
            |update_type, snapshot| {
                seen = Some((
                    update_type.to_string(),
                    snapshot.generation(),
                    snapshot.len_v4(),
                ));
                Ok(())
            },
        )
        .expect("Should succeed");
        let (update_type, _, v4len) = seen.expect("Callback should run");
        assert_eq!(update_type, "addUnicastRoutes");
        /* connected + link-local + the new route */
        assert_eq!(v4len, 3);
    }
}

