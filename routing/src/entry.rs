// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-prefix route state: one candidate entry per client, the cached best
//! choice, and the forwarding resolution produced at commit.

use std::collections::BTreeMap;

use lpm::prefix::Prefix;

use crate::client::{AdminDistance, ClientId, ClientPriorities};
use crate::errors::RibError;
use crate::nexthop::{NextHop, NextHopSet, ResolvedNextHopSet};

/// What a candidate entry asks the forwarding plane to do with packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteAction {
    Forward,
    Drop,
    ToCpu,
}

/// One client's candidate for a prefix: an action, the admin distance used
/// to rank it against other clients, and (for forwarding entries) the
/// normalized next-hop set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNextHopEntry {
    action: RouteAction,
    distance: AdminDistance,
    nhops: NextHopSet,
}

impl RouteNextHopEntry {
    /// Build a forwarding candidate from raw next-hops.
    ///
    /// # Errors
    /// Fails if the next-hop set does not normalize (see [`NextHopSet::new`]).
    pub fn from_nexthops(
        distance: AdminDistance,
        nhops: impl IntoIterator<Item = NextHop>,
    ) -> Result<Self, RibError> {
        Ok(Self {
            action: RouteAction::Forward,
            distance,
            nhops: NextHopSet::new(nhops)?,
        })
    }

    #[must_use]
    pub fn with_drop(distance: AdminDistance) -> Self {
        Self {
            action: RouteAction::Drop,
            distance,
            nhops: NextHopSet::default(),
        }
    }

    #[must_use]
    pub fn with_to_cpu(distance: AdminDistance) -> Self {
        Self {
            action: RouteAction::ToCpu,
            distance,
            nhops: NextHopSet::default(),
        }
    }

    #[must_use]
    pub fn action(&self) -> RouteAction {
        self.action
    }

    #[must_use]
    pub fn distance(&self) -> AdminDistance {
        self.distance
    }

    #[must_use]
    pub fn nhops(&self) -> &NextHopSet {
        &self.nhops
    }
}

/// The flattened forwarding decision for a prefix once its best candidate
/// has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    Drop,
    ToCpu,
    Nexthops(ResolvedNextHopSet),
}

/// Resolution state of a route entry. `Resolving` only exists while a
/// commit walks a recursion chain; finding an entry in that state from
/// within the walk means the chain loops back on itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Pending,
    Resolving,
    Resolved(Forward),
    Unresolved,
}

/// All of the RIB's state for one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    prefix: Prefix,
    candidates: BTreeMap<ClientId, RouteNextHopEntry>,
    best: Option<ClientId>,
    fwd: Resolution,
    connected: bool,
}

impl RouteEntry {
    #[must_use]
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            candidates: BTreeMap::new(),
            best: None,
            fwd: Resolution::Pending,
            connected: false,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Insert or replace the candidate of a client. Any cached resolution
    /// is invalidated.
    pub fn add_or_replace(
        &mut self,
        client: ClientId,
        entry: RouteNextHopEntry,
        prios: &ClientPriorities,
    ) {
        self.candidates.insert(client, entry);
        self.fwd = Resolution::Pending;
        self.recompute_best(prios);
    }

    /// Remove the candidate of a client, returning it if present. The entry
    /// must be destroyed by the caller once [`Self::is_empty`] holds.
    pub fn remove(
        &mut self,
        client: ClientId,
        prios: &ClientPriorities,
    ) -> Option<RouteNextHopEntry> {
        let removed = self.candidates.remove(&client);
        if removed.is_some() {
            self.fwd = Resolution::Pending;
            self.recompute_best(prios);
        }
        removed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn has_client(&self, client: ClientId) -> bool {
        self.candidates.contains_key(&client)
    }

    #[must_use]
    pub fn client_entry(&self, client: ClientId) -> Option<&RouteNextHopEntry> {
        self.candidates.get(&client)
    }

    pub fn candidates(&self) -> impl Iterator<Item = (ClientId, &RouteNextHopEntry)> {
        self.candidates.iter().map(|(c, e)| (*c, e))
    }

    /// The winning candidate: numerically smallest admin distance, ties
    /// broken by the configured client priority order.
    #[must_use]
    pub fn best(&self) -> Option<(ClientId, &RouteNextHopEntry)> {
        let client = self.best?;
        self.candidates.get(&client).map(|e| (client, e))
    }

    #[must_use]
    pub fn resolution(&self) -> &Resolution {
        &self.fwd
    }

    /// The forwarding decision of the last commit.
    ///
    /// # Errors
    /// Fails unless the entry resolved in the last commit.
    pub fn resolved(&self) -> Result<&Forward, RibError> {
        match &self.fwd {
            Resolution::Resolved(fwd) => Ok(fwd),
            _ => Err(RibError::NotResolved(self.prefix)),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self.fwd, Resolution::Resolved(_))
    }

    /// True iff the interface client owns the best candidate; connected
    /// entries terminate recursive resolution.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn set_resolution(&mut self, fwd: Resolution) {
        self.fwd = fwd;
    }

    fn recompute_best(&mut self, prios: &ClientPriorities) {
        self.best = self
            .candidates
            .iter()
            .min_by_key(|(client, entry)| (entry.distance(), prios.rank(**client), **client))
            .map(|(client, _)| *client);
        self.connected = self.best == Some(ClientId::INTERFACE);
    }
}
