// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared multipath next-hop groups. Resolved next-hop sets wider than one
//! path are deduplicated here so that every route pointing at the same set
//! shares one ECMP egress handle, and so that successive forwarding
//! snapshots keep the handle stable while any of them is alive.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use tracing::debug;

use crate::nexthop::ResolvedNextHopSet;

/// Stable identifier of a shared ECMP egress group.
pub type EcmpEgressId = u64;

/// A deduplicated group of resolved next-hops. The group is handed out as
/// an `Arc`; it lives exactly as long as the longest-holding route or
/// snapshot.
#[derive(Debug, PartialEq, Eq)]
pub struct NextHopGroup {
    id: EcmpEgressId,
    nhops: ResolvedNextHopSet,
}

impl NextHopGroup {
    #[must_use]
    pub fn id(&self) -> EcmpEgressId {
        self.id
    }

    #[must_use]
    pub fn nhops(&self) -> &ResolvedNextHopSet {
        &self.nhops
    }

    /// Number of paths in the group.
    #[must_use]
    pub fn width(&self) -> usize {
        self.nhops.len()
    }
}

/// Table of shared next-hop groups, keyed by the canonical resolved set.
/// The table keeps weak references only: dropping the last holder of a
/// group releases it, and its slot is purged on the next access.
#[derive(Debug, Default)]
pub struct NextHopGroupTable {
    groups: AHashMap<ResolvedNextHopSet, Weak<NextHopGroup>>,
    next_id: EcmpEgressId,
}

impl NextHopGroupTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to the group for a resolved set, creating it if no live
    /// group exists. Identical sets always share a handle.
    #[must_use]
    pub fn ref_or_create(&mut self, nhops: &ResolvedNextHopSet) -> Arc<NextHopGroup> {
        if let Some(existing) = self.groups.get(nhops).and_then(Weak::upgrade) {
            return existing;
        }
        self.next_id += 1;
        let group = Arc::new(NextHopGroup {
            id: self.next_id,
            nhops: nhops.clone(),
        });
        debug!(
            "Allocated ECMP group {} with {} paths",
            group.id,
            group.width()
        );
        self.groups.insert(nhops.clone(), Arc::downgrade(&group));
        group
    }

    /// Drop slots whose group has been released by all holders.
    pub fn purge(&mut self) {
        self.groups.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of live groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
