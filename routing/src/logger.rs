// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Prefix-indexed subscription registry for route updates. After each
//! commit the logger is fired with the snapshot diff and records one event
//! per (matching subscription, changed route).

use std::collections::VecDeque;

use lpm::prefix::Prefix;
use tracing::info;

use crate::client::VrfId;
use crate::fib::{FibRoute, ForwardingSnapshot};

/// Cap on the in-memory event history.
const MAX_RECORDED_EVENTS: usize = 1024;

/// One tracking subscription. With `exact` set, only the identical prefix
/// matches; otherwise any route whose network the prefix covers does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdateLoggingInstance {
    pub prefix: Prefix,
    pub identifier: String,
    pub exact: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Added,
    Changed,
    Removed,
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateKind::Added => write!(f, "added"),
            UpdateKind::Changed => write!(f, "changed"),
            UpdateKind::Removed => write!(f, "removed"),
        }
    }
}

/// A recorded route change that matched a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdateEvent {
    pub vrf: VrfId,
    pub prefix: Prefix,
    pub kind: UpdateKind,
    pub identifier: String,
}

#[derive(Debug, Default)]
pub struct UpdateLogger {
    subscriptions: Vec<RouteUpdateLoggingInstance>,
    events: VecDeque<RouteUpdateEvent>,
}

impl UpdateLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription. Identical subscriptions collapse; the same
    /// identifier may track any number of prefixes.
    pub fn start_logging(&mut self, instance: RouteUpdateLoggingInstance) {
        if !self.subscriptions.contains(&instance) {
            info!(
                "Tracking route updates for {} (identifier '{}', exact {})",
                instance.prefix, instance.identifier, instance.exact
            );
            self.subscriptions.push(instance);
        }
    }

    /// Drop the subscriptions of `identifier` for one prefix.
    pub fn stop_logging(&mut self, prefix: Prefix, identifier: &str) {
        self.subscriptions
            .retain(|s| !(s.prefix == prefix && s.identifier == identifier));
    }

    /// Drop every subscription held under an identifier.
    pub fn stop_logging_by_identifier(&mut self, identifier: &str) {
        self.subscriptions.retain(|s| s.identifier != identifier);
    }

    #[must_use]
    pub fn tracked_prefixes(&self) -> Vec<RouteUpdateLoggingInstance> {
        self.subscriptions.clone()
    }

    /// Recorded events, oldest first.
    #[must_use]
    pub fn recent_events(&self) -> Vec<RouteUpdateEvent> {
        self.events.iter().cloned().collect()
    }

    /// Fire the logger with the diff between the previously applied
    /// snapshot and the one just applied.
    pub fn log_diff(
        &mut self,
        vrf: VrfId,
        prev: Option<&ForwardingSnapshot>,
        next: &ForwardingSnapshot,
    ) {
        if self.subscriptions.is_empty() {
            return;
        }
        let mut changes: Vec<(Prefix, UpdateKind)> = Vec::new();
        collect_changes(
            prev.map(|s| s.iter_v4().map(|(p, r)| (Prefix::IPV4(*p), r))),
            next.iter_v4().map(|(p, r)| (Prefix::IPV4(*p), r)),
            &mut changes,
        );
        collect_changes(
            prev.map(|s| s.iter_v6().map(|(p, r)| (Prefix::IPV6(*p), r))),
            next.iter_v6().map(|(p, r)| (Prefix::IPV6(*p), r)),
            &mut changes,
        );
        for (prefix, kind) in changes {
            self.record(vrf, prefix, kind);
        }
    }

    fn record(&mut self, vrf: VrfId, prefix: Prefix, kind: UpdateKind) {
        for sub in &self.subscriptions {
            let matches = if sub.exact {
                sub.prefix == prefix
            } else {
                sub.prefix.covers(&prefix)
            };
            if !matches {
                continue;
            }
            info!(
                "Route {kind}: vrf {vrf} prefix {prefix} (tracked by '{}')",
                sub.identifier
            );
            if self.events.len() == MAX_RECORDED_EVENTS {
                self.events.pop_front();
            }
            self.events.push_back(RouteUpdateEvent {
                vrf,
                prefix,
                kind,
                identifier: sub.identifier.clone(),
            });
        }
    }
}

/// Walk two sorted route sequences and emit added/changed/removed prefixes.
fn collect_changes<'a, I, J>(
    prev: Option<I>,
    next: J,
    out: &mut Vec<(Prefix, UpdateKind)>,
) where
    I: Iterator<Item = (Prefix, &'a FibRoute)>,
    J: Iterator<Item = (Prefix, &'a FibRoute)>,
{
    let mut old: Vec<(Prefix, &FibRoute)> = prev.map(Iterator::collect).unwrap_or_default();
    let mut new: Vec<(Prefix, &FibRoute)> = next.collect();
    old.sort_by_key(|(p, _)| *p);
    new.sort_by_key(|(p, _)| *p);

    let mut oi = old.iter().peekable();
    let mut ni = new.iter().peekable();
    loop {
        match (oi.peek(), ni.peek()) {
            (Some((op, or)), Some((np, nr))) => {
                if op == np {
                    if or != nr {
                        out.push((*op, UpdateKind::Changed));
                    }
                    oi.next();
                    ni.next();
                } else if op < np {
                    out.push((*op, UpdateKind::Removed));
                    oi.next();
                } else {
                    out.push((*np, UpdateKind::Added));
                    ni.next();
                }
            }
            (Some((op, _)), None) => {
                out.push((*op, UpdateKind::Removed));
                oi.next();
            }
            (None, Some((np, _))) => {
                out.push((*np, UpdateKind::Added));
                ni.next();
            }
            (None, None) => break,
        }
    }
}
