// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Identifiers for route sources and the priority policy that breaks
//! admin-distance ties between them.

use std::fmt::Display;

/// Every VRF is univocally identified with a numerical VRF id
pub type VrfId = u32;

/// The VRF present unless configuration says otherwise
pub const DEFAULT_VRF: VrfId = 0;

/// L3 interface identifier
pub type InterfaceId = u32;

/// Front-panel port identifier
pub type PortId = u32;

/// 802.1Q VLAN identifier
pub type VlanId = u16;

/// Per-candidate route preference. Smaller wins.
pub type AdminDistance = u8;

/// Well-known admin distances
pub mod distance {
    use super::AdminDistance;

    pub const DIRECTLY_CONNECTED: AdminDistance = 0;
    pub const STATIC_ROUTE: AdminDistance = 1;
    pub const EBGP: AdminDistance = 20;
    pub const IBGP: AdminDistance = 200;
    pub const MAX_ADMIN_DISTANCE: AdminDistance = 255;
}

/// A small integer tag naming the source of a route. Each prefix holds at
/// most one candidate entry per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u8);

impl ClientId {
    pub const BGP: ClientId = ClientId(0);
    pub const STATIC: ClientId = ClientId(1);
    pub const INTERFACE: ClientId = ClientId(2);
    pub const LINK_LOCAL: ClientId = ClientId(3);
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ClientId::BGP => write!(f, "bgp"),
            ClientId::STATIC => write!(f, "static"),
            ClientId::INTERFACE => write!(f, "interface"),
            ClientId::LINK_LOCAL => write!(f, "link-local"),
            ClientId(other) => write!(f, "client-{other}"),
        }
    }
}

/// The admin distance a client's routes get when the client does not
/// provide one itself.
#[must_use]
pub fn default_admin_distance(client: ClientId) -> AdminDistance {
    match client {
        ClientId::INTERFACE | ClientId::LINK_LOCAL => distance::DIRECTLY_CONNECTED,
        ClientId::STATIC => distance::STATIC_ROUTE,
        ClientId::BGP => distance::EBGP,
        _ => distance::MAX_ADMIN_DISTANCE,
    }
}

/// Fixed client ordering used to break admin-distance ties. Built once at
/// RIB construction; clients not listed rank after all listed ones.
#[derive(Debug, Clone)]
pub struct ClientPriorities {
    order: Vec<ClientId>,
}

impl ClientPriorities {
    #[must_use]
    pub fn new(order: Vec<ClientId>) -> Self {
        Self { order }
    }

    /// Rank of a client; lower ranks win ties. Unknown clients rank last.
    #[must_use]
    pub fn rank(&self, client: ClientId) -> usize {
        self.order
            .iter()
            .position(|c| *c == client)
            .unwrap_or(usize::MAX)
    }
}

impl Default for ClientPriorities {
    fn default() -> Self {
        Self::new(vec![
            ClientId::INTERFACE,
            ClientId::LINK_LOCAL,
            ClientId::STATIC,
            ClientId::BGP,
        ])
    }
}
