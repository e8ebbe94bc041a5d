//! Port wiring for one side (inputs or outputs) of an entity.
//!
//! Each wired port points at the peer entity and the port id used on the
//! peer's opposite side, so a link is described identically from both ends.

use crate::id::{EntityId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{0} is already wired")]
    Taken(PortId),
    #[error("{0} is not wired")]
    NotWired(PortId),
}

/// The far end of a wired port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLink {
    pub peer: EntityId,
    pub peer_port: PortId,
}

/// Integer-keyed port table for one side of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMap {
    links: BTreeMap<PortId, PortLink>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest port id not currently wired.
    pub fn next_free(&self) -> PortId {
        let mut candidate = 0u32;
        for port in self.links.keys() {
            if port.0 != candidate {
                break;
            }
            candidate += 1;
        }
        PortId(candidate)
    }

    /// Wire `port` (or the next free port when `None`) to `link`.
    pub fn wire(&mut self, port: Option<PortId>, link: PortLink) -> Result<PortId, PortError> {
        let port = port.unwrap_or_else(|| self.next_free());
        if self.links.contains_key(&port) {
            return Err(PortError::Taken(port));
        }
        self.links.insert(port, link);
        Ok(port)
    }

    /// Remove the wiring on `port`, returning what it pointed at.
    pub fn unwire(&mut self, port: PortId) -> Result<PortLink, PortError> {
        self.links.remove(&port).ok_or(PortError::NotWired(port))
    }

    pub fn get(&self, port: PortId) -> Option<&PortLink> {
        self.links.get(&port)
    }

    pub fn is_taken(&self, port: PortId) -> bool {
        self.links.contains_key(&port)
    }

    /// The local port wired to `peer`, if any.
    pub fn port_to(&self, peer: EntityId) -> Option<PortId> {
        self.links
            .iter()
            .find(|(_, link)| link.peer == peer)
            .map(|(port, _)| *port)
    }

    /// Wired ports in ascending port order.
    pub fn iter(&self) -> impl Iterator<Item = (PortId, &PortLink)> {
        self.links.iter().map(|(port, link)| (*port, link))
    }

    /// Peers in ascending port order.
    pub fn peers(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.links.values().map(|link| link.peer)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
