use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an entity (station) in the scene's arena.
    pub struct EntityId;

    /// Identifies a link (directed connection) between two entities.
    pub struct LinkId;
}

/// A port number on one side of an entity. Ports are allocated lowest-free
/// first and are unique per side of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u32);

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port {}", self.0)
    }
}

/// A station slot inside an entity. `0..capacity`.
pub type Position = usize;
