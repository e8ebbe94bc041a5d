//! The entity contract shared by every station kind.
//!
//! An entity owns the items it holds, assigns each one a position in
//! `0..capacity`, and exposes a two-phase protocol to the scene:
//!
//! - [`Entity::check`] is pure. It reports the earliest time at which the
//!   entity could have an item ready to move.
//! - [`Entity::act`] is called at a time `check` reported. It applies the
//!   minimal bookkeeping for that instant and tells the scene whether an
//!   item is ready to move right now.
//!
//! Items move only through [`Entity::flow_to`], which hands ownership to the
//! downstream entity's [`Entity::receive`]. Entities never look at each
//! other's items; the scene passes the one cross-entity signal they need
//! (is any downstream free?) through [`FlowContext`].

use crate::fixed::{Ticks, UNBOUNDED};
use crate::id::{EntityId, PortId, Position};
use crate::item::{Item, ItemError};
use crate::ports::{PortError, PortMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by entity operations. All of them are fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("{entity} is at capacity ({capacity})")]
    CapacityExceeded { entity: String, capacity: usize },
    #[error("{entity} does not hold item {item}")]
    NotHeld { entity: String, item: String },
    #[error("{entity} already holds item {item}")]
    DuplicateItem { entity: String, item: String },
    #[error("{entity} never receives items")]
    ReceiveUnsupported { entity: String },
    #[error("{entity} never sends items")]
    SendUnsupported { entity: String },
    #[error("item {item} held by {entity} is not ready to leave")]
    NotReady { entity: String, item: String },
    #[error("{entity}: {port} is not wired to {target}")]
    PortMismatch {
        entity: String,
        port: PortId,
        target: String,
    },
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Port(#[from] PortError),
}

// ---------------------------------------------------------------------------
// Shared bookkeeping
// ---------------------------------------------------------------------------

/// An item together with where and when it entered its current holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Held {
    pub item: Item,
    pub position: Position,
    pub entered: Ticks,
    /// Insertion counter; breaks ties between items entering at one instant.
    pub seq: u64,
}

/// Port, capacity and position bookkeeping common to all stations.
///
/// `held` (keyed by item name), `by_position` and `by_entry` index the same
/// items and are only ever updated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCore {
    name: String,
    capacity: usize,
    receives: bool,
    pub(crate) ports_in: PortMap,
    pub(crate) ports_out: PortMap,
    held: BTreeMap<String, Held>,
    by_position: BTreeMap<Position, String>,
    /// `(entered, seq)` -> item name.
    by_entry: BTreeMap<(Ticks, u64), String>,
    ready_to_receive: bool,
    next_seq: u64,
}

impl EntityCore {
    /// Core for an entity that accepts items from upstream.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            receives: true,
            ports_in: PortMap::new(),
            ports_out: PortMap::new(),
            held: BTreeMap::new(),
            by_position: BTreeMap::new(),
            by_entry: BTreeMap::new(),
            ready_to_receive: true,
            next_seq: 0,
        }
    }

    /// Core for an entity that only emits (a source).
    pub fn emitter(name: impl Into<String>) -> Self {
        let mut core = Self::new(name, UNBOUNDED);
        core.receives = false;
        core.ready_to_receive = false;
        core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a new item can be received right now.
    pub fn ready_to_receive(&self) -> bool {
        self.ready_to_receive
    }

    pub fn inputs(&self) -> &PortMap {
        &self.ports_in
    }

    pub fn outputs(&self) -> &PortMap {
        &self.ports_out
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn holds(&self, item: &str) -> bool {
        self.held.contains_key(item)
    }

    pub fn item(&self, item: &str) -> Option<&Item> {
        self.held.get(item).map(|h| &h.item)
    }

    pub fn item_mut(&mut self, item: &str) -> Option<&mut Item> {
        self.held.get_mut(item).map(|h| &mut h.item)
    }

    pub fn held(&self, item: &str) -> Option<&Held> {
        self.held.get(item)
    }

    /// Held items keyed by name.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.held.values().map(|h| &h.item)
    }

    pub(crate) fn items_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.held.values_mut().map(|h| &mut h.item)
    }

    /// Held items ordered by entry time, then insertion order.
    pub fn in_entry_order(&self) -> impl DoubleEndedIterator<Item = &Item> {
        self.by_entry
            .values()
            .filter_map(|name| self.held.get(name).map(|h| &h.item))
    }

    pub fn items_in_entry_order(&self) -> Vec<&Item> {
        self.in_entry_order().collect()
    }

    pub fn position_of(&self, item: &str) -> Option<Position> {
        self.held.get(item).map(|h| h.position)
    }

    pub fn item_at(&self, position: Position) -> Option<&str> {
        self.by_position.get(&position).map(String::as_str)
    }

    /// Occupied positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = (Position, &str)> {
        self.by_position.iter().map(|(p, name)| (*p, name.as_str()))
    }

    /// Position the next inserted item will occupy.
    pub(crate) fn lowest_free_position(&self) -> Position {
        let mut candidate = 0;
        for position in self.by_position.keys() {
            if *position != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    fn refresh_ready(&mut self) {
        self.ready_to_receive = self.receives && self.held.len() < self.capacity;
    }

    /// Take ownership of `item`, assigning it the lowest free position.
    pub(crate) fn insert(&mut self, item: Item, now: Ticks) -> Result<Position, EntityError> {
        if self.held.len() >= self.capacity {
            return Err(EntityError::CapacityExceeded {
                entity: self.name.clone(),
                capacity: self.capacity,
            });
        }
        if self.held.contains_key(&item.name) {
            return Err(EntityError::DuplicateItem {
                entity: self.name.clone(),
                item: item.name,
            });
        }
        let position = self.lowest_free_position();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_position.insert(position, item.name.clone());
        self.by_entry.insert((now, seq), item.name.clone());
        self.held.insert(
            item.name.clone(),
            Held {
                item,
                position,
                entered: now,
                seq,
            },
        );
        self.refresh_ready();
        Ok(position)
    }

    /// Give up ownership of `item`, freeing its position.
    pub(crate) fn remove(&mut self, item: &str) -> Result<Held, EntityError> {
        let held = self.held.remove(item).ok_or_else(|| EntityError::NotHeld {
            entity: self.name.clone(),
            item: item.to_string(),
        })?;
        self.by_position.remove(&held.position);
        self.by_entry.remove(&(held.entered, held.seq));
        self.refresh_ready();
        Ok(held)
    }

    /// Drop all held items and positions. Ports and capacity are untouched.
    pub fn clear(&mut self) {
        self.held.clear();
        self.by_position.clear();
        self.by_entry.clear();
        self.next_seq = 0;
        self.refresh_ready();
    }

    /// Capacity respected, positions in range and unique, and the position
    /// and entry indexes mirror the held items.
    pub fn is_consistent(&self) -> bool {
        if self.held.len() > self.capacity
            || self.held.len() != self.by_position.len()
            || self.held.len() != self.by_entry.len()
        {
            return false;
        }
        self.held.iter().all(|(name, h)| {
            h.item.name == *name
                && h.position < self.capacity
                && self.by_position.get(&h.position) == Some(name)
                && self.by_entry.get(&(h.entered, h.seq)) == Some(name)
        })
    }
}

// ---------------------------------------------------------------------------
// Entity trait
// ---------------------------------------------------------------------------

/// State changes a station made inside `act`, collected by the scene for
/// its event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Released {
        item: String,
        arrival: Ticks,
    },
    Finished {
        item: String,
        process: String,
        position: Position,
        time: Ticks,
    },
}

/// Cross-entity information the scene hands to `check`/`act`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowContext {
    /// At least one wired downstream entity reports spare capacity.
    pub downstream_ready: bool,
}

/// The contract every station kind implements.
pub trait Entity {
    fn core(&self) -> &EntityCore;

    fn core_mut(&mut self) -> &mut EntityCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    /// Earliest time `>= now` at which this entity could have a decision, or
    /// `None`. Must not mutate; repeated calls with the same state agree.
    fn check(&self, now: Ticks, ctx: FlowContext) -> Option<Ticks>;

    /// Apply the bookkeeping due at `now`. Returns `true` when at least one
    /// held item is ready to move at `now`.
    fn act(&mut self, now: Ticks, ctx: FlowContext) -> Result<bool, EntityError>;

    /// Accept `item` from upstream. Returns the assigned position.
    fn receive(&mut self, item: Item, now: Ticks) -> Result<Position, EntityError>;

    /// Remove `item` from this entity, applying kind-specific bookkeeping.
    fn release(&mut self, item: &str, now: Ticks) -> Result<Item, EntityError>;

    /// Items that may leave right now, oldest first.
    fn ready_items(&self) -> Vec<&Item>;

    /// Reset per-run state. Ports, capacity and configuration survive.
    fn clear(&mut self);

    /// Move `item` through `out_port` to `downstream` (whose arena key is
    /// `target`). Validates wiring, ownership, readiness and downstream
    /// capacity before ownership changes hands.
    fn flow_to(
        &mut self,
        item: &str,
        out_port: PortId,
        target: EntityId,
        downstream: &mut dyn Entity,
        now: Ticks,
    ) -> Result<Position, EntityError> {
        let wired = self
            .core()
            .outputs()
            .get(out_port)
            .is_some_and(|link| {
                link.peer == target && downstream.core().inputs().is_taken(link.peer_port)
            });
        if !wired {
            return Err(EntityError::PortMismatch {
                entity: self.name().to_string(),
                port: out_port,
                target: downstream.name().to_string(),
            });
        }
        if !self.core().holds(item) {
            return Err(EntityError::NotHeld {
                entity: self.name().to_string(),
                item: item.to_string(),
            });
        }
        if !self.ready_items().iter().any(|ready| ready.name == item) {
            return Err(EntityError::NotReady {
                entity: self.name().to_string(),
                item: item.to_string(),
            });
        }
        if !downstream.core().ready_to_receive() {
            return Err(EntityError::CapacityExceeded {
                entity: downstream.name().to_string(),
                capacity: downstream.core().capacity(),
            });
        }
        let moved = self.release(item, now)?;
        downstream.receive(moved, now)
    }
}
