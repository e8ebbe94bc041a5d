//! Buffer: a holding area with no service time of its own.
//!
//! Held items are inspected oldest-first by `(entered, seq)`, but a policy may
//! move any of them. A buffer can act the instant a downstream slot opens.

use crate::entity::{Entity, EntityCore, EntityError, FlowContext};
use crate::fixed::{Ticks, UNBOUNDED};
use crate::id::Position;
use crate::item::Item;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum held items; `UNBOUNDED` by default.
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: UNBOUNDED,
        }
    }
}

impl BufferConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self { capacity }
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    core: EntityCore,
    config: BufferConfig,
    peak: usize,
}

impl Buffer {
    pub fn new(name: impl Into<String>, config: BufferConfig) -> Self {
        Self {
            core: EntityCore::new(name, config.capacity),
            config,
            peak: 0,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Oldest held item, if any.
    pub fn oldest(&self) -> Option<&Item> {
        self.core.in_entry_order().next()
    }

    /// Highest occupancy seen since the last clear.
    pub fn peak(&self) -> usize {
        self.peak
    }
}

impl Entity for Buffer {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn check(&self, now: Ticks, ctx: FlowContext) -> Option<Ticks> {
        (!self.core.is_empty() && ctx.downstream_ready).then_some(now)
    }

    fn act(&mut self, _now: Ticks, ctx: FlowContext) -> Result<bool, EntityError> {
        Ok(!self.core.is_empty() && ctx.downstream_ready)
    }

    fn receive(&mut self, item: Item, now: Ticks) -> Result<Position, EntityError> {
        let position = self.core.insert(item, now)?;
        self.peak = self.peak.max(self.core.len());
        Ok(position)
    }

    fn release(&mut self, item: &str, _now: Ticks) -> Result<Item, EntityError> {
        Ok(self.core.remove(item)?.item)
    }

    fn ready_items(&self) -> Vec<&Item> {
        self.core.items_in_entry_order()
    }

    fn clear(&mut self) {
        self.core.clear();
        self.peak = 0;
    }
}
