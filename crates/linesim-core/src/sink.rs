//! Sink: unbounded absorber that stamps terminal completion time.

use crate::entity::{Entity, EntityCore, EntityError, FlowContext};
use crate::fixed::{Ticks, UNBOUNDED};
use crate::id::Position;
use crate::item::Item;

#[derive(Debug, Clone)]
pub struct Sink {
    core: EntityCore,
}

impl Sink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::new(name, UNBOUNDED),
        }
    }

    pub fn absorbed(&self) -> usize {
        self.core.len()
    }

    /// `(item, done_time)` in absorption order.
    pub fn completions(&self) -> Vec<(&str, Ticks)> {
        self.core
            .in_entry_order()
            .filter_map(|item| Some((item.name.as_str(), item.done_time?)))
            .collect()
    }
}

impl Entity for Sink {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn check(&self, _now: Ticks, _ctx: FlowContext) -> Option<Ticks> {
        None
    }

    fn act(&mut self, _now: Ticks, _ctx: FlowContext) -> Result<bool, EntityError> {
        Ok(false)
    }

    fn receive(&mut self, mut item: Item, now: Ticks) -> Result<Position, EntityError> {
        item.mark_completed(now);
        self.core.insert(item, now)
    }

    fn release(&mut self, _item: &str, _now: Ticks) -> Result<Item, EntityError> {
        Err(EntityError::SendUnsupported {
            entity: self.core.name().to_string(),
        })
    }

    fn ready_items(&self) -> Vec<&Item> {
        Vec::new()
    }

    fn clear(&mut self) {
        self.core.clear();
    }
}
