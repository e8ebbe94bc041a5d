//! Processor: `stations` identical parallel servers running one named process.
//!
//! Each occupied position binds one item for the duration recorded in that
//! item's process record. A finished item keeps its position until it is
//! moved downstream.

use crate::entity::{Entity, EntityCore, EntityError, FlowContext, Notice};
use crate::fixed::Ticks;
use crate::id::Position;
use crate::item::{Item, ProcessState};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessorConfig {
    /// Process name looked up in each item's records.
    pub process: String,
    /// Number of parallel stations (at least 1).
    #[serde(default = "default_stations")]
    pub stations: usize,
}

fn default_stations() -> usize {
    1
}

impl ProcessorConfig {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            stations: 1,
        }
    }

    pub fn with_stations(mut self, stations: usize) -> Self {
        self.stations = stations.max(1);
        self
    }
}

/// One completed occupancy of a station position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Occupancy {
    pub enter: Ticks,
    pub exit: Ticks,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Processor {
    core: EntityCore,
    config: ProcessorConfig,
    history: BTreeMap<Position, Vec<Occupancy>>,
    notices: Vec<Notice>,
}

impl Processor {
    pub fn new(name: impl Into<String>, config: ProcessorConfig) -> Self {
        let stations = config.stations.max(1);
        Self {
            core: EntityCore::new(name, stations),
            config: ProcessorConfig { stations, ..config },
            history: BTreeMap::new(),
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn process(&self) -> &str {
        &self.config.process
    }

    pub fn stations(&self) -> usize {
        self.config.stations
    }

    /// Positions currently bound to an item (running or finished).
    pub fn occupied(&self) -> usize {
        self.core.len()
    }

    /// Earliest completion among running items.
    pub fn next_completion(&self) -> Option<Ticks> {
        self.core
            .items()
            .filter_map(|item| item.record(&self.config.process)?.completes_at())
            .min()
    }

    /// `(enter, exit)` pairs per position, in exit order.
    pub fn history(&self) -> &BTreeMap<Position, Vec<Occupancy>> {
        &self.history
    }

    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn has_finished(&self) -> bool {
        self.core
            .items()
            .any(|item| item.is_done(&self.config.process))
    }
}

impl Entity for Processor {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn check(&self, now: Ticks, ctx: FlowContext) -> Option<Ticks> {
        let waiting = (ctx.downstream_ready && self.has_finished()).then_some(now);
        let running = self.next_completion().map(|at| at.max(now));
        match (waiting, running) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn act(&mut self, now: Ticks, ctx: FlowContext) -> Result<bool, EntityError> {
        let process = self.config.process.clone();
        let due: Vec<(String, Ticks)> = self
            .core
            .items()
            .filter_map(|item| {
                let at = item.record(&process)?.completes_at()?;
                (at <= now).then(|| (item.name.clone(), at))
            })
            .collect();

        for (name, at) in due {
            let position = self.core.position_of(&name);
            if let Some(item) = self.core.item_mut(&name) {
                item.done_process(&process, at)?;
            }
            log::trace!("{}: {} finished {} at {}", self.core.name(), name, process, at);
            if let Some(position) = position {
                self.notices.push(Notice::Finished {
                    item: name,
                    process: process.clone(),
                    position,
                    time: at,
                });
            }
        }
        Ok(ctx.downstream_ready && self.has_finished())
    }

    fn receive(&mut self, mut item: Item, now: Ticks) -> Result<Position, EntityError> {
        if !self.core.ready_to_receive() {
            return Err(EntityError::CapacityExceeded {
                entity: self.core.name().to_string(),
                capacity: self.core.capacity(),
            });
        }
        let position = self.core.lowest_free_position();
        item.start_process(&self.config.process, now, self.core.name(), position)?;
        self.core.insert(item, now)
    }

    fn release(&mut self, item: &str, now: Ticks) -> Result<Item, EntityError> {
        let finished = self
            .core
            .item(item)
            .and_then(|i| i.record(&self.config.process))
            .is_some_and(|r| r.state == ProcessState::Done);
        if self.core.holds(item) && !finished {
            return Err(EntityError::NotReady {
                entity: self.core.name().to_string(),
                item: item.to_string(),
            });
        }
        let held = self.core.remove(item)?;
        self.history
            .entry(held.position)
            .or_default()
            .push(Occupancy {
                enter: held.entered,
                exit: now,
            });
        Ok(held.item)
    }

    fn ready_items(&self) -> Vec<&Item> {
        self.core
            .in_entry_order()
            .filter(|item| item.is_done(&self.config.process))
            .collect()
    }

    fn clear(&mut self) {
        self.core.clear();
        self.history.clear();
        self.notices.clear();
    }
}
