//! Source: releases pre-loaded items on their scheduled arrival times.
//!
//! All unreleased items sit in an arrival heap ordered by
//! `(arrival, schedule index)`. When the earliest batch comes due, every item
//! sharing that arrival time joins the ready set at once; the next batch is
//! only considered after the last member of the current one has left.

use crate::entity::{Entity, EntityCore, EntityError, FlowContext, Notice};
use crate::fixed::Ticks;
use crate::id::Position;
use crate::item::Item;
use crate::workload::{Schedule, ScheduleError};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

#[derive(Debug, Clone)]
pub struct Source {
    core: EntityCore,
    schedule: Schedule,
    arrivals: BinaryHeap<Reverse<(Ticks, u64, String)>>,
    ready: BTreeSet<String>,
    ready_at: Option<Ticks>,
    emitted: u64,
    emitted_by_type: BTreeMap<String, u64>,
    notices: Vec<Notice>,
}

impl Source {
    /// Build a source from a validated schedule.
    pub fn new(name: impl Into<String>, schedule: Schedule) -> Result<Self, ScheduleError> {
        let mut source = Self {
            core: EntityCore::emitter(name),
            schedule: Schedule::default(),
            arrivals: BinaryHeap::new(),
            ready: BTreeSet::new(),
            ready_at: None,
            emitted: 0,
            emitted_by_type: BTreeMap::new(),
            notices: Vec::new(),
        };
        source.reseed(schedule)?;
        Ok(source)
    }

    /// Replace the schedule and reload every item. Ports are kept.
    pub fn reseed(&mut self, schedule: Schedule) -> Result<(), ScheduleError> {
        let items = schedule.build_items()?;
        self.core.clear();
        self.arrivals.clear();
        self.ready.clear();
        self.ready_at = None;
        self.emitted = 0;
        self.emitted_by_type.clear();
        self.notices.clear();
        for (index, item) in items.into_iter().enumerate() {
            let key = (item.arrival, index as u64, item.name.clone());
            let arrival = item.arrival;
            let name = item.name.clone();
            self.core
                .insert(item, arrival)
                .map_err(|_| ScheduleError::DuplicateItem(name))?;
            self.arrivals.push(Reverse(key));
        }
        self.schedule = schedule;
        Ok(())
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn process_list(&self) -> &[String] {
        &self.schedule.process_list
    }

    /// Arrival time shared by the current ready set.
    pub fn ready_at(&self) -> Option<Ticks> {
        self.ready_at
    }

    /// Items still waiting for their arrival time.
    pub fn unreleased(&self) -> usize {
        self.arrivals.len()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emission counts for typed items.
    pub fn emitted_by_type(&self) -> &BTreeMap<String, u64> {
        &self.emitted_by_type
    }

    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn next_arrival(&self) -> Option<Ticks> {
        self.arrivals.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Move the earliest batch into the ready set once it is due.
    fn release_batch(&mut self, now: Ticks) {
        let Some(at) = self.next_arrival() else {
            return;
        };
        if at > now {
            return;
        }
        while let Some(Reverse((next, _, _))) = self.arrivals.peek()
            && *next == at
        {
            if let Some(Reverse((_, _, name))) = self.arrivals.pop() {
                log::trace!("{}: {} ready at {}", self.core.name(), name, at);
                self.notices.push(Notice::Released {
                    item: name.clone(),
                    arrival: at,
                });
                self.ready.insert(name);
            }
        }
        self.ready_at = Some(at);
    }
}

impl Entity for Source {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn check(&self, now: Ticks, ctx: FlowContext) -> Option<Ticks> {
        match self.ready_at {
            Some(at) if ctx.downstream_ready => Some(at.max(now)),
            Some(_) => None,
            None => self.next_arrival().map(|at| at.max(now)),
        }
    }

    fn act(&mut self, now: Ticks, ctx: FlowContext) -> Result<bool, EntityError> {
        if self.ready.is_empty() {
            self.release_batch(now);
        }
        Ok(ctx.downstream_ready && self.ready_at.is_some_and(|at| at <= now))
    }

    fn receive(&mut self, _item: Item, _now: Ticks) -> Result<Position, EntityError> {
        Err(EntityError::ReceiveUnsupported {
            entity: self.core.name().to_string(),
        })
    }

    fn release(&mut self, item: &str, _now: Ticks) -> Result<Item, EntityError> {
        if !self.ready.contains(item) {
            return Err(EntityError::NotReady {
                entity: self.core.name().to_string(),
                item: item.to_string(),
            });
        }
        let held = self.core.remove(item)?;
        self.ready.remove(item);
        if self.ready.is_empty() {
            self.ready_at = None;
        }
        self.emitted += 1;
        if let Some(t) = &held.item.item_type {
            *self.emitted_by_type.entry(t.clone()).or_default() += 1;
        }
        Ok(held.item)
    }

    fn ready_items(&self) -> Vec<&Item> {
        self.core
            .in_entry_order()
            .filter(|item| self.ready.contains(&item.name))
            .collect()
    }

    fn clear(&mut self) {
        let schedule = std::mem::take(&mut self.schedule);
        if let Err(err) = self.reseed(schedule) {
            log::warn!("{}: reseed failed: {}", self.core.name(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::ItemSpec;

    const FREE: FlowContext = FlowContext {
        downstream_ready: true,
    };
    const BLOCKED: FlowContext = FlowContext {
        downstream_ready: false,
    };

    fn schedule() -> Schedule {
        let mut s = Schedule::new(["cut"]);
        s.push(ItemSpec::new("A", 0).typed("bolt").duration("cut", 1))
            .push(ItemSpec::new("B", 0).duration("cut", 1))
            .push(ItemSpec::new("C", 4).typed("bolt").duration("cut", 1));
        s
    }

    fn names(items: Vec<&Item>) -> Vec<&str> {
        items.into_iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn equal_arrivals_become_ready_together() {
        let mut src = Source::new("S", schedule()).unwrap();
        assert_eq!(src.check(0, FREE), Some(0));
        assert!(src.act(0, FREE).unwrap());
        assert_eq!(names(src.ready_items()), vec!["A", "B"]);
        assert_eq!(src.ready_at(), Some(0));
        assert_eq!(src.unreleased(), 1);
    }

    #[test]
    fn next_batch_waits_for_current_to_drain() {
        let mut src = Source::new("S", schedule()).unwrap();
        src.act(0, FREE).unwrap();
        src.release("A", 0).unwrap();
        assert_eq!(src.check(0, FREE), Some(0));
        src.release("B", 2).unwrap();
        assert_eq!(src.ready_at(), None);
        assert_eq!(src.check(2, FREE), Some(4));
        assert!(!src.act(2, FREE).unwrap());
        assert!(src.act(4, FREE).unwrap());
        assert_eq!(names(src.ready_items()), vec!["C"]);
    }

    #[test]
    fn blocked_downstream_keeps_items_ready() {
        let mut src = Source::new("S", schedule()).unwrap();
        assert!(!src.act(0, BLOCKED).unwrap());
        assert_eq!(src.check(3, BLOCKED), None);
        assert_eq!(src.check(3, FREE), Some(3));
        assert!(src.act(3, FREE).unwrap());
    }

    #[test]
    fn check_is_idempotent() {
        let src = Source::new("S", schedule()).unwrap();
        assert_eq!(src.check(0, FREE), src.check(0, FREE));
    }

    #[test]
    fn release_requires_ready_item() {
        let mut src = Source::new("S", schedule()).unwrap();
        assert!(matches!(
            src.release("C", 0),
            Err(EntityError::NotReady { .. })
        ));
    }

    #[test]
    fn counts_emissions_by_type() {
        let mut src = Source::new("S", schedule()).unwrap();
        src.act(0, FREE).unwrap();
        src.release("A", 0).unwrap();
        src.release("B", 0).unwrap();
        assert_eq!(src.emitted(), 2);
        assert_eq!(src.emitted_by_type().get("bolt"), Some(&1));
    }

    #[test]
    fn never_receives() {
        let mut src = Source::new("S", schedule()).unwrap();
        let err = src.receive(Item::new("X", None, 0), 0).unwrap_err();
        assert!(matches!(err, EntityError::ReceiveUnsupported { .. }));
    }

    #[test]
    fn clear_restores_schedule() {
        let mut src = Source::new("S", schedule()).unwrap();
        src.act(0, FREE).unwrap();
        src.release("A", 0).unwrap();
        src.clear();
        assert_eq!(src.core().len(), 3);
        assert_eq!(src.unreleased(), 3);
        assert_eq!(src.emitted(), 0);
        assert!(src.ready_items().is_empty());
    }

    #[test]
    fn invalid_schedule_rejected() {
        let mut s = Schedule::new(["cut", "weld"]);
        s.push(ItemSpec::new("A", 0).duration("cut", 1));
        assert!(matches!(
            Source::new("S", s),
            Err(ScheduleError::MissingDuration { .. })
        ));
    }

    #[test]
    fn out_of_order_schedule_rejected() {
        let mut s = Schedule::new(["cut"]);
        s.push(ItemSpec::new("A", 5).duration("cut", 1))
            .push(ItemSpec::new("B", 2).duration("cut", 1));
        assert!(matches!(
            Source::new("S", s),
            Err(ScheduleError::NonMonotonicArrival {
                arrival: 2,
                previous: 5,
                ..
            })
        ));
    }

    #[test]
    fn unbounded_duration_rejected() {
        let mut s = Schedule::new(["cut"]);
        s.push(ItemSpec::new("A", 1).duration("cut", Ticks::MAX));
        assert_eq!(
            Source::new("S", s).err(),
            Some(ScheduleError::DurationOverflow("A".into()))
        );
    }
}
