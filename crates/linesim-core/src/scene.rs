//! The scene: owns every station, the links between them and the simulated
//! clock, and drives the check / act / flow cycle.
//!
//! # Cycle
//!
//! At the current time `t` the scene
//!
//! 1. asks every station for `check(t)` and records future times in the
//!    pending-time set,
//! 2. calls `act(t)` on every station whose check came due, in insertion
//!    order, stopping at the first one that reports an item ready to move,
//! 3. resolves that decision with the caller's rule (automatic mode) or
//!    returns it to the caller (manual mode), then starts over at `t`,
//! 4. once nothing is ready at `t`, advances to the earliest pending time.
//!
//! The run is done when every non-sink station is empty. Time never
//! regresses and no station acts ahead of the clock.

use crate::buffer::{Buffer, BufferConfig};
use crate::entity::{Entity, EntityError, FlowContext, Notice};
use crate::event::{Event, EventKind, EventLog};
use crate::fixed::Ticks;
use crate::graph::{FlowGraph, GraphError};
use crate::id::{EntityId, LinkId, PortId};
use crate::item::Item;
use crate::processor::{Processor, ProcessorConfig};
use crate::replay::{DecisionLog, DecisionRecord};
use crate::sim::{Decision, RunOutcome, StateHash};
use crate::sink::Sink;
use crate::source::Source;
use crate::station::{Station, StationKind};
use crate::workload::{Schedule, ScheduleError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything that can go wrong while building or driving a scene.
///
/// Protocol errors (see [`SceneError::is_protocol`]) are raised before any
/// state changes; the scene keeps waiting for a valid decision. Every other
/// error raised during a run leaves the scene failed until it is cleared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Entity(#[from] EntityError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("topology is frozen once the first decision has been resolved")]
    TopologyFrozen,
    #[error("processor {processor} runs {process}, which no source schedule declares")]
    UnknownProcess { processor: String, process: String },
    #[error("deadlock at t={time}: {stranded} item(s) can never move")]
    Deadlock { time: Ticks, stranded: usize },
    #[error("{0} is not a source")]
    NotASource(String),
    #[error("expected exactly one source, found {0}")]
    SourceCount(usize),
    #[error("scene failed earlier; clear or reset it before running again")]
    Failed,

    // -- Decision protocol --
    #[error("no decision is pending")]
    NoPendingDecision,
    #[error("{entity} is awaiting a decision")]
    DecisionPending { entity: String },
    #[error("{entity} has no item {item} ready to move")]
    ItemNotHeld { entity: String, item: String },
    #[error("{entity} is not connected to {target}")]
    NotConnected { entity: String, target: String },
}

impl SceneError {
    /// Driver misuse of the decision protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SceneError::NoPendingDecision
                | SceneError::DecisionPending { .. }
                | SceneError::ItemNotHeld { .. }
                | SceneError::NotConnected { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Store events for observers.
    pub record_events: bool,
    /// Event kinds never stored.
    #[serde(default)]
    pub suppressed: Vec<EventKind>,
    /// Attach a state hash to every recorded decision.
    pub hash_decisions: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            record_events: true,
            suppressed: Vec::new(),
            hash_decisions: true,
        }
    }
}

/// A scheduling rule: given the scene, the entity awaiting a decision and
/// the current time, choose the item to move and its destination.
pub type Rule<'a> = dyn FnMut(&Scene, &str, Ticks) -> Decision + 'a;

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Scene {
    graph: FlowGraph,
    time: Ticks,
    pending: BTreeSet<Ticks>,
    awaiting: Option<EntityId>,
    /// Item name to current holder.
    locations: BTreeMap<String, EntityId>,
    /// Set once the first decision is resolved.
    frozen: bool,
    validated: bool,
    failed: bool,
    events: EventLog,
    decisions: DecisionLog,
    config: SceneConfig,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        let mut events = if config.record_events {
            EventLog::new()
        } else {
            EventLog::disabled()
        };
        for &kind in &config.suppressed {
            events.suppress(kind);
        }
        Self {
            graph: FlowGraph::new(),
            time: 0,
            pending: BTreeSet::new(),
            awaiting: None,
            locations: BTreeMap::new(),
            frozen: false,
            validated: false,
            failed: false,
            events,
            decisions: DecisionLog::new(),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    fn ensure_setup(&self) -> Result<(), SceneError> {
        if self.frozen {
            return Err(SceneError::TopologyFrozen);
        }
        Ok(())
    }

    fn add_station(&mut self, station: Station) -> Result<EntityId, SceneError> {
        self.ensure_setup()?;
        let id = self.graph.add(station)?;
        self.validated = false;
        log::debug!("added {}", self.name_of(id));
        Ok(id)
    }

    /// Add a source releasing `schedule`. Item names must be unique across
    /// all sources.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        schedule: Schedule,
    ) -> Result<EntityId, SceneError> {
        self.ensure_setup()?;
        self.check_unique_items(None, &schedule)?;
        let source = Source::new(name, schedule)?;
        let names: Vec<String> = source.core().items().map(|i| i.name.clone()).collect();
        let id = self.add_station(Station::Source(source))?;
        for name in names {
            self.locations.insert(name, id);
        }
        Ok(id)
    }

    pub fn add_buffer(
        &mut self,
        name: impl Into<String>,
        config: BufferConfig,
    ) -> Result<EntityId, SceneError> {
        self.add_station(Station::Buffer(Buffer::new(name, config)))
    }

    pub fn add_processor(
        &mut self,
        name: impl Into<String>,
        config: ProcessorConfig,
    ) -> Result<EntityId, SceneError> {
        self.add_station(Station::Processor(Processor::new(name, config)))
    }

    pub fn add_sink(&mut self, name: impl Into<String>) -> Result<EntityId, SceneError> {
        self.add_station(Station::Sink(Sink::new(name)))
    }

    /// Connect `up -> down` on the lowest free port of each side.
    pub fn connect(&mut self, up: &str, down: &str) -> Result<LinkId, SceneError> {
        self.connect_ports(up, down, None, None)
    }

    /// Connect `up -> down` on explicit ports (`None` picks the lowest free).
    pub fn connect_ports(
        &mut self,
        up: &str,
        down: &str,
        out_port: Option<PortId>,
        in_port: Option<PortId>,
    ) -> Result<LinkId, SceneError> {
        self.ensure_setup()?;
        let from = self.graph.require(up)?;
        let to = self.graph.require(down)?;
        Ok(self.graph.connect(from, to, out_port, in_port)?)
    }

    pub fn disconnect(&mut self, up: &str, down: &str) -> Result<(), SceneError> {
        self.ensure_setup()?;
        let from = self.graph.require(up)?;
        let to = self.graph.require(down)?;
        self.graph.disconnect(from, to)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run to completion, resolving every decision with `rule`. A decision
    /// left pending by an earlier manual call is resolved by `rule` too.
    pub fn run<R>(&mut self, mut rule: R) -> Result<RunOutcome, SceneError>
    where
        R: FnMut(&Scene, &str, Ticks) -> Decision,
    {
        self.drive(Some(&mut rule))
    }

    /// Run until the first decision point (or completion) and return it.
    pub fn run_manual(&mut self) -> Result<RunOutcome, SceneError> {
        if let Some(id) = self.awaiting {
            return Err(SceneError::DecisionPending {
                entity: self.name_of(id),
            });
        }
        self.drive(None)
    }

    /// Apply `decision` to the pending decision point and run to the next.
    pub fn resume(&mut self, decision: Decision) -> Result<RunOutcome, SceneError> {
        self.ensure_healthy()?;
        self.apply(&decision)?;
        self.drive(None)
    }

    /// `resume` with a decision, `run_manual` without.
    pub fn step(&mut self, decision: Option<Decision>) -> Result<RunOutcome, SceneError> {
        match decision {
            Some(decision) => self.resume(decision),
            None => self.run_manual(),
        }
    }

    fn ensure_healthy(&self) -> Result<(), SceneError> {
        if self.failed {
            return Err(SceneError::Failed);
        }
        Ok(())
    }

    fn fail(&mut self, err: SceneError) -> SceneError {
        log::warn!("scene failed at t={}: {}", self.time, err);
        self.failed = true;
        err
    }

    /// Every processor's process must be declared by some source.
    fn validate(&mut self) -> Result<(), SceneError> {
        if self.validated {
            return Ok(());
        }
        let declared: BTreeSet<&str> = self
            .graph
            .iter()
            .filter_map(|(_, s)| s.as_source())
            .flat_map(|s| s.process_list().iter().map(String::as_str))
            .collect();
        for (_, station) in self.graph.iter() {
            if let Some(p) = station.as_processor()
                && !declared.contains(p.process())
            {
                return Err(SceneError::UnknownProcess {
                    processor: p.name().to_string(),
                    process: p.process().to_string(),
                });
            }
        }
        self.validated = true;
        Ok(())
    }

    fn drive(&mut self, mut rule: Option<&mut Rule<'_>>) -> Result<RunOutcome, SceneError> {
        self.ensure_healthy()?;
        self.validate()?;
        loop {
            if let Some(waiting) = self.awaiting {
                let entity = self.name_of(waiting);
                let now = self.time;
                let Some(rule) = rule.as_deref_mut() else {
                    return Ok(RunOutcome::Decision { entity, time: now });
                };
                let decision = rule(self, &entity, now);
                self.apply(&decision)?;
                continue;
            }

            self.refresh_pending();
            if let Some(ready) = self.act_now()? {
                let entity = self.name_of(ready);
                let count = self
                    .graph
                    .get(ready)
                    .map_or(0, |s| s.ready_items().len());
                log::debug!("t={}: decision at {} ({} ready)", self.time, entity, count);
                self.events.emit(Event::DecisionRequested {
                    entity,
                    ready: count,
                    time: self.time,
                });
                self.awaiting = Some(ready);
                continue;
            }

            if self.is_done() {
                log::info!("run complete at t={}", self.time);
                return Ok(RunOutcome::Done { time: self.time });
            }

            let now = self.time;
            while let Some(&first) = self.pending.first()
                && first <= now
            {
                self.pending.pop_first();
            }
            let Some(next) = self.pending.pop_first() else {
                let err = SceneError::Deadlock {
                    time: now,
                    stranded: self.stranded(),
                };
                return Err(self.fail(err));
            };
            log::debug!("advance t={} -> {}", now, next);
            self.events.emit(Event::TimeAdvanced {
                from: now,
                to: next,
            });
            self.time = next;
        }
    }

    fn context(&self, id: EntityId) -> FlowContext {
        FlowContext {
            downstream_ready: self.graph.downstream_ready(id),
        }
    }

    fn refresh_pending(&mut self) {
        let now = self.time;
        for id in self.graph.ids().to_vec() {
            let ctx = self.context(id);
            let Some(station) = self.graph.get(id) else {
                continue;
            };
            if let Some(at) = station.check(now, ctx) {
                log::trace!("t={}: {} check -> {}", now, station.name(), at);
                if at > now {
                    self.pending.insert(at);
                }
            }
        }
    }

    /// Act on every station due now; the first one with an item ready to
    /// move is returned.
    fn act_now(&mut self) -> Result<Option<EntityId>, SceneError> {
        let now = self.time;
        for id in self.graph.ids().to_vec() {
            let ctx = self.context(id);
            let due = self
                .graph
                .get(id)
                .and_then(|s| s.check(now, ctx))
                .is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            let Some(station) = self.graph.get_mut(id) else {
                continue;
            };
            let result = station.act(now, ctx);
            let notices = station.take_notices();
            self.record_notices(id, notices);
            match result {
                Ok(true) => return Ok(Some(id)),
                Ok(false) => {}
                Err(err) => return Err(self.fail(err.into())),
            }
        }
        Ok(None)
    }

    fn record_notices(&mut self, id: EntityId, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        let name = self.name_of(id);
        let now = self.time;
        for notice in notices {
            let event = match notice {
                Notice::Released { item, arrival } => {
                    let item_type = self
                        .graph
                        .get(id)
                        .and_then(|s| s.core().item(&item))
                        .and_then(|i| i.item_type.clone());
                    Event::ItemCreated {
                        source: name.clone(),
                        item,
                        item_type,
                        arrival,
                        time: now,
                    }
                }
                Notice::Finished {
                    item,
                    process,
                    position,
                    time,
                } => Event::ProcessFinished {
                    processor: name.clone(),
                    process,
                    item,
                    position,
                    time,
                },
            };
            self.events.emit(event);
        }
    }

    /// Validate `decision` against the awaiting entity and move the item.
    fn apply(&mut self, decision: &Decision) -> Result<(), SceneError> {
        let from = self.awaiting.ok_or(SceneError::NoPendingDecision)?;
        let entity = self.name_of(from);
        let now = self.time;

        let (from_kind, from_position) = {
            let station = self
                .graph
                .get(from)
                .ok_or_else(|| GraphError::UnknownEntity(entity.clone()))?;
            let ready = station
                .ready_items()
                .iter()
                .any(|item| item.name == decision.item);
            if !ready {
                return Err(SceneError::ItemNotHeld {
                    entity,
                    item: decision.item.clone(),
                });
            }
            (
                station.kind(),
                station.core().position_of(&decision.item).unwrap_or_default(),
            )
        };

        let not_connected = || SceneError::NotConnected {
            entity: entity.clone(),
            target: decision.target.clone(),
        };
        let to = self.graph.id(&decision.target).ok_or_else(not_connected)?;
        let link = self
            .graph
            .link_between(from, to)
            .and_then(|l| self.graph.link(l))
            .copied()
            .ok_or_else(not_connected)?;

        let moved = match self.graph.pair_mut(from, to) {
            Some([up, down]) => up.flow_to(&decision.item, link.out_port, to, down, now),
            None => return Err(not_connected()),
        };
        let to_position = moved.map_err(|e| self.fail(e.into()))?;

        self.awaiting = None;
        self.frozen = true;
        self.locations.insert(decision.item.clone(), to);
        log::debug!(
            "t={}: {} -> {}: {}",
            now,
            entity,
            decision.target,
            decision.item
        );
        self.record_transfer(decision, &entity, from_kind, from_position, to, to_position);

        let hash = self.config.hash_decisions.then(|| self.state_hash());
        self.decisions.push(DecisionRecord {
            entity,
            time: now,
            decision: decision.clone(),
            hash,
        });
        Ok(())
    }

    fn record_transfer(
        &mut self,
        decision: &Decision,
        from: &str,
        from_kind: StationKind,
        from_position: usize,
        to: EntityId,
        to_position: usize,
    ) {
        let now = self.time;
        let Some(target) = self.graph.get(to) else {
            return;
        };
        let item = target.core().item(&decision.item);
        log::trace!("{} entered {} at position {}", decision.item, target.name(), to_position);
        let mut events = vec![Event::ItemTransferred {
            from: from.to_string(),
            from_kind,
            from_position,
            to: target.name().to_string(),
            to_kind: target.kind(),
            to_position,
            item: decision.item.clone(),
            time: now,
        }];
        match target {
            Station::Processor(p) => {
                let duration = item
                    .and_then(|i| i.record(p.process()))
                    .map_or(0, |r| r.assigned.duration);
                events.push(Event::ProcessStarted {
                    processor: p.name().to_string(),
                    process: p.process().to_string(),
                    item: decision.item.clone(),
                    position: to_position,
                    stations: p.stations(),
                    duration,
                    time: now,
                });
            }
            Station::Sink(k) => events.push(Event::ItemAbsorbed {
                sink: k.name().to_string(),
                item: decision.item.clone(),
                item_type: item.and_then(|i| i.item_type.clone()),
                arrival: item.map_or(now, |i| i.arrival),
                time: now,
            }),
            Station::Source(_) | Station::Buffer(_) => {}
        }
        for event in events {
            self.events.emit(event);
        }
    }

    // -----------------------------------------------------------------------
    // Clear / reset
    // -----------------------------------------------------------------------

    /// Empty every station, re-seed sources from their schedules and return
    /// to the setup phase. Topology is untouched.
    pub fn clear(&mut self) {
        for station in self.graph.stations_mut() {
            station.clear();
        }
        self.time = 0;
        self.pending.clear();
        self.awaiting = None;
        self.frozen = false;
        self.failed = false;
        self.events.clear();
        self.decisions.clear();
        self.rebuild_locations();
        log::debug!("scene cleared");
    }

    /// `clear`, optionally replacing the schedule of the scene's only source.
    pub fn reset(&mut self, schedule: Option<Schedule>) -> Result<(), SceneError> {
        let Some(schedule) = schedule else {
            self.clear();
            return Ok(());
        };
        let sources: Vec<EntityId> = self
            .graph
            .iter()
            .filter(|(_, s)| s.kind() == StationKind::Source)
            .map(|(id, _)| id)
            .collect();
        let [source] = sources.as_slice() else {
            return Err(SceneError::SourceCount(sources.len()));
        };
        self.reseed(*source, schedule)
    }

    /// `clear`, replacing the schedule of the named source.
    pub fn reset_source(&mut self, name: &str, schedule: Schedule) -> Result<(), SceneError> {
        let id = self.graph.require(name)?;
        self.reseed(id, schedule)
    }

    fn reseed(&mut self, id: EntityId, schedule: Schedule) -> Result<(), SceneError> {
        let name = self.name_of(id);
        if self.graph.get(id).and_then(Station::as_source).is_none() {
            return Err(SceneError::NotASource(name));
        }
        schedule.validate()?;
        self.check_unique_items(Some(id), &schedule)?;
        self.clear();
        if let Some(source) = self.graph.get_mut(id).and_then(Station::as_source_mut) {
            source.reseed(schedule)?;
        }
        self.validated = false;
        self.rebuild_locations();
        Ok(())
    }

    fn check_unique_items(
        &self,
        except: Option<EntityId>,
        schedule: &Schedule,
    ) -> Result<(), SceneError> {
        for spec in &schedule.items {
            let clash = self
                .graph
                .iter()
                .filter(|(id, _)| Some(*id) != except)
                .filter_map(|(_, s)| s.as_source())
                .any(|s| s.schedule().items.iter().any(|i| i.name == spec.name));
            if clash {
                return Err(ScheduleError::DuplicateItem(spec.name.clone()).into());
            }
        }
        Ok(())
    }

    fn rebuild_locations(&mut self) {
        self.locations.clear();
        for (id, station) in self.graph.iter() {
            for item in station.core().items() {
                self.locations.insert(item.name.clone(), id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn time(&self) -> Ticks {
        self.time
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        self.graph.by_name(name)
    }

    fn name_of(&self, id: EntityId) -> String {
        self.graph.name(id).unwrap_or_default().to_string()
    }

    /// Entity currently awaiting a decision.
    pub fn awaiting(&self) -> Option<&str> {
        self.awaiting.and_then(|id| self.graph.name(id))
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Whether connections and stations can still change.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Every non-sink station is empty.
    pub fn is_done(&self) -> bool {
        self.graph
            .iter()
            .all(|(_, s)| s.kind() == StationKind::Sink || s.core().is_empty())
    }

    fn stranded(&self) -> usize {
        self.graph
            .iter()
            .filter(|(_, s)| s.kind() != StationKind::Sink)
            .map(|(_, s)| s.core().len())
            .sum()
    }

    /// Future times already discovered by `check`, ascending.
    pub fn pending_times(&self) -> impl Iterator<Item = Ticks> + '_ {
        self.pending.iter().copied()
    }

    /// Items `entity` could move right now, oldest first.
    pub fn ready_items(&self, entity: &str) -> Vec<&Item> {
        self.station(entity)
            .map(|s| s.ready_items())
            .unwrap_or_default()
    }

    /// Downstream stations of `entity` with spare capacity, in port order.
    pub fn ready_targets(&self, entity: &str) -> Vec<&str> {
        let Some(id) = self.graph.id(entity) else {
            return Vec::new();
        };
        self.graph
            .downstream(id)
            .into_iter()
            .filter_map(|down| self.graph.get(down))
            .filter(|s| s.core().ready_to_receive())
            .map(|s| s.name())
            .collect()
    }

    /// Look up an item wherever it is held.
    pub fn item(&self, name: &str) -> Option<&Item> {
        let id = self.locations.get(name)?;
        self.graph.get(*id)?.core().item(name)
    }

    /// Name of the station holding `item`.
    pub fn location(&self, item: &str) -> Option<&str> {
        self.locations.get(item).and_then(|&id| self.graph.name(id))
    }

    /// `(item, done_time)` for every absorbed item, keyed by item name.
    pub fn completions(&self) -> BTreeMap<String, Ticks> {
        self.graph
            .iter()
            .filter_map(|(_, s)| s.as_sink())
            .flat_map(|k| k.completions())
            .map(|(name, at)| (name.to_string(), at))
            .collect()
    }

    /// Total items declared across all source schedules.
    pub fn scheduled_items(&self) -> usize {
        self.graph
            .iter()
            .filter_map(|(_, s)| s.as_source())
            .map(|s| s.schedule().len())
            .sum()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    /// Take all recorded events, oldest first.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn decision_log(&self) -> &DecisionLog {
        &self.decisions
    }

    pub fn take_decision_log(&mut self) -> DecisionLog {
        std::mem::take(&mut self.decisions)
    }

    /// FNV-1a digest of time, holdings, positions and process timing.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.time);
        for (_, station) in self.graph.iter() {
            let core = station.core();
            h.write_str(station.name());
            h.write_u64(core.len() as u64);
            for (position, name) in core.positions() {
                h.write_u64(position as u64);
                h.write_str(name);
                let Some(item) = core.item(name) else {
                    continue;
                };
                h.write_opt_u64(item.done_time);
                for (process, record) in &item.processes {
                    h.write_str(process);
                    h.write_opt_u64(record.arrival_time);
                    h.write_opt_u64(record.finish_time);
                }
            }
        }
        h.finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::ItemSpec;

    fn drill_schedule(items: &[(&str, Ticks, Ticks)]) -> Schedule {
        let mut schedule = Schedule::new(["drill"]);
        for &(name, arrival, duration) in items {
            schedule.push(ItemSpec::new(name, arrival).duration("drill", duration));
        }
        schedule
    }

    fn line(items: &[(&str, Ticks, Ticks)]) -> Scene {
        let mut scene = Scene::new();
        scene.add_source("S", drill_schedule(items)).unwrap();
        scene
            .add_processor("P", ProcessorConfig::new("drill"))
            .unwrap();
        scene.add_sink("K").unwrap();
        scene.connect("S", "P").unwrap();
        scene.connect("P", "K").unwrap();
        scene
    }

    fn first_ready(scene: &Scene, entity: &str, _t: Ticks) -> Decision {
        let item = scene.ready_items(entity)[0].name.clone();
        let target = scene.ready_targets(entity)[0].to_string();
        Decision::new(item, target)
    }

    #[test]
    fn manual_mode_suspends_at_source() {
        let mut scene = line(&[("I1", 2, 3)]);
        let outcome = scene.run_manual().unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Decision {
                entity: "S".into(),
                time: 2
            }
        );
        assert_eq!(scene.awaiting(), Some("S"));
        assert!(matches!(
            scene.run_manual(),
            Err(SceneError::DecisionPending { .. })
        ));

        let outcome = scene.resume(Decision::new("I1", "P")).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Decision {
                entity: "P".into(),
                time: 5
            }
        );
        let outcome = scene.resume(Decision::new("I1", "K")).unwrap();
        assert_eq!(outcome, RunOutcome::Done { time: 5 });
        assert_eq!(scene.completions()["I1"], 5);
    }

    #[test]
    fn automatic_mode_runs_to_completion() {
        let mut scene = line(&[("I1", 0, 5), ("I2", 0, 5)]);
        let outcome = scene.run(first_ready).unwrap();
        assert_eq!(outcome, RunOutcome::Done { time: 10 });
        let done = scene.completions();
        assert_eq!(done["I1"], 5);
        assert_eq!(done["I2"], 10);
        assert!(scene.pending_times().next().is_none());
    }

    #[test]
    fn resume_without_pending_decision() {
        let mut scene = line(&[("I1", 0, 1)]);
        assert_eq!(
            scene.resume(Decision::new("I1", "P")),
            Err(SceneError::NoPendingDecision)
        );
    }

    #[test]
    fn protocol_errors_leave_scene_waiting() {
        let mut scene = line(&[("I1", 0, 1)]);
        scene.run_manual().unwrap();

        let err = scene.resume(Decision::new("ghost", "P")).unwrap_err();
        assert!(err.is_protocol());
        let err = scene.resume(Decision::new("I1", "K")).unwrap_err();
        assert_eq!(
            err,
            SceneError::NotConnected {
                entity: "S".into(),
                target: "K".into()
            }
        );
        assert!(!scene.is_failed());
        assert_eq!(scene.awaiting(), Some("S"));
        assert!(scene.resume(Decision::new("I1", "P")).is_ok());
    }

    #[test]
    fn topology_frozen_after_first_decision() {
        let mut scene = line(&[("I1", 0, 1), ("I2", 0, 1)]);
        scene.add_buffer("B", BufferConfig::default()).unwrap();
        scene.connect("S", "B").unwrap();
        scene.disconnect("S", "B").unwrap();
        scene.run_manual().unwrap();
        // Still legal: nothing has moved yet.
        scene.connect("S", "B").unwrap();
        scene.resume(Decision::new("I1", "P")).unwrap();
        assert_eq!(scene.disconnect("S", "B"), Err(SceneError::TopologyFrozen));
        assert_eq!(scene.add_sink("K2"), Err(SceneError::TopologyFrozen));
    }

    #[test]
    fn unknown_process_rejected_at_run() {
        let mut scene = line(&[("I1", 0, 1)]);
        scene
            .add_processor("Q", ProcessorConfig::new("paint"))
            .unwrap();
        assert_eq!(
            scene.run_manual(),
            Err(SceneError::UnknownProcess {
                processor: "Q".into(),
                process: "paint".into()
            })
        );
    }

    #[test]
    fn dead_end_buffer_deadlocks() {
        let mut scene = Scene::new();
        scene
            .add_source("S", drill_schedule(&[("I1", 0, 1)]))
            .unwrap();
        scene.add_buffer("B", BufferConfig::default()).unwrap();
        scene.connect("S", "B").unwrap();
        let err = scene.run(first_ready).unwrap_err();
        assert_eq!(err, SceneError::Deadlock { time: 0, stranded: 1 });
        assert!(scene.is_failed());
        assert_eq!(scene.run_manual(), Err(SceneError::Failed));

        scene.clear();
        assert!(!scene.is_failed());
    }

    #[test]
    fn item_lookup_follows_transfers() {
        let mut scene = line(&[("I1", 0, 4)]);
        assert_eq!(scene.location("I1"), Some("S"));
        scene.run_manual().unwrap();
        scene.resume(Decision::new("I1", "P")).unwrap();
        assert_eq!(scene.location("I1"), Some("P"));
        let rec = scene.item("I1").unwrap().record("drill").unwrap();
        assert_eq!(rec.arrival_time, Some(0));
    }

    #[test]
    fn reset_with_new_schedule() {
        let mut scene = line(&[("I1", 0, 4)]);
        scene.run(first_ready).unwrap();
        scene
            .reset(Some(drill_schedule(&[("J1", 1, 2), ("J2", 1, 2)])))
            .unwrap();
        assert_eq!(scene.time(), 0);
        assert!(!scene.is_frozen());
        assert_eq!(scene.scheduled_items(), 2);
        let outcome = scene.run(first_ready).unwrap();
        assert_eq!(outcome, RunOutcome::Done { time: 5 });
        assert!(scene.completions().contains_key("J2"));
        assert!(!scene.completions().contains_key("I1"));
    }

    #[test]
    fn clear_restores_original_schedule() {
        let mut scene = line(&[("I1", 0, 4)]);
        let first = scene.run(first_ready).unwrap();
        let hash = scene.state_hash();
        scene.clear();
        assert_eq!(scene.location("I1"), Some("S"));
        assert_eq!(scene.run(first_ready).unwrap(), first);
        assert_eq!(scene.state_hash(), hash);
    }

    #[test]
    fn decisions_are_logged() {
        let mut scene = line(&[("I1", 0, 4)]);
        scene.run(first_ready).unwrap();
        let log = scene.decision_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log.records[0].entity, "S");
        assert_eq!(log.records[1].time, 4);
        assert!(log.records.iter().all(|r| r.hash.is_some()));
    }

    #[test]
    fn events_describe_the_run() {
        let mut scene = line(&[("I1", 1, 4)]);
        scene.run(first_ready).unwrap();
        let kinds: Vec<EventKind> = scene.drain_events().iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::TimeAdvanced,
                EventKind::ItemCreated,
                EventKind::DecisionRequested,
                EventKind::ItemTransferred,
                EventKind::ProcessStarted,
                EventKind::TimeAdvanced,
                EventKind::ProcessFinished,
                EventKind::DecisionRequested,
                EventKind::ItemTransferred,
                EventKind::ItemAbsorbed,
            ]
        );
    }

    #[test]
    fn reset_requires_single_source() {
        let mut scene = Scene::new();
        assert_eq!(
            scene.reset(Some(drill_schedule(&[]))),
            Err(SceneError::SourceCount(0))
        );
    }

    #[test]
    fn item_names_unique_across_sources() {
        let mut scene = line(&[("I1", 0, 4)]);
        let err = scene
            .add_source("S2", drill_schedule(&[("I1", 3, 1)]))
            .unwrap_err();
        assert_eq!(
            err,
            SceneError::Schedule(ScheduleError::DuplicateItem("I1".into()))
        );
    }

    fn two_source_line() -> Scene {
        let mut scene = Scene::new();
        scene
            .add_source("S1", drill_schedule(&[("A1", 0, 2)]))
            .unwrap();
        scene
            .add_source("S2", drill_schedule(&[("B1", 1, 2)]))
            .unwrap();
        scene.add_buffer("Q", BufferConfig::default()).unwrap();
        scene
            .add_processor("P", ProcessorConfig::new("drill"))
            .unwrap();
        scene.add_sink("K").unwrap();
        scene.connect("S1", "Q").unwrap();
        scene.connect("S2", "Q").unwrap();
        scene.connect("Q", "P").unwrap();
        scene.connect("P", "K").unwrap();
        scene
    }

    #[test]
    fn reset_source_keeps_other_sources_and_topology() {
        let mut scene = two_source_line();
        scene.run(first_ready).unwrap();
        let links = scene.graph().links().count();

        scene
            .reset_source("S2", drill_schedule(&[("B2", 0, 1), ("B3", 0, 1)]))
            .unwrap();
        assert_eq!(scene.time(), 0);
        assert!(!scene.is_frozen());
        assert_eq!(scene.graph().links().count(), links);
        assert_eq!(scene.scheduled_items(), 3);
        assert_eq!(scene.location("A1"), Some("S1"));
        assert_eq!(scene.location("B2"), Some("S2"));
        assert_eq!(scene.location("B1"), None);

        assert!(scene.run(first_ready).unwrap().is_done());
        let done: Vec<String> = scene.completions().into_keys().collect();
        assert_eq!(done, vec!["A1", "B2", "B3"]);
    }

    #[test]
    fn reset_source_rejects_clashing_names() {
        let mut scene = two_source_line();
        assert_eq!(
            scene.reset_source("S2", drill_schedule(&[("A1", 0, 1)])),
            Err(SceneError::Schedule(ScheduleError::DuplicateItem(
                "A1".into()
            )))
        );
        // Reusing the source's own names is fine.
        assert!(
            scene
                .reset_source("S2", drill_schedule(&[("B1", 4, 1)]))
                .is_ok()
        );
    }

    #[test]
    fn reset_source_on_non_source_fails() {
        let mut scene = two_source_line();
        assert_eq!(
            scene.reset_source("Q", drill_schedule(&[("X", 0, 1)])),
            Err(SceneError::NotASource("Q".into()))
        );
        assert_eq!(scene.location("A1"), Some("S1"));
        assert!(matches!(
            scene.reset_source("nope", drill_schedule(&[])),
            Err(SceneError::Graph(GraphError::UnknownEntity(_)))
        ));
    }
}
