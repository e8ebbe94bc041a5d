//! Line statistics for linesim scenes.
//!
//! Observes the core event feed and maintains per-station time series:
//! processor utilization (busy stations over station count), buffer backlog,
//! per-position busy intervals, and sink throughput and flow time. Values are
//! updated incrementally and use [`Fixed64`] arithmetic so results are
//! bit-identical across platforms.
//!
//! The observer never touches the scene; it only reads drained events.
//!
//! # Usage
//!
//! ```ignore
//! let mut stats = SceneStats::new(StatsConfig::default());
//! scene.run(policy::fifo)?;
//! stats.process_events(&scene.drain_events());
//! let busy = stats.utilization_at("Drill", 12);
//! let queue = stats.backlog_at("Queue", 12);
//! ```

use std::collections::{BTreeMap, VecDeque};

use linesim_core::event::Event;
use linesim_core::fixed::{Fixed64, Ticks, ratio, ratio_wide};
use linesim_core::id::Position;
use linesim_core::station::StationKind;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the statistics observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Trailing window in ticks for rolling sink throughput.
    pub window: Ticks,
    /// Maximum number of points retained per time series. The oldest point
    /// is dropped first.
    pub history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window: 60,
            history_capacity: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeSeries
// ---------------------------------------------------------------------------

/// Step function sampled at the times its value changed.
///
/// Several updates at one time collapse to the last one. When full, the
/// oldest point is evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeries<T> {
    points: BTreeMap<Ticks, T>,
    capacity: usize,
}

impl<T: Copy> TimeSeries<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "TimeSeries capacity must be > 0");
        Self {
            points: BTreeMap::new(),
            capacity,
        }
    }

    pub fn record(&mut self, time: Ticks, value: T) {
        self.points.insert(time, value);
        while self.points.len() > self.capacity {
            self.points.pop_first();
        }
    }

    /// Value in effect at `time`: the last point at or before it.
    pub fn at(&self, time: Ticks) -> Option<T> {
        self.points.range(..=time).next_back().map(|(_, v)| *v)
    }

    pub fn latest(&self) -> Option<(Ticks, T)> {
        self.points.last_key_value().map(|(t, v)| (*t, *v))
    }

    /// Points oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (Ticks, T)> + '_ {
        self.points.iter().map(|(t, v)| (*t, *v))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

// ---------------------------------------------------------------------------
// Per-station statistics
// ---------------------------------------------------------------------------

/// One closed stay of an item on a processor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub enter: Ticks,
    pub exit: Ticks,
}

impl Interval {
    pub fn len(&self) -> Ticks {
        self.exit.saturating_sub(self.enter)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct ProcessorStats {
    stations: usize,
    /// Position -> entry time of the item bound there.
    open: BTreeMap<Position, Ticks>,
    intervals: BTreeMap<Position, Vec<Interval>>,
    utilization: TimeSeries<Fixed64>,
}

impl ProcessorStats {
    fn new(stations: usize, capacity: usize) -> Self {
        Self {
            stations,
            open: BTreeMap::new(),
            intervals: BTreeMap::new(),
            utilization: TimeSeries::new(capacity),
        }
    }

    fn snapshot(&mut self, time: Ticks) {
        let busy = ratio(self.open.len() as u64, self.stations as u64);
        self.utilization.record(time, busy);
    }

    fn started(&mut self, position: Position, time: Ticks) {
        self.open.insert(position, time);
        self.snapshot(time);
    }

    fn left(&mut self, position: Position, time: Ticks) -> bool {
        let Some(enter) = self.open.remove(&position) else {
            return false;
        };
        self.intervals
            .entry(position)
            .or_default()
            .push(Interval { enter, exit: time });
        self.snapshot(time);
        true
    }

    /// Busy station-ticks in `[0, horizon)`, counting still-open stays up to
    /// the horizon.
    fn busy_time(&self, horizon: Ticks) -> u128 {
        let closed: u128 = self
            .intervals
            .values()
            .flatten()
            .map(|i| u128::from(i.exit.min(horizon).saturating_sub(i.enter)))
            .sum();
        let open: u128 = self
            .open
            .values()
            .map(|&enter| u128::from(horizon.saturating_sub(enter)))
            .sum();
        closed + open
    }
}

#[derive(Debug, Clone)]
struct BufferStats {
    held: usize,
    peak: usize,
    backlog: TimeSeries<usize>,
}

impl BufferStats {
    fn new(capacity: usize) -> Self {
        Self {
            held: 0,
            peak: 0,
            backlog: TimeSeries::new(capacity),
        }
    }

    fn entered(&mut self, time: Ticks) {
        self.held += 1;
        self.peak = self.peak.max(self.held);
        self.backlog.record(time, self.held);
    }

    fn left(&mut self, time: Ticks) {
        self.held = self.held.saturating_sub(1);
        self.backlog.record(time, self.held);
    }
}

#[derive(Debug, Clone, Default)]
struct SinkStats {
    absorbed: u64,
    flow_total: u64,
    /// Absorption times inside the rolling window, oldest first.
    recent: VecDeque<Ticks>,
}

// ---------------------------------------------------------------------------
// SceneStats
// ---------------------------------------------------------------------------

/// Incremental statistics over a scene's event feed.
#[derive(Debug, Clone)]
pub struct SceneStats {
    config: StatsConfig,
    now: Ticks,
    processors: BTreeMap<String, ProcessorStats>,
    buffers: BTreeMap<String, BufferStats>,
    sinks: BTreeMap<String, SinkStats>,
    created: BTreeMap<String, u64>,
    absorbed_by_type: BTreeMap<String, u64>,
}

impl Default for SceneStats {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}

impl SceneStats {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config,
            now: 0,
            processors: BTreeMap::new(),
            buffers: BTreeMap::new(),
            sinks: BTreeMap::new(),
            created: BTreeMap::new(),
            absorbed_by_type: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Latest simulated time seen in the feed.
    pub fn now(&self) -> Ticks {
        self.now
    }

    // -----------------------------------------------------------------------
    // Event ingestion
    // -----------------------------------------------------------------------

    /// Fold one event into the statistics. Events must arrive in the order
    /// the scene emitted them.
    pub fn process_event(&mut self, event: &Event) {
        self.now = self.now.max(event.time());
        let capacity = self.config.history_capacity;
        match event {
            Event::ItemCreated { source, .. } => {
                *self.created.entry(source.clone()).or_default() += 1;
            }
            Event::ProcessStarted {
                processor,
                position,
                stations,
                time,
                ..
            } => {
                self.processors
                    .entry(processor.clone())
                    .or_insert_with(|| ProcessorStats::new(*stations, capacity))
                    .started(*position, *time);
            }
            Event::ItemTransferred {
                from,
                from_kind,
                from_position,
                to,
                to_kind,
                time,
                ..
            } => {
                match from_kind {
                    StationKind::Processor => {
                        let closed = self
                            .processors
                            .get_mut(from)
                            .is_some_and(|p| p.left(*from_position, *time));
                        if !closed {
                            log::warn!("{from}: item left position {from_position} never started");
                        }
                    }
                    StationKind::Buffer => {
                        self.buffers
                            .entry(from.clone())
                            .or_insert_with(|| BufferStats::new(capacity))
                            .left(*time);
                    }
                    StationKind::Source | StationKind::Sink => {}
                }
                if *to_kind == StationKind::Buffer {
                    self.buffers
                        .entry(to.clone())
                        .or_insert_with(|| BufferStats::new(capacity))
                        .entered(*time);
                }
            }
            Event::ItemAbsorbed {
                sink,
                item_type,
                arrival,
                time,
                ..
            } => {
                let window = self.config.window;
                let stats = self.sinks.entry(sink.clone()).or_default();
                stats.absorbed += 1;
                stats.flow_total = stats
                    .flow_total
                    .saturating_add(time.saturating_sub(*arrival));
                stats.recent.push_back(*time);
                while stats
                    .recent
                    .front()
                    .is_some_and(|&t| t.saturating_add(window) <= *time)
                {
                    stats.recent.pop_front();
                }
                if let Some(t) = item_type {
                    *self.absorbed_by_type.entry(t.clone()).or_default() += 1;
                }
            }
            Event::ProcessFinished { .. }
            | Event::DecisionRequested { .. }
            | Event::TimeAdvanced { .. } => {}
        }
    }

    pub fn process_events<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) {
        for event in events {
            self.process_event(event);
        }
    }

    // -----------------------------------------------------------------------
    // Processors
    // -----------------------------------------------------------------------

    /// `processor_utilization[processor][time]`: fraction of busy stations.
    pub fn processor_utilization(&self, processor: &str) -> Option<&TimeSeries<Fixed64>> {
        self.processors.get(processor).map(|p| &p.utilization)
    }

    /// Utilization in effect at `time` (zero before the first item).
    pub fn utilization_at(&self, processor: &str, time: Ticks) -> Fixed64 {
        self.processor_utilization(processor)
            .and_then(|s| s.at(time))
            .unwrap_or(Fixed64::ZERO)
    }

    /// Closed busy intervals per position.
    pub fn busy_intervals(&self, processor: &str) -> Option<&BTreeMap<Position, Vec<Interval>>> {
        self.processors.get(processor).map(|p| &p.intervals)
    }

    /// Mean fraction of station time spent busy over `[0, horizon)`.
    pub fn mean_utilization(&self, processor: &str, horizon: Ticks) -> Fixed64 {
        let Some(p) = self.processors.get(processor) else {
            return Fixed64::ZERO;
        };
        ratio_wide(p.busy_time(horizon), p.stations as u128 * u128::from(horizon))
    }

    // -----------------------------------------------------------------------
    // Buffers
    // -----------------------------------------------------------------------

    /// `buffer_backlog[buffer][time]`: items held.
    pub fn buffer_backlog(&self, buffer: &str) -> Option<&TimeSeries<usize>> {
        self.buffers.get(buffer).map(|b| &b.backlog)
    }

    pub fn backlog_at(&self, buffer: &str, time: Ticks) -> usize {
        self.buffer_backlog(buffer)
            .and_then(|s| s.at(time))
            .unwrap_or(0)
    }

    pub fn peak_backlog(&self, buffer: &str) -> usize {
        self.buffers.get(buffer).map_or(0, |b| b.peak)
    }

    // -----------------------------------------------------------------------
    // Sinks and sources
    // -----------------------------------------------------------------------

    /// Items absorbed by `sink`.
    pub fn throughput(&self, sink: &str) -> u64 {
        self.sinks.get(sink).map_or(0, |s| s.absorbed)
    }

    /// Items of `item_type` absorbed by any sink.
    pub fn throughput_by_type(&self, item_type: &str) -> u64 {
        self.absorbed_by_type.get(item_type).copied().unwrap_or(0)
    }

    /// Items absorbed by `sink` per tick over the trailing window.
    pub fn rolling_throughput(&self, sink: &str) -> Fixed64 {
        let Some(stats) = self.sinks.get(sink) else {
            return Fixed64::ZERO;
        };
        let window = self.config.window;
        let recent = stats
            .recent
            .iter()
            .filter(|&&t| t.saturating_add(window) > self.now)
            .count();
        ratio(recent as u64, window)
    }

    /// Mean ticks from scheduled arrival to absorption, over all sinks.
    pub fn mean_flow_time(&self) -> Fixed64 {
        let (total, count) = self
            .sinks
            .values()
            .fold((0u128, 0u128), |(t, c), s| {
                (t + u128::from(s.flow_total), c + u128::from(s.absorbed))
            });
        ratio_wide(total, count)
    }

    /// Items released by `source`.
    pub fn created(&self, source: &str) -> u64 {
        self.created.get(source).copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    pub fn clear(&mut self) {
        self.now = 0;
        self.processors.clear();
        self.buffers.clear();
        self.sinks.clear();
        self.created.clear();
        self.absorbed_by_type.clear();
    }

    pub fn tracked_processor_count(&self) -> usize {
        self.processors.len()
    }

    pub fn tracked_buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use linesim_core::buffer::BufferConfig;
    use linesim_core::fixed::f64_to_fixed64;
    use linesim_core::test_utils::*;

    fn small_config() -> StatsConfig {
        StatsConfig {
            window: 10,
            history_capacity: 16,
        }
    }

    fn observe(scene: &mut linesim_core::scene::Scene, config: StatsConfig) -> SceneStats {
        let mut stats = SceneStats::new(config);
        stats.process_events(&scene.drain_events());
        stats
    }

    fn started(processor: &str, position: Position, time: Ticks) -> Event {
        Event::ProcessStarted {
            processor: processor.into(),
            process: "drill".into(),
            item: format!("I{time}"),
            position,
            stations: 2,
            duration: 3,
            time,
        }
    }

    fn left_processor(processor: &str, position: Position, time: Ticks) -> Event {
        Event::ItemTransferred {
            from: processor.into(),
            from_kind: StationKind::Processor,
            from_position: position,
            to: "K".into(),
            to_kind: StationKind::Sink,
            to_position: 0,
            item: "x".into(),
            time,
        }
    }

    // -----------------------------------------------------------------------
    // TimeSeries
    // -----------------------------------------------------------------------

    #[test]
    fn time_series_is_a_step_function() {
        let mut series = TimeSeries::new(8);
        series.record(2, 1usize);
        series.record(5, 3);
        series.record(5, 2);
        assert_eq!(series.at(0), None);
        assert_eq!(series.at(2), Some(1));
        assert_eq!(series.at(4), Some(1));
        assert_eq!(series.at(9), Some(2));
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest(), Some((5, 2)));
    }

    #[test]
    fn time_series_drops_oldest() {
        let mut series = TimeSeries::new(2);
        for t in 0..5 {
            series.record(t, t);
        }
        assert_eq!(series.iter().collect::<Vec<_>>(), vec![(3, 3), (4, 4)]);
        assert_eq!(series.at(1), None);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn time_series_zero_capacity_panics() {
        let _ = TimeSeries::<usize>::new(0);
    }

    // -----------------------------------------------------------------------
    // Synthetic feeds
    // -----------------------------------------------------------------------

    #[test]
    fn utilization_counts_busy_stations() {
        let mut stats = SceneStats::new(small_config());
        stats.process_event(&started("P", 0, 0));
        stats.process_event(&started("P", 1, 2));
        stats.process_event(&left_processor("P", 0, 3));
        stats.process_event(&left_processor("P", 1, 6));

        assert_eq!(stats.utilization_at("P", 0), f64_to_fixed64(0.5));
        assert_eq!(stats.utilization_at("P", 2), Fixed64::ONE);
        assert_eq!(stats.utilization_at("P", 4), f64_to_fixed64(0.5));
        assert_eq!(stats.utilization_at("P", 6), Fixed64::ZERO);

        // (3 + 4) busy station-ticks over 2 stations * 7 ticks.
        assert_eq!(stats.mean_utilization("P", 7), f64_to_fixed64(0.5));

        let intervals = stats.busy_intervals("P").unwrap();
        assert_eq!(intervals[&0], vec![Interval { enter: 0, exit: 3 }]);
        assert_eq!(intervals[&1][0].len(), 4);
    }

    #[test]
    fn open_stays_count_toward_horizon() {
        let mut stats = SceneStats::new(small_config());
        stats.process_event(&started("P", 0, 4));
        assert_eq!(stats.mean_utilization("P", 8), f64_to_fixed64(0.25));
        assert_eq!(stats.mean_utilization("unknown", 8), Fixed64::ZERO);
        assert_eq!(stats.mean_utilization("P", 0), Fixed64::ZERO);
    }

    #[test]
    fn rolling_throughput_forgets_old_absorptions() {
        let mut stats = SceneStats::new(small_config());
        for time in [0, 1, 12, 15] {
            stats.process_event(&Event::ItemAbsorbed {
                sink: "K".into(),
                item: format!("I{time}"),
                item_type: Some("bolt".into()),
                arrival: 0,
                time,
            });
        }
        assert_eq!(stats.throughput("K"), 4);
        assert_eq!(stats.throughput_by_type("bolt"), 4);
        // Only t=12 and t=15 fall in (5, 15].
        assert_eq!(stats.rolling_throughput("K"), f64_to_fixed64(0.2));
        assert_eq!(stats.mean_flow_time(), f64_to_fixed64(7.0));
    }

    #[test]
    fn long_runs_keep_exact_means() {
        let mut stats = SceneStats::default();
        for i in 0..3 {
            stats.process_event(&Event::ItemAbsorbed {
                sink: "K".into(),
                item: format!("I{i}"),
                item_type: None,
                arrival: 0,
                time: 1_000_000_000,
            });
        }
        // Flow total 3e9 exceeds the fixed-point integer range; the mean does not.
        assert_eq!(stats.mean_flow_time(), Fixed64::from_num(1_000_000_000));

        stats.process_event(&started("P", 0, 0));
        assert_eq!(stats.mean_utilization("P", 1 << 40), f64_to_fixed64(0.5));
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let mut stats = SceneStats::new(StatsConfig {
            window: Ticks::MAX,
            history_capacity: 16,
        });
        stats.process_event(&Event::ItemAbsorbed {
            sink: "K".into(),
            item: "I1".into(),
            item_type: None,
            arrival: 0,
            time: 5,
        });
        assert_eq!(stats.throughput("K"), 1);
        assert_eq!(stats.rolling_throughput("K"), Fixed64::ZERO);
    }

    // -----------------------------------------------------------------------
    // Scene feeds
    // -----------------------------------------------------------------------

    #[test]
    fn scenario_a_keeps_processor_saturated() {
        let mut scene = scenario_a();
        run_fifo(&mut scene);
        let stats = observe(&mut scene, StatsConfig::default());

        assert_eq!(stats.created("S"), 2);
        assert_eq!(stats.utilization_at("P", 0), Fixed64::ONE);
        assert_eq!(stats.utilization_at("P", 5), Fixed64::ONE);
        assert_eq!(stats.utilization_at("P", 10), Fixed64::ZERO);
        assert_eq!(stats.mean_utilization("P", 10), Fixed64::ONE);
        assert_eq!(stats.throughput("K"), 2);
        assert_eq!(stats.mean_flow_time(), f64_to_fixed64(7.5));
        assert_eq!(stats.now(), 10);
    }

    #[test]
    fn scenario_b_backlog_series() {
        let mut scene = scenario_b(4);
        run_fifo(&mut scene);
        let stats = observe(&mut scene, StatsConfig::default());

        assert_eq!(stats.peak_backlog("B"), 1);
        assert_eq!(stats.backlog_at("B", 0), 1);
        assert_eq!(stats.backlog_at("B", 3), 1);
        assert_eq!(stats.backlog_at("B", 4), 0);
        assert!(
            stats
                .buffer_backlog("B")
                .unwrap()
                .iter()
                .all(|(_, held)| held <= 1)
        );
        assert_eq!(stats.mean_utilization("P", 8), Fixed64::ONE);
    }

    #[test]
    fn parallel_stations_report_fractional_utilization() {
        let mut scene = build_line(schedule("drill", &[("A", 0, 4), ("B", 2, 4)]), 2, None);
        run_fifo(&mut scene);
        let stats = observe(&mut scene, small_config());

        assert_eq!(stats.utilization_at("P0", 1), f64_to_fixed64(0.5));
        assert_eq!(stats.utilization_at("P0", 3), Fixed64::ONE);
        assert_eq!(stats.utilization_at("P0", 5), f64_to_fixed64(0.5));
        // 8 busy station-ticks over 2 stations * 6 ticks.
        assert_eq!(
            stats.mean_utilization("P0", 6),
            ratio(8, 12)
        );
    }

    #[test]
    fn buffered_line_feeds_every_station() {
        let mut scene = build_line(
            random_schedule(4, 12, 2, 5),
            1,
            Some(BufferConfig::bounded(3)),
        );
        run_fifo(&mut scene);
        let stats = observe(&mut scene, StatsConfig::default());

        assert_eq!(stats.tracked_processor_count(), 2);
        assert_eq!(stats.tracked_buffer_count(), 2);
        assert_eq!(stats.throughput("K"), 12);
        assert_eq!(
            stats.throughput_by_type("a") + stats.throughput_by_type("b"),
            12
        );
        for buffer in ["B0", "B1"] {
            assert!(stats.peak_backlog(buffer) <= 3);
            assert_eq!(stats.buffer_backlog(buffer).unwrap().latest().unwrap().1, 0);
        }
        let end = stats.now();
        for processor in ["P0", "P1"] {
            let util = stats.mean_utilization(processor, end);
            assert!(util > Fixed64::ZERO && util <= Fixed64::ONE);
        }
    }

    #[test]
    fn clear_forgets_everything() {
        let mut scene = scenario_a();
        run_fifo(&mut scene);
        let mut stats = observe(&mut scene, StatsConfig::default());
        stats.clear();
        assert_eq!(stats.tracked_processor_count(), 0);
        assert_eq!(stats.throughput("K"), 0);
        assert_eq!(stats.now(), 0);
    }
}
