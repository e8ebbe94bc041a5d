//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::buffer::BufferConfig;
use crate::entity::Entity;
use crate::fixed::{Fixed64, Ticks};
use crate::policy::fifo;
use crate::processor::ProcessorConfig;
use crate::rng::SimRng;
use crate::scene::Scene;
use crate::sim::RunOutcome;
use crate::station::StationKind;
use crate::workload::{ItemSpec, Schedule};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Schedule builders
// ===========================================================================

/// Single-process schedule from `(name, arrival, duration)` triples.
pub fn schedule(process: &str, items: &[(&str, Ticks, Ticks)]) -> Schedule {
    let mut schedule = Schedule::new([process]);
    for &(name, arrival, duration) in items {
        schedule.push(ItemSpec::new(name, arrival).duration(process, duration));
    }
    schedule
}

/// Processes named `p0..p{stages}`.
pub fn stage_names(stages: usize) -> Vec<String> {
    (0..stages).map(|i| format!("p{i}")).collect()
}

/// `count` items over `stages` processes with seeded arrivals (non-decreasing)
/// and durations in `1..=max_duration`. Types alternate between `a` and `b`.
pub fn random_schedule(seed: u64, count: usize, stages: usize, max_duration: Ticks) -> Schedule {
    let mut rng = SimRng::new(seed);
    let processes = stage_names(stages);
    let mut schedule = Schedule::new(processes.iter().cloned());
    let mut arrival = 0;
    for i in 0..count {
        arrival += rng.below(3) as Ticks;
        let mut spec = ItemSpec::new(format!("I{i}"), arrival).typed(if i % 2 == 0 {
            "a"
        } else {
            "b"
        });
        for process in &processes {
            let duration = 1 + rng.below(max_duration.max(1) as usize) as Ticks;
            spec = spec.duration(process.clone(), duration);
        }
        schedule.push(spec);
    }
    schedule
}

// ===========================================================================
// Scene builders
// ===========================================================================

/// Two items at t=0 into a single-station processor (duration 5), then a sink.
pub fn scenario_a() -> Scene {
    let mut scene = Scene::new();
    scene
        .add_source("S", schedule("drill", &[("I1", 0, 5), ("I2", 0, 5)]))
        .unwrap();
    scene
        .add_processor("P", ProcessorConfig::new("drill"))
        .unwrap();
    scene.add_sink("K").unwrap();
    scene.connect("S", "P").unwrap();
    scene.connect("P", "K").unwrap();
    scene
}

/// Like [`scenario_a`] with a capacity-1 buffer in front of the processor.
pub fn scenario_b(duration: Ticks) -> Scene {
    let mut scene = Scene::new();
    scene
        .add_source(
            "S",
            schedule("drill", &[("I1", 0, duration), ("I2", 0, duration)]),
        )
        .unwrap();
    scene.add_buffer("B", BufferConfig::bounded(1)).unwrap();
    scene
        .add_processor("P", ProcessorConfig::new("drill"))
        .unwrap();
    scene.add_sink("K").unwrap();
    scene.connect("S", "B").unwrap();
    scene.connect("B", "P").unwrap();
    scene.connect("P", "K").unwrap();
    scene
}

/// Serial line: source, then per stage an optional buffer and a processor
/// with `stations` positions, then a sink.
pub fn build_line(schedule: Schedule, stations: usize, buffer: Option<BufferConfig>) -> Scene {
    let processes = schedule.process_list.clone();
    let mut scene = Scene::new();
    scene.add_source("S", schedule).unwrap();
    let mut prev = "S".to_string();
    for (i, process) in processes.iter().enumerate() {
        if let Some(config) = &buffer {
            let name = format!("B{i}");
            scene.add_buffer(name.as_str(), config.clone()).unwrap();
            scene.connect(&prev, &name).unwrap();
            prev = name;
        }
        let name = format!("P{i}");
        scene
            .add_processor(
                name.as_str(),
                ProcessorConfig::new(process.as_str()).with_stations(stations),
            )
            .unwrap();
        scene.connect(&prev, &name).unwrap();
        prev = name;
    }
    scene.add_sink("K").unwrap();
    scene.connect(&prev, "K").unwrap();
    scene
}

/// Source -> unbounded buffer -> `width` parallel processors of the first
/// process -> one sink.
pub fn build_parallel_shop(schedule: Schedule, width: usize, stations: usize) -> Scene {
    let process = schedule.process_list.first().cloned().unwrap_or_default();
    let mut scene = Scene::new();
    scene.add_source("S", schedule).unwrap();
    scene.add_buffer("Q", BufferConfig::default()).unwrap();
    scene.add_sink("K").unwrap();
    scene.connect("S", "Q").unwrap();
    for i in 0..width {
        let name = format!("P{i}");
        scene
            .add_processor(
                name.as_str(),
                ProcessorConfig::new(process.as_str()).with_stations(stations),
            )
            .unwrap();
        scene.connect("Q", &name).unwrap();
        scene.connect(&name, "K").unwrap();
    }
    scene
}

// ===========================================================================
// Run helpers
// ===========================================================================

/// Run to completion with the FIFO rule.
pub fn run_fifo(scene: &mut Scene) -> RunOutcome {
    scene.run(fifo).unwrap()
}

/// Items held by every sink in the scene.
pub fn absorbed(scene: &Scene) -> usize {
    scene
        .graph()
        .iter()
        .filter(|(_, s)| s.kind() == StationKind::Sink)
        .map(|(_, s)| s.core().len())
        .sum()
}
