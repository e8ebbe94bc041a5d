//! Job shop example: a JSON workload through cut and weld stations.
//!
//! Loads a schedule from JSON, wires Source -> Queue -> Cut (2 stations) ->
//! Weld -> Sink and runs it twice: once with the built-in FIFO rule, once
//! stepwise with a shortest-processing-time rule chosen by the caller.
//!
//! Run with: `RUST_LOG=debug cargo run -p linesim-core --example job_shop`

use linesim_core::buffer::BufferConfig;
use linesim_core::data_loader::load_schedule_json;
use linesim_core::event::Event;
use linesim_core::fixed::Ticks;
use linesim_core::item::Item;
use linesim_core::policy::fifo;
use linesim_core::processor::ProcessorConfig;
use linesim_core::scene::Scene;
use linesim_core::sim::{Decision, RunOutcome};

const WORKLOAD: &str = r#"{
    "process_list": ["cut", "weld"],
    "J1": { "arrival": 0, "type": "frame",   "cut": 6, "weld": 3 },
    "J2": { "arrival": 0, "type": "bracket", "cut": 2, "weld": 2 },
    "J3": { "arrival": 1, "type": "frame",   "cut": 5, "weld": 4 },
    "J4": { "arrival": 2, "type": "bracket", "cut": 1, "weld": 1 },
    "J5": { "arrival": 2, "type": "bracket", "cut": 3, "weld": 2 },
    "J6": { "arrival": 7, "type": "frame",   "cut": 4, "weld": 5 }
}"#;

fn build() -> Result<Scene, Box<dyn std::error::Error>> {
    let schedule = load_schedule_json(WORKLOAD)?;
    let mut scene = Scene::new();
    scene.add_source("Orders", schedule)?;
    scene.add_buffer("Queue", BufferConfig::default())?;
    scene.add_processor("Cut", ProcessorConfig::new("cut").with_stations(2))?;
    scene.add_processor("Weld", ProcessorConfig::new("weld"))?;
    scene.add_sink("Shipped")?;
    scene.connect("Orders", "Queue")?;
    scene.connect("Queue", "Cut")?;
    scene.connect("Cut", "Weld")?;
    scene.connect("Weld", "Shipped")?;
    Ok(scene)
}

/// Send the ready item with the shortest processing time at the first free
/// downstream station.
fn shortest_first(scene: &Scene, entity: &str) -> Decision {
    let Some(target) = scene.ready_targets(entity).first().map(|t| t.to_string()) else {
        return Decision::new("", "");
    };
    let process = scene
        .station(&target)
        .and_then(|s| s.as_processor())
        .map(|p| p.process().to_string());
    let duration = |item: &Item| -> Ticks {
        process
            .as_deref()
            .and_then(|p| item.record(p))
            .map_or(0, |r| r.assigned.duration)
    };
    let item = scene
        .ready_items(entity)
        .into_iter()
        .min_by_key(|item| (duration(item), item.name.clone()))
        .map(|item| item.name.clone())
        .unwrap_or_default();
    Decision::new(item, target)
}

fn report(label: &str, scene: &mut Scene) {
    println!("--- {label} ---");
    for (name, done) in scene.completions() {
        let flow = scene.item(&name).and_then(|i| i.flow_time()).unwrap_or(0);
        println!("  {name}: done at t={done}, flow time {flow}");
    }
    let moves = scene
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::ItemTransferred { .. }))
        .count();
    println!("  {moves} transfers, makespan t={}", scene.time());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // --- Automatic: FIFO everywhere ---

    let mut scene = build()?;
    let outcome = scene.run(fifo)?;
    println!("fifo finished: {outcome:?}");
    report("fifo", &mut scene);

    // --- Stepwise: the caller decides ---

    scene.clear();
    let mut outcome = scene.run_manual()?;
    let mut decisions = 0;
    while let RunOutcome::Decision { entity, time } = &outcome {
        let decision = shortest_first(&scene, entity);
        log::debug!("t={time}: {entity} sends {} to {}", decision.item, decision.target);
        outcome = scene.resume(decision)?;
        decisions += 1;
    }
    println!("shortest-first finished after {decisions} decisions: {outcome:?}");
    report("shortest-first", &mut scene);

    Ok(())
}
