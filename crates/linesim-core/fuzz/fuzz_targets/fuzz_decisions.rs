#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use linesim_core::buffer::BufferConfig;
use linesim_core::processor::ProcessorConfig;
use linesim_core::scene::Scene;
use linesim_core::sim::{Decision, RunOutcome};
use linesim_core::test_utils::*;
use linesim_core::validation::check_invariants;

/// A structured driver action for fuzzing.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    AddBuffer { capacity: u8 },
    AddProcessor { stations: u8 },
    Connect { from: u8, to: u8 },
    Disconnect { from: u8, to: u8 },
    /// Resume with the `item`-th held item of the awaiting station and the
    /// `target`-th station overall, valid or not.
    Decide { item: u8, target: u8 },
}

/// Top-level fuzz input: a seed for the workload and a sequence of actions.
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    seed: u64,
    items: u8,
    ops: Vec<FuzzOp>,
}

fn pick(names: &[String], index: u8) -> String {
    names[index as usize % names.len()].clone()
}

fuzz_target!(|input: FuzzInput| {
    let mut scene = Scene::new();
    let count = (input.items % 16) as usize;
    if scene
        .add_source("S", random_schedule(input.seed, count, 1, 5))
        .is_err()
    {
        return;
    }
    let _ = scene.add_sink("K");
    let mut names = vec!["S".to_string(), "K".to_string()];
    let mut outcome: Option<RunOutcome> = None;

    // Limit operations to prevent timeouts.
    let max_ops = input.ops.len().min(200);

    for op in &input.ops[..max_ops] {
        match op {
            FuzzOp::AddBuffer { capacity } => {
                let name = format!("B{}", names.len());
                let config = BufferConfig::bounded(1 + *capacity as usize % 4);
                if scene.add_buffer(name.as_str(), config).is_ok() {
                    names.push(name);
                }
            }
            FuzzOp::AddProcessor { stations } => {
                let name = format!("P{}", names.len());
                let config = ProcessorConfig::new("p0").with_stations(1 + *stations as usize % 3);
                if scene.add_processor(name.as_str(), config).is_ok() {
                    names.push(name);
                }
            }
            FuzzOp::Connect { from, to } => {
                let _ = scene.connect(&pick(&names, *from), &pick(&names, *to));
            }
            FuzzOp::Disconnect { from, to } => {
                let _ = scene.disconnect(&pick(&names, *from), &pick(&names, *to));
            }
            FuzzOp::Decide { item, target } => {
                if scene.is_failed() {
                    break;
                }
                let result = match scene.awaiting().map(str::to_string) {
                    None => scene.run_manual(),
                    Some(entity) => {
                        let held: Vec<String> = scene
                            .ready_items(&entity)
                            .iter()
                            .map(|i| i.name.clone())
                            .collect();
                        let item = held
                            .get(*item as usize % held.len().max(1))
                            .cloned()
                            .unwrap_or_default();
                        scene.resume(Decision::new(item, pick(&names, *target)))
                    }
                };
                if let Ok(next) = result {
                    outcome = Some(next);
                }
            }
        }
        if !scene.is_failed() {
            assert!(check_invariants(&scene).is_empty());
        }
    }

    if let Some(RunOutcome::Done { .. }) = outcome {
        assert!(scene.is_done());
    }
});
