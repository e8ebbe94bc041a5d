//! Property-based tests for the linesim core.
//!
//! Uses proptest to generate random schedules and line shapes, then verify
//! conservation, capacity, clock monotonicity, check idempotence and replay
//! determinism.

use linesim_core::buffer::BufferConfig;
use linesim_core::entity::{Entity, FlowContext};
use linesim_core::policy::{RandomPolicy, fifo};
use linesim_core::replay::{DecisionLog, replay};
use linesim_core::scene::Scene;
use linesim_core::sim::RunOutcome;
use linesim_core::test_utils::*;
use linesim_core::validation::{check_invariants, diff_scenes};
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct Shape {
    seed: u64,
    items: usize,
    stages: usize,
    stations: usize,
    buffer: Option<usize>,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    (
        any::<u64>(),
        1..25usize,
        1..4usize,
        1..3usize,
        prop::option::of(1..4usize),
    )
        .prop_map(|(seed, items, stages, stations, buffer)| Shape {
            seed,
            items,
            stages,
            stations,
            buffer,
        })
}

fn build(shape: &Shape) -> Scene {
    build_line(
        random_schedule(shape.seed, shape.items, shape.stages, 6),
        shape.stations,
        shape.buffer.map(BufferConfig::bounded),
    )
}

/// Every station's `check` evaluated twice against the same state.
fn checks_agree(scene: &Scene) -> bool {
    let graph = scene.graph();
    graph.iter().all(|(id, station)| {
        let ctx = FlowContext {
            downstream_ready: graph.downstream_ready(id),
        };
        station.check(scene.time(), ctx) == station.check(scene.time(), ctx)
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every scheduled item ends in the sink; no item is ever held twice.
    #[test]
    fn items_are_conserved(shape in arb_shape()) {
        let mut scene = build(&shape);
        let outcome = run_fifo(&mut scene);
        prop_assert!(outcome.is_done());
        prop_assert_eq!(absorbed(&scene), shape.items);
        prop_assert_eq!(scene.completions().len(), shape.items);
        prop_assert!(check_invariants(&scene).is_empty());
    }

    /// Capacity, ownership and port invariants hold at every decision point,
    /// the clock never runs backwards and `check` is side-effect free.
    #[test]
    fn invariants_hold_at_decision_points(shape in arb_shape(), policy_seed in any::<u64>()) {
        let mut scene = build(&shape);
        let mut policy = RandomPolicy::new(policy_seed);
        let mut last = 0;
        let mut outcome = scene.run_manual().unwrap();
        while let RunOutcome::Decision { entity, time } = outcome.clone() {
            prop_assert!(time >= last);
            last = time;
            prop_assert_eq!(check_invariants(&scene), vec![]);
            prop_assert!(checks_agree(&scene));
            let decision = policy.decide(&scene, &entity, time);
            outcome = scene.resume(decision).unwrap();
        }
        prop_assert!(outcome.time() >= last);
        prop_assert_eq!(absorbed(&scene), shape.items);
    }

    /// Recorded events come out in non-decreasing time order.
    #[test]
    fn event_times_are_monotonic(shape in arb_shape()) {
        let mut scene = build(&shape);
        run_fifo(&mut scene);
        let events = scene.drain_events();
        for pair in events.windows(2) {
            prop_assert!(pair[0].time() <= pair[1].time());
        }
    }

    /// Replaying a recorded run on a fresh scene reproduces it exactly.
    #[test]
    fn replay_is_deterministic(shape in arb_shape(), policy_seed in any::<u64>()) {
        let mut original = build(&shape);
        let mut policy = RandomPolicy::new(policy_seed);
        original.run(policy.rule()).unwrap();

        let bytes = original.decision_log().to_bytes().unwrap();
        let log = DecisionLog::from_bytes(&bytes).unwrap();
        let mut copy = build(&shape);
        let outcome = replay(&mut copy, &log).unwrap();

        prop_assert!(outcome.is_done());
        prop_assert_eq!(copy.completions(), original.completions());
        prop_assert_eq!(copy.state_hash(), original.state_hash());
        prop_assert!(diff_scenes(&original, &copy).is_identical);
    }

    /// The same seed drives the same run.
    #[test]
    fn seeded_runs_agree(shape in arb_shape(), policy_seed in any::<u64>()) {
        let mut a = build(&shape);
        let mut b = build(&shape);
        a.run(RandomPolicy::new(policy_seed).rule()).unwrap();
        b.run(RandomPolicy::new(policy_seed).rule()).unwrap();
        prop_assert_eq!(a.state_hash(), b.state_hash());
        prop_assert_eq!(a.decision_log(), b.decision_log());
    }

    /// `fifo` and `run` agree with manual stepping using the same rule.
    #[test]
    fn manual_and_automatic_agree(shape in arb_shape()) {
        let mut auto = build(&shape);
        let done = run_fifo(&mut auto);

        let mut manual = build(&shape);
        let mut outcome = manual.run_manual().unwrap();
        while let Some(entity) = outcome.entity().map(str::to_string) {
            let decision = fifo(&manual, &entity, outcome.time());
            outcome = manual.resume(decision).unwrap();
        }
        prop_assert_eq!(outcome, done);
        prop_assert_eq!(manual.state_hash(), auto.state_hash());
    }
}
