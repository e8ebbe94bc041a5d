//! Structural invariant checks and scene comparison.
//!
//! [`check_invariants`] inspects a scene at any observable instant (between
//! calls into it) and reports every broken invariant. [`diff_scenes`] compares
//! two scenes station by station, for determinism checks.

use crate::entity::Entity;
use crate::fixed::Ticks;
use crate::item::ProcessState;
use crate::scene::Scene;
use crate::station::Station;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// More items held than capacity allows.
    OverCapacity {
        entity: String,
        held: usize,
        capacity: usize,
    },
    /// Position maps disagree, or a position is out of range.
    InconsistentPositions { entity: String },
    /// One item name is held by several stations.
    SharedOwnership { item: String, holders: Vec<String> },
    /// Link table and port tables disagree.
    PortsOutOfSync,
    /// An item has more than one process in progress.
    ConcurrentProcesses { item: String },
    /// A processor holds an item whose record for its process is pending.
    IdleOccupant { entity: String, item: String },
    /// Scene lookup points at the wrong holder.
    StaleLocation { item: String },
    /// Items held across all stations differ from the scheduled total.
    NotConserved { scheduled: usize, held: usize },
}

/// Check every structural invariant of `scene`. Empty means healthy.
pub fn check_invariants(scene: &Scene) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut holders: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut held_total = 0usize;

    for (_, station) in scene.graph().iter() {
        let core = station.core();
        let name = station.name();
        held_total += core.len();

        if core.len() > core.capacity() {
            violations.push(Violation::OverCapacity {
                entity: name.to_string(),
                held: core.len(),
                capacity: core.capacity(),
            });
        }
        if !core.is_consistent() {
            violations.push(Violation::InconsistentPositions {
                entity: name.to_string(),
            });
        }

        for item in core.items() {
            holders.entry(item.name.as_str()).or_default().push(name);

            let running = item
                .processes
                .values()
                .filter(|r| r.state == ProcessState::InProgress)
                .count();
            if running > 1 {
                violations.push(Violation::ConcurrentProcesses {
                    item: item.name.clone(),
                });
            }
            if let Station::Processor(p) = station
                && item
                    .record(p.process())
                    .is_none_or(|r| r.state == ProcessState::Pending)
            {
                violations.push(Violation::IdleOccupant {
                    entity: name.to_string(),
                    item: item.name.clone(),
                });
            }
            if scene.location(&item.name) != Some(name) {
                violations.push(Violation::StaleLocation {
                    item: item.name.clone(),
                });
            }
        }
    }

    for (item, names) in holders {
        if names.len() > 1 {
            violations.push(Violation::SharedOwnership {
                item: item.to_string(),
                holders: names.into_iter().map(str::to_string).collect(),
            });
        }
    }

    if !scene.graph().ports_mirror_links() {
        violations.push(Violation::PortsOutOfSync);
    }

    let scheduled = scene.scheduled_items();
    if held_total != scheduled {
        violations.push(Violation::NotConserved {
            scheduled,
            held: held_total,
        });
    }

    violations
}

// ---------------------------------------------------------------------------
// Scene comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationDiff {
    OnlyInA(String),
    OnlyInB(String),
    /// Same station, different items or positions.
    Holdings { entity: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDiff {
    pub is_identical: bool,
    pub time: Option<(Ticks, Ticks)>,
    pub stations: Vec<StationDiff>,
}

/// Compare two scenes station by station (matched by name).
pub fn diff_scenes(a: &Scene, b: &Scene) -> SceneDiff {
    let mut stations = Vec::new();
    for (_, sa) in a.graph().iter() {
        match b.station(sa.name()) {
            None => stations.push(StationDiff::OnlyInA(sa.name().to_string())),
            Some(sb) => {
                let ha: Vec<_> = sa.core().positions().collect();
                let hb: Vec<_> = sb.core().positions().collect();
                let same_items = ha == hb
                    && ha
                        .iter()
                        .all(|(_, item)| sa.core().item(item) == sb.core().item(item));
                if !same_items {
                    stations.push(StationDiff::Holdings {
                        entity: sa.name().to_string(),
                    });
                }
            }
        }
    }
    for (_, sb) in b.graph().iter() {
        if a.station(sb.name()).is_none() {
            stations.push(StationDiff::OnlyInB(sb.name().to_string()));
        }
    }
    let time = (a.time() != b.time()).then_some((a.time(), b.time()));
    SceneDiff {
        is_identical: stations.is_empty() && time.is_none(),
        time,
        stations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::fifo;
    use crate::processor::ProcessorConfig;
    use crate::sim::Decision;
    use crate::workload::{ItemSpec, Schedule};

    fn scene() -> Scene {
        let mut schedule = Schedule::new(["drill"]);
        schedule
            .push(ItemSpec::new("A", 0).duration("drill", 3))
            .push(ItemSpec::new("B", 1).duration("drill", 3));
        let mut scene = Scene::new();
        scene.add_source("S", schedule).unwrap();
        scene
            .add_processor("P", ProcessorConfig::new("drill"))
            .unwrap();
        scene.add_sink("K").unwrap();
        scene.connect("S", "P").unwrap();
        scene.connect("P", "K").unwrap();
        scene
    }

    #[test]
    fn healthy_at_every_decision_point() {
        let mut scene = scene();
        assert!(check_invariants(&scene).is_empty());
        let mut outcome = scene.run_manual().unwrap();
        while let Some(entity) = outcome.entity().map(str::to_string) {
            assert_eq!(check_invariants(&scene), vec![]);
            let decision = fifo(&scene, &entity, outcome.time());
            outcome = scene.resume(decision).unwrap();
        }
        assert!(check_invariants(&scene).is_empty());
    }

    #[test]
    fn identical_runs_do_not_differ() {
        let mut a = scene();
        let mut b = scene();
        a.run(fifo).unwrap();
        b.run(fifo).unwrap();
        assert!(diff_scenes(&a, &b).is_identical);
    }

    #[test]
    fn diverging_runs_are_reported() {
        let mut a = scene();
        let b = scene();
        a.run_manual().unwrap();
        a.resume(Decision::new("A", "P")).unwrap();
        let diff = diff_scenes(&a, &b);
        assert!(!diff.is_identical);
        assert!(diff.stations.contains(&StationDiff::Holdings {
            entity: "S".into()
        }));
        assert!(diff.stations.contains(&StationDiff::Holdings {
            entity: "P".into()
        }));
    }

    #[test]
    fn missing_stations_are_reported() {
        let a = scene();
        let mut b = scene();
        b.add_sink("K2").unwrap();
        let diff = diff_scenes(&a, &b);
        assert_eq!(diff.stations, vec![StationDiff::OnlyInB("K2".into())]);
    }
}
