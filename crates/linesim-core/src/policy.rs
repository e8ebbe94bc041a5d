//! Ready-made scheduling rules.
//!
//! Each rule picks an item from [`Scene::ready_items`] and a destination from
//! [`Scene::ready_targets`]. When the scene offers nothing the rule returns an
//! empty decision, which the scene rejects as a protocol error.

use crate::fixed::Ticks;
use crate::rng::SimRng;
use crate::scene::Scene;
use crate::sim::Decision;

fn decide(item: Option<&str>, target: Option<&str>) -> Decision {
    Decision::new(item.unwrap_or_default(), target.unwrap_or_default())
}

/// Oldest ready item to the first free downstream (by port).
pub fn fifo(scene: &Scene, entity: &str, _now: Ticks) -> Decision {
    let items = scene.ready_items(entity);
    let targets = scene.ready_targets(entity);
    decide(
        items.first().map(|i| i.name.as_str()),
        targets.first().copied(),
    )
}

/// Newest ready item to the first free downstream (by port).
pub fn lifo(scene: &Scene, entity: &str, _now: Ticks) -> Decision {
    let items = scene.ready_items(entity);
    let targets = scene.ready_targets(entity);
    decide(
        items.last().map(|i| i.name.as_str()),
        targets.first().copied(),
    )
}

/// Uniformly random item and free downstream, from a seeded generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomPolicy {
    rng: SimRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SimRng::new(seed),
        }
    }

    pub fn decide(&mut self, scene: &Scene, entity: &str, _now: Ticks) -> Decision {
        let items = scene.ready_items(entity);
        let targets = scene.ready_targets(entity);
        let item = self.rng.pick(&items).map(|i| i.name.as_str());
        let target = self.rng.pick(&targets).copied();
        decide(item, target)
    }

    /// Borrow as a rule for [`Scene::run`].
    pub fn rule(&mut self) -> impl FnMut(&Scene, &str, Ticks) -> Decision + '_ {
        move |scene: &Scene, entity: &str, now: Ticks| self.decide(scene, entity, now)
    }
}
