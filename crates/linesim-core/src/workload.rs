//! Workload schedules: which items a source releases, when, and how long
//! each named process takes on each item.
//!
//! Schedules are validated before a source is built from them, so data
//! errors surface at construction and never inside the run loop.

use crate::fixed::Ticks;
use crate::item::Item;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Malformed workload data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("process list is empty")]
    EmptyProcessList,
    #[error("process {0} is declared twice")]
    DuplicateProcess(String),
    #[error("item {0} is declared twice")]
    DuplicateItem(String),
    #[error("item {item} has no duration for process {process}")]
    MissingDuration { item: String, process: String },
    #[error("item {item} has a duration for undeclared process {process}")]
    UndeclaredProcess { item: String, process: String },
    #[error("item {item} arrives at {arrival}, before the previous item at {previous}")]
    NonMonotonicArrival {
        item: String,
        arrival: Ticks,
        previous: Ticks,
    },
    #[error("latest arrival plus total work exceeds the tick range (item {0})")]
    DurationOverflow(String),
}

/// One item's row in the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    pub arrival: Ticks,
    #[serde(default)]
    pub item_type: Option<String>,
    /// Duration per process name.
    pub durations: BTreeMap<String, Ticks>,
}

impl ItemSpec {
    pub fn new(name: impl Into<String>, arrival: Ticks) -> Self {
        Self {
            name: name.into(),
            arrival,
            item_type: None,
            durations: BTreeMap::new(),
        }
    }

    pub fn typed(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn duration(mut self, process: impl Into<String>, ticks: Ticks) -> Self {
        self.durations.insert(process.into(), ticks);
        self
    }

    /// Materialize the item with one pending record per declared process.
    pub fn to_item(&self, process_list: &[String]) -> Item {
        let mut item = Item::new(self.name.clone(), self.item_type.clone(), self.arrival);
        for process in process_list {
            if let Some(&ticks) = self.durations.get(process) {
                item = item.with_process(process.clone(), ticks);
            }
        }
        item
    }
}

/// The full input schedule consumed by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub process_list: Vec<String>,
    pub items: Vec<ItemSpec>,
}

impl Schedule {
    pub fn new<I, S>(process_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            process_list: process_list.into_iter().map(Into::into).collect(),
            items: Vec::new(),
        }
    }

    /// Append an item without ordering constraints.
    pub fn push(&mut self, spec: ItemSpec) -> &mut Self {
        self.items.push(spec);
        self
    }

    /// Append an item whose arrival must not precede the last one.
    pub fn push_ordered(&mut self, spec: ItemSpec) -> Result<&mut Self, ScheduleError> {
        if let Some(last) = self.items.last()
            && spec.arrival < last.arrival
        {
            return Err(ScheduleError::NonMonotonicArrival {
                item: spec.name,
                arrival: spec.arrival,
                previous: last.arrival,
            });
        }
        self.items.push(spec);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn declares(&self, process: &str) -> bool {
        self.process_list.iter().any(|p| p == process)
    }

    /// Check structural consistency.
    ///
    /// Arrivals must be non-decreasing in schedule order, and the latest
    /// arrival plus every duration in the schedule must fit in [`Ticks`].
    /// That sum bounds the makespan of any run, so completion times never
    /// overflow.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.process_list.is_empty() {
            return Err(ScheduleError::EmptyProcessList);
        }
        let mut declared = BTreeSet::new();
        for process in &self.process_list {
            if !declared.insert(process.as_str()) {
                return Err(ScheduleError::DuplicateProcess(process.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        let mut previous: Option<Ticks> = None;
        let mut horizon: Ticks = 0;
        for spec in &self.items {
            if !seen.insert(spec.name.as_str()) {
                return Err(ScheduleError::DuplicateItem(spec.name.clone()));
            }
            if let Some(previous) = previous
                && spec.arrival < previous
            {
                return Err(ScheduleError::NonMonotonicArrival {
                    item: spec.name.clone(),
                    arrival: spec.arrival,
                    previous,
                });
            }
            previous = Some(spec.arrival);
            horizon = spec
                .durations
                .values()
                .try_fold(horizon.max(spec.arrival), |acc, &d| acc.checked_add(d))
                .ok_or_else(|| ScheduleError::DurationOverflow(spec.name.clone()))?;
            for process in &self.process_list {
                if !spec.durations.contains_key(process) {
                    return Err(ScheduleError::MissingDuration {
                        item: spec.name.clone(),
                        process: process.clone(),
                    });
                }
            }
            if let Some(extra) = spec.durations.keys().find(|p| !declared.contains(p.as_str())) {
                return Err(ScheduleError::UndeclaredProcess {
                    item: spec.name.clone(),
                    process: extra.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validate and materialize all items.
    pub fn build_items(&self) -> Result<Vec<Item>, ScheduleError> {
        self.validate()?;
        Ok(self
            .items
            .iter()
            .map(|spec| spec.to_item(&self.process_list))
            .collect())
    }
}
