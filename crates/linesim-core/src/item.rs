use crate::fixed::Ticks;
use crate::id::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Violations of the per-item process state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("item {item} has no record for process {process}")]
    UnknownProcess { item: String, process: String },
    #[error("item {item}: process {process} is {state:?}, expected Pending")]
    NotPending {
        item: String,
        process: String,
        state: ProcessState,
    },
    #[error("item {item}: process {process} is {state:?}, expected InProgress")]
    NotInProgress {
        item: String,
        process: String,
        state: ProcessState,
    },
    #[error("item {item} is already in progress on {active}")]
    AlreadyBusy { item: String, active: String },
    #[error("item {item}: finish time {finish} precedes start time {start}")]
    FinishBeforeStart {
        item: String,
        start: Ticks,
        finish: Ticks,
    },
}

// ---------------------------------------------------------------------------
// Process records
// ---------------------------------------------------------------------------

/// Lifecycle of one process on one item. Transitions are one-directional:
/// `Pending -> InProgress -> Done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    #[default]
    Pending,
    InProgress,
    Done,
}

/// Where (and for how long) a process runs. The duration is fixed by the
/// workload schedule; station and position are filled in on `start_process`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedStation {
    /// Name of the processor that picked the item up.
    pub station: Option<String>,
    /// Pre-set service duration.
    pub duration: Ticks,
    /// Occupied position index inside the processor.
    pub position: Option<Position>,
}

/// Timing and state of a single named process on an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub state: ProcessState,
    pub arrival_time: Option<Ticks>,
    pub finish_time: Option<Ticks>,
    pub actual_duration: Option<Ticks>,
    pub assigned: AssignedStation,
}

impl ProcessRecord {
    /// A pending record with the given service duration.
    pub fn new(duration: Ticks) -> Self {
        Self {
            assigned: AssignedStation {
                duration,
                ..AssignedStation::default()
            },
            ..Self::default()
        }
    }

    /// Scheduled completion time while the process is running. Saturates at
    /// `Ticks::MAX`; validated schedules never reach it.
    pub fn completes_at(&self) -> Option<Ticks> {
        match (self.state, self.arrival_time) {
            (ProcessState::InProgress, Some(start)) => {
                Some(start.saturating_add(self.assigned.duration))
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A unit of work flowing through the network. Exactly one entity owns an
/// item at a time; ownership moves on `flow_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Optional static type tag, used for per-type emission counters.
    #[serde(default)]
    pub item_type: Option<String>,
    /// Scheduled release time at the source.
    pub arrival: Ticks,
    /// Per-process records keyed by process name.
    pub processes: BTreeMap<String, ProcessRecord>,
    /// Terminal completion time stamped by a sink.
    #[serde(default)]
    pub done_time: Option<Ticks>,
}

impl Item {
    pub fn new(name: impl Into<String>, item_type: Option<String>, arrival: Ticks) -> Self {
        Self {
            name: name.into(),
            item_type,
            arrival,
            processes: BTreeMap::new(),
            done_time: None,
        }
    }

    /// Builder-style: add a pending record for `process`.
    pub fn with_process(mut self, process: impl Into<String>, duration: Ticks) -> Self {
        self.processes.insert(process.into(), ProcessRecord::new(duration));
        self
    }

    pub fn record(&self, process: &str) -> Option<&ProcessRecord> {
        self.processes.get(process)
    }

    /// The process currently running on this item, if any. At most one.
    pub fn active_process(&self) -> Option<(&str, &ProcessRecord)> {
        self.processes
            .iter()
            .find(|(_, r)| r.state == ProcessState::InProgress)
            .map(|(name, r)| (name.as_str(), r))
    }

    /// Whether `process` has reached `Done`.
    pub fn is_done(&self, process: &str) -> bool {
        self.record(process)
            .is_some_and(|r| r.state == ProcessState::Done)
    }

    /// Start `process` at `now` on `station`/`position`. Returns the service
    /// duration, so the caller can schedule the completion.
    pub fn start_process(
        &mut self,
        process: &str,
        now: Ticks,
        station: &str,
        position: Position,
    ) -> Result<Ticks, ItemError> {
        if let Some((active, _)) = self.active_process() {
            return Err(ItemError::AlreadyBusy {
                item: self.name.clone(),
                active: active.to_string(),
            });
        }
        let name = &self.name;
        let record = self
            .processes
            .get_mut(process)
            .ok_or_else(|| ItemError::UnknownProcess {
                item: name.clone(),
                process: process.to_string(),
            })?;
        if record.state != ProcessState::Pending {
            return Err(ItemError::NotPending {
                item: name.clone(),
                process: process.to_string(),
                state: record.state,
            });
        }
        record.state = ProcessState::InProgress;
        record.arrival_time = Some(now);
        record.assigned.station = Some(station.to_string());
        record.assigned.position = Some(position);
        Ok(record.assigned.duration)
    }

    /// Finish `process` at `now`.
    pub fn done_process(&mut self, process: &str, now: Ticks) -> Result<(), ItemError> {
        let name = &self.name;
        let record = self
            .processes
            .get_mut(process)
            .ok_or_else(|| ItemError::UnknownProcess {
                item: name.clone(),
                process: process.to_string(),
            })?;
        if record.state != ProcessState::InProgress {
            return Err(ItemError::NotInProgress {
                item: name.clone(),
                process: process.to_string(),
                state: record.state,
            });
        }
        let start = record.arrival_time.unwrap_or(now);
        if now < start {
            return Err(ItemError::FinishBeforeStart {
                item: name.clone(),
                start,
                finish: now,
            });
        }
        record.state = ProcessState::Done;
        record.finish_time = Some(now);
        record.actual_duration = Some(now - start);
        Ok(())
    }

    /// Stamp terminal completion. Called once, by the absorbing sink.
    pub fn mark_completed(&mut self, now: Ticks) {
        self.done_time = Some(now);
    }

    /// Time from source release to sink absorption.
    pub fn flow_time(&self) -> Option<Ticks> {
        self.done_time.map(|done| done.saturating_sub(self.arrival))
    }
}
