//! Chronological event log consumed by observers.
//!
//! The scene appends events as items are created, moved, processed and
//! absorbed. Observers drain the log between calls into the scene; nothing
//! in the log is read back by the simulation.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventLog::suppress`]; suppressed kinds
//! are counted but never stored.

use crate::fixed::Ticks;
use crate::id::Position;
use crate::station::StationKind;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the time at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // -- Items --
    ItemCreated {
        source: String,
        item: String,
        item_type: Option<String>,
        arrival: Ticks,
        time: Ticks,
    },
    ItemTransferred {
        from: String,
        from_kind: StationKind,
        from_position: Position,
        to: String,
        to_kind: StationKind,
        to_position: Position,
        item: String,
        time: Ticks,
    },
    ItemAbsorbed {
        sink: String,
        item: String,
        item_type: Option<String>,
        arrival: Ticks,
        time: Ticks,
    },

    // -- Processing --
    ProcessStarted {
        processor: String,
        process: String,
        item: String,
        position: Position,
        stations: usize,
        duration: Ticks,
        time: Ticks,
    },
    ProcessFinished {
        processor: String,
        process: String,
        item: String,
        position: Position,
        time: Ticks,
    },

    // -- Scheduling --
    DecisionRequested {
        entity: String,
        ready: usize,
        time: Ticks,
    },
    TimeAdvanced {
        from: Ticks,
        to: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ItemCreated,
    ItemTransferred,
    ItemAbsorbed,
    ProcessStarted,
    ProcessFinished,
    DecisionRequested,
    TimeAdvanced,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 7;

impl Event {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ItemCreated { .. } => EventKind::ItemCreated,
            Event::ItemTransferred { .. } => EventKind::ItemTransferred,
            Event::ItemAbsorbed { .. } => EventKind::ItemAbsorbed,
            Event::ProcessStarted { .. } => EventKind::ProcessStarted,
            Event::ProcessFinished { .. } => EventKind::ProcessFinished,
            Event::DecisionRequested { .. } => EventKind::DecisionRequested,
            Event::TimeAdvanced { .. } => EventKind::TimeAdvanced,
        }
    }

    /// Simulated time the event refers to.
    pub fn time(&self) -> Ticks {
        match self {
            Event::ItemCreated { time, .. }
            | Event::ItemTransferred { time, .. }
            | Event::ItemAbsorbed { time, .. }
            | Event::ProcessStarted { time, .. }
            | Event::ProcessFinished { time, .. }
            | Event::DecisionRequested { time, .. } => *time,
            Event::TimeAdvanced { to, .. } => *to,
        }
    }
}

impl EventKind {
    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only, drainable event store with per-kind suppression.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    suppressed: [bool; EVENT_KIND_COUNT],
    emitted: [u64; EVENT_KIND_COUNT],
    disabled: bool,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that stores nothing.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.events.retain(|e| e.kind() != kind);
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event unless its kind is suppressed or the log is disabled.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        self.emitted[idx] += 1;
        if self.disabled || self.suppressed[idx] {
            return;
        }
        self.events.push(event);
    }

    /// Events emitted for `kind`, stored or not.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.emitted[kind.index()]
    }

    /// Stored events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all stored events, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Drop stored events and counters. Suppression settings are kept.
    pub fn clear(&mut self) {
        self.events.clear();
        self.emitted = [0; EVENT_KIND_COUNT];
    }
}

// ===========================================================================
// Tests
// ===========================================================================
