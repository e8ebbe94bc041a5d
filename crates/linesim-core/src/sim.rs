//! Decision and run-outcome types, plus the state hash used for replay
//! checks.

use crate::fixed::Ticks;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Which held item moves next, and to which downstream entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    pub item: String,
    pub target: String,
}

impl Decision {
    pub fn new(item: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            target: target.into(),
        }
    }
}

/// Where a call into the scene stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// `entity` has at least one item ready to move at `time`; resume with a
    /// [`Decision`].
    Decision { entity: String, time: Ticks },
    /// Every non-sink entity is empty.
    Done { time: Ticks },
}

impl RunOutcome {
    pub fn time(&self) -> Ticks {
        match self {
            RunOutcome::Decision { time, .. } | RunOutcome::Done { time } => *time,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunOutcome::Done { .. })
    }

    /// The entity awaiting a decision, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            RunOutcome::Decision { entity, .. } => Some(entity),
            RunOutcome::Done { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of scene state for replay comparison.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Length-prefixed, so `("ab", "c")` and `("a", "bc")` differ.
    pub fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write(s.as_bytes());
    }

    pub fn write_opt_u64(&mut self, v: Option<u64>) {
        match v {
            Some(v) => {
                self.write(&[1]);
                self.write_u64(v);
            }
            None => self.write(&[0]),
        }
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
