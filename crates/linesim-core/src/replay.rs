//! Decision recording and playback.
//!
//! A scene records every resolved decision together with the entity and time
//! it answered and a state hash taken right after it was applied. Replaying
//! the log against a freshly built scene with the same topology and schedule
//! reproduces the run exactly, or reports the first point of divergence.

use crate::fixed::Ticks;
use crate::scene::{Scene, SceneError};
use crate::sim::{Decision, RunOutcome};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error(
        "decision {index}: recorded {expected_entity}@{expected_time}, scene reached {actual:?}"
    )]
    Diverged {
        index: usize,
        expected_entity: String,
        expected_time: Ticks,
        actual: RunOutcome,
    },
    #[error("decision {index}: state hash {actual:#x} does not match recorded {expected:#x}")]
    HashMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

// ---------------------------------------------------------------------------
// DecisionLog
// ---------------------------------------------------------------------------

/// One resolved decision.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecisionRecord {
    /// Entity that was awaiting the decision.
    pub entity: String,
    pub time: Ticks,
    pub decision: Decision,
    /// `Scene::state_hash` right after the decision was applied.
    pub hash: Option<u64>,
}

/// Ordered record of every decision a scene resolved since its last clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecisionLog {
    pub records: Vec<DecisionRecord>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serialize the log to bytes (using bitcode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplayError> {
        bitcode::serialize(self).map_err(|e| ReplayError::Encode(e.to_string()))
    }

    /// Deserialize a log from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ReplayError> {
        bitcode::deserialize(data).map_err(|e| ReplayError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Drive `scene` through `log` in manual mode, checking at every step that
/// the scene asks the same entity at the same time as the recording did.
/// Returns the outcome after the last recorded decision.
pub fn replay(scene: &mut Scene, log: &DecisionLog) -> Result<RunOutcome, ReplayError> {
    let mut outcome = scene.run_manual()?;
    for (index, record) in log.iter().enumerate() {
        let matches = matches!(
            &outcome,
            RunOutcome::Decision { entity, time }
                if *entity == record.entity && *time == record.time
        );
        if !matches {
            return Err(ReplayError::Diverged {
                index,
                expected_entity: record.entity.clone(),
                expected_time: record.time,
                actual: outcome,
            });
        }
        outcome = scene.resume(record.decision.clone())?;
        let replayed = scene.decision_log().records.last().and_then(|r| r.hash);
        if let (Some(expected), Some(actual)) = (record.hash, replayed)
            && actual != expected
        {
            return Err(ReplayError::HashMismatch {
                index,
                expected,
                actual,
            });
        }
    }
    log::debug!("replayed {} decisions, ended at {:?}", log.len(), outcome);
    Ok(outcome)
}
