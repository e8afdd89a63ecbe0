use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::race::{GroupId, TimeValue};

/// Persisted shape of a race, one document per race.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaceEntity {
    /// Primary key of the race.
    pub id: Uuid,
    /// Group the race belongs to.
    pub group: GroupId,
    /// Display label.
    pub name: String,
    /// Laps each student has to complete.
    pub laps: u32,
    /// Lifecycle status, including its timing data.
    pub status: RaceStatusEntity,
    /// Lap entries per student, in registration order.
    #[serde(default)]
    pub recorded_times: IndexMap<String, Vec<TimeValue>>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the race was written.
    pub updated_at: SystemTime,
}

/// Persisted race status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaceStatusEntity {
    /// Never started.
    Created,
    /// Countdown in progress.
    Armed {
        /// Seconds left before the start.
        countdown_remaining: u32,
    },
    /// Clock running.
    Running {
        /// Effective start instant (UNIX epoch milliseconds).
        start_time_ms: u64,
    },
    /// Clock stopped.
    Paused {
        /// Elapsed race time when paused.
        paused_offset_ms: u64,
    },
    /// Terminal state.
    Ended,
}
