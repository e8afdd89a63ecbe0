use serde::Serialize;
use utoipa::ToSchema;

use crate::state::race::RaceStatus;

/// Race status as exposed to clients.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VisibleRaceStatus {
    /// Created, never started.
    Created,
    /// Countdown running.
    Armed {
        /// Seconds left before the start.
        #[serde(rename = "countdownRemaining")]
        countdown_remaining: u32,
    },
    /// Clock running.
    Running {
        /// Effective start instant in UNIX epoch milliseconds.
        #[serde(rename = "startTimeMs")]
        start_time_ms: u64,
    },
    /// Clock stopped.
    Paused {
        /// Elapsed race time in milliseconds.
        #[serde(rename = "pausedOffsetMs")]
        paused_offset_ms: u64,
    },
    /// Race over.
    Ended,
}

impl From<&RaceStatus> for VisibleRaceStatus {
    fn from(status: &RaceStatus) -> Self {
        match *status {
            RaceStatus::Created => Self::Created,
            RaceStatus::Armed { remaining_secs } => Self::Armed {
                countdown_remaining: remaining_secs,
            },
            RaceStatus::Running { started_at_ms } => Self::Running {
                start_time_ms: started_at_ms,
            },
            RaceStatus::Paused { elapsed_ms } => Self::Paused {
                paused_offset_ms: elapsed_ms,
            },
            RaceStatus::Ended => Self::Ended,
        }
    }
}
