use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{RaceEntity, RaceStatusEntity};

/// Sentinel written in place of a lap time once a student is injured.
pub const INJURED: &str = "Injured";

/// Opaque identifier of a race instance.
pub type RaceId = Uuid;

/// Identifier of a race category (age group) declared in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Wrap a raw group identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A timing value: either elapsed seconds or the injury sentinel.
///
/// Lap entries and final times share this shape. On the wire a value is a
/// bare JSON number or the string `"Injured"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    /// Elapsed seconds.
    Seconds(f64),
    /// The student left the race injured.
    Injured,
}

impl TimeValue {
    /// Whether this value is the injury sentinel.
    pub fn is_injured(&self) -> bool {
        matches!(self, TimeValue::Injured)
    }

    /// Numeric seconds, if any.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            TimeValue::Seconds(value) => Some(*value),
            TimeValue::Injured => None,
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Seconds(value) => write!(f, "{value}s"),
            TimeValue::Injured => f.write_str(INJURED),
        }
    }
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeValue::Seconds(value) => serializer.serialize_f64(*value),
            TimeValue::Injured => serializer.serialize_str(INJURED),
        }
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Marker(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(value) => Ok(TimeValue::Seconds(value)),
            Raw::Marker(marker) if marker == INJURED => Ok(TimeValue::Injured),
            Raw::Marker(other) => Err(D::Error::custom(format!(
                "expected a number of seconds or `{INJURED}`, got `{other}`"
            ))),
        }
    }
}

/// Lifecycle status of a race. Exactly one applies at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceStatus {
    /// Created but never started.
    Created,
    /// Counting down before the start.
    Armed {
        /// Seconds left before the race starts.
        remaining_secs: u32,
    },
    /// Clock running since `started_at_ms` (UNIX epoch milliseconds).
    Running {
        /// Effective start instant, shifted forward by any pauses.
        started_at_ms: u64,
    },
    /// Clock stopped with `elapsed_ms` already on it.
    Paused {
        /// Elapsed race time at the moment of pausing.
        elapsed_ms: u64,
    },
    /// Terminal state.
    Ended,
}

impl RaceStatus {
    /// Short lowercase label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            RaceStatus::Created => "created",
            RaceStatus::Armed { .. } => "armed",
            RaceStatus::Running { .. } => "running",
            RaceStatus::Paused { .. } => "paused",
            RaceStatus::Ended => "ended",
        }
    }
}

/// Runtime representation of one race and its recorded laps.
#[derive(Debug, Clone, PartialEq)]
pub struct Race {
    /// Primary key of the race.
    pub id: RaceId,
    /// Group this race belongs to.
    pub group: GroupId,
    /// Display label.
    pub name: String,
    /// Number of laps each student has to complete.
    pub laps_required: u32,
    /// Current lifecycle status.
    pub status: RaceStatus,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the race was mutated.
    pub updated_at: SystemTime,
    recorded_times: IndexMap<String, Vec<TimeValue>>,
    final_times: IndexMap<String, TimeValue>,
}

impl Race {
    /// Build a fresh race in the `Created` status with no recorded laps.
    pub fn new(group: GroupId, name: String, laps_required: u32) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            group,
            name,
            laps_required,
            status: RaceStatus::Created,
            created_at: now,
            updated_at: now,
            recorded_times: IndexMap::new(),
            final_times: IndexMap::new(),
        }
    }

    /// Lap entries per student, in registration order.
    pub fn recorded_times(&self) -> &IndexMap<String, Vec<TimeValue>> {
        &self.recorded_times
    }

    /// Derived final time per student.
    pub fn final_times(&self) -> &IndexMap<String, TimeValue> {
        &self.final_times
    }

    /// Laps recorded for `student` (empty when unknown).
    pub fn laps_of(&self, student: &str) -> &[TimeValue] {
        self.recorded_times
            .get(student)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `student` has an injury entry.
    pub fn is_injured(&self, student: &str) -> bool {
        self.laps_of(student).iter().any(TimeValue::is_injured)
    }

    /// Whether `student` has neither finished every lap nor been injured.
    pub fn is_incomplete(&self, student: &str) -> bool {
        let laps = self.laps_of(student);
        !laps.iter().any(TimeValue::is_injured) && laps.len() < self.laps_required as usize
    }

    /// Elapsed race time in milliseconds at `now_ms`.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        match self.status {
            RaceStatus::Running { started_at_ms } => now_ms.saturating_sub(started_at_ms),
            RaceStatus::Paused { elapsed_ms } => elapsed_ms,
            _ => 0,
        }
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }

    pub(crate) fn push_lap(&mut self, student: &str, value: TimeValue) {
        self.recorded_times
            .entry(student.to_string())
            .or_default()
            .push(value);
        self.recompute_final_time(student);
    }

    pub(crate) fn replace_last_lap(&mut self, student: &str, value: TimeValue) -> bool {
        let replaced = match self
            .recorded_times
            .get_mut(student)
            .and_then(|laps| laps.last_mut())
        {
            Some(last) => {
                *last = value;
                true
            }
            None => false,
        };
        if replaced {
            self.recompute_final_time(student);
        }
        replaced
    }

    pub(crate) fn pop_last_lap(&mut self, student: &str) -> Option<TimeValue> {
        let popped = self
            .recorded_times
            .get_mut(student)
            .and_then(|laps| laps.pop());
        if popped.is_some() {
            self.recompute_final_time(student);
        }
        popped
    }

    pub(crate) fn take_laps(&mut self, student: &str) -> Option<Vec<TimeValue>> {
        let laps = self.recorded_times.shift_remove(student);
        self.final_times.shift_remove(student);
        laps
    }

    pub(crate) fn extend_laps(&mut self, student: &str, laps: impl IntoIterator<Item = TimeValue>) {
        self.recorded_times
            .entry(student.to_string())
            .or_default()
            .extend(laps);
        self.recompute_final_time(student);
    }

    fn recompute_final_time(&mut self, student: &str) {
        match self.recorded_times.get(student) {
            Some(laps) => {
                self.final_times
                    .insert(student.to_string(), final_time(laps));
            }
            None => {
                self.final_times.shift_remove(student);
            }
        }
    }

    fn recompute_all_final_times(&mut self) {
        self.final_times = self
            .recorded_times
            .iter()
            .map(|(student, laps)| (student.clone(), final_time(laps)))
            .collect();
    }
}

/// Derive the final time of a lap sequence: `Injured` when any entry is the
/// sentinel, otherwise the sum of the entries rounded to milliseconds.
pub fn final_time(laps: &[TimeValue]) -> TimeValue {
    if laps.iter().any(TimeValue::is_injured) {
        return TimeValue::Injured;
    }
    let sum: f64 = laps.iter().filter_map(TimeValue::seconds).sum();
    TimeValue::Seconds(round_millis(sum))
}

/// Round seconds to 3 decimal places.
pub fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Current wall-clock time as UNIX epoch milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl From<RaceStatusEntity> for RaceStatus {
    fn from(value: RaceStatusEntity) -> Self {
        match value {
            RaceStatusEntity::Created => RaceStatus::Created,
            RaceStatusEntity::Armed {
                countdown_remaining,
            } => RaceStatus::Armed {
                remaining_secs: countdown_remaining,
            },
            RaceStatusEntity::Running { start_time_ms } => RaceStatus::Running {
                started_at_ms: start_time_ms,
            },
            RaceStatusEntity::Paused { paused_offset_ms } => RaceStatus::Paused {
                elapsed_ms: paused_offset_ms,
            },
            RaceStatusEntity::Ended => RaceStatus::Ended,
        }
    }
}

impl From<RaceStatus> for RaceStatusEntity {
    fn from(value: RaceStatus) -> Self {
        match value {
            RaceStatus::Created => RaceStatusEntity::Created,
            RaceStatus::Armed { remaining_secs } => RaceStatusEntity::Armed {
                countdown_remaining: remaining_secs,
            },
            RaceStatus::Running { started_at_ms } => RaceStatusEntity::Running {
                start_time_ms: started_at_ms,
            },
            RaceStatus::Paused { elapsed_ms } => RaceStatusEntity::Paused {
                paused_offset_ms: elapsed_ms,
            },
            RaceStatus::Ended => RaceStatusEntity::Ended,
        }
    }
}

impl From<RaceEntity> for Race {
    fn from(value: RaceEntity) -> Self {
        let mut race = Self {
            id: value.id,
            group: value.group,
            name: value.name,
            laps_required: value.laps,
            status: value.status.into(),
            created_at: value.created_at,
            updated_at: value.updated_at,
            recorded_times: value.recorded_times,
            final_times: IndexMap::new(),
        };
        race.recompute_all_final_times();
        race
    }
}

impl From<&Race> for RaceEntity {
    fn from(value: &Race) -> Self {
        Self {
            id: value.id,
            group: value.group.clone(),
            name: value.name.clone(),
            laps: value.laps_required,
            status: value.status.into(),
            recorded_times: value.recorded_times.clone(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}
