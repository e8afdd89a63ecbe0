use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::race::{GroupId, TimeValue};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE and WebSocket fan-out.
pub struct ServerEvent {
    /// Event name (`race_data`, `time_registered`, ...).
    pub event: String,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl ServerEvent {
    /// Build an event from an already encoded payload.
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Convenience wrapper that serialises `payload` into the event body.
    pub fn json<T>(event: impl Into<String>, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }

    /// Payload rendered for the SSE `data` field.
    pub fn data(&self) -> String {
        self.payload.to_string()
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when a lap or an injury was recorded.
pub struct TimeRegisteredEvent {
    /// Group of the race.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Race the lap belongs to.
    pub race_id: Uuid,
    /// Student concerned.
    pub student: String,
    /// Recorded value: seconds or `"Injured"`.
    #[schema(value_type = Object)]
    pub time: TimeValue,
    /// Resulting lap sequence of the student.
    #[schema(value_type = Vec<Object>)]
    pub laps: Vec<TimeValue>,
    /// Resulting final time of the student.
    #[schema(value_type = Object)]
    pub final_time: TimeValue,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when the last lap of a student was edited.
pub struct TimeEditedEvent {
    /// Group of the race.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Race the lap belongs to.
    pub race_id: Uuid,
    /// Student concerned.
    pub student: String,
    /// Value now stored as last lap.
    #[schema(value_type = Object)]
    pub new_time: TimeValue,
    /// Resulting lap sequence of the student.
    #[schema(value_type = Vec<Object>)]
    pub laps: Vec<TimeValue>,
    /// Resulting final time of the student.
    #[schema(value_type = Object)]
    pub final_time: TimeValue,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when laps moved from one student to another.
pub struct StudentReassignedEvent {
    /// Group of the race.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Race concerned.
    pub race_id: Uuid,
    /// Student the laps were taken from.
    pub old_student: String,
    /// Student the laps were given to.
    pub new_student: String,
    /// Single value given instead of the whole sequence, if any.
    #[schema(value_type = Option<Object>)]
    pub new_time: Option<TimeValue>,
    /// Resulting lap sequence of the new student.
    #[schema(value_type = Vec<Object>)]
    pub laps: Vec<TimeValue>,
    /// Resulting final time of the new student.
    #[schema(value_type = Object)]
    pub final_time: TimeValue,
}
