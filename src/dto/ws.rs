use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        admin::{
            CommandResponse, CreateRaceRequest, EditTimeRequest, ReassignRequest,
            RegisterLapRequest, StartRaceRequest, StudentRequest,
        },
        race::RaceDataSnapshot,
    },
    state::race::GroupId,
};

#[derive(Debug, Deserialize)]
/// Messages accepted from WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Unlock admin commands for this connection.
    Login {
        /// Admin token.
        token: String,
    },
    /// Latency probe, echoed back as `pong_check`.
    PingCheck {
        /// Client timestamp, returned untouched.
        #[serde(default, rename = "sentAt")]
        sent_at: Option<u64>,
    },
    /// Create a race and make it the group's active race.
    CreateRace {
        /// Target group.
        group: GroupId,
        /// Race parameters.
        #[serde(flatten)]
        request: CreateRaceRequest,
    },
    /// Repoint the group's active race.
    SelectRace {
        /// Target group.
        group: GroupId,
        /// Race to activate.
        #[serde(rename = "raceId")]
        race_id: Uuid,
    },
    /// Start or resume the active race.
    StartRace {
        /// Target group.
        group: GroupId,
        /// Countdown options.
        #[serde(flatten)]
        request: StartRaceRequest,
    },
    /// Pause the active race.
    PauseRace {
        /// Target group.
        group: GroupId,
    },
    /// End the active race.
    EndRace {
        /// Target group.
        group: GroupId,
    },
    /// Record a lap.
    RegisterLap {
        /// Target group.
        group: GroupId,
        /// Lap details.
        #[serde(flatten)]
        request: RegisterLapRequest,
    },
    /// Mark a student as injured.
    InjureStudent {
        /// Target group.
        group: GroupId,
        /// Student concerned.
        #[serde(flatten)]
        request: StudentRequest,
    },
    /// Move laps between students.
    ReassignStudent {
        /// Target group.
        group: GroupId,
        /// Reassignment details.
        #[serde(flatten)]
        request: ReassignRequest,
    },
    /// Overwrite the last lap of a student.
    EditTime {
        /// Target group.
        group: GroupId,
        /// Edit details.
        #[serde(flatten)]
        request: EditTimeRequest,
    },
    /// Drop the last lap of a student.
    RemoveLap {
        /// Target group.
        group: GroupId,
        /// Student concerned.
        #[serde(flatten)]
        request: StudentRequest,
    },
}

impl ClientMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, ClientMessageError> {
        let message: Self = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    /// Message name, as sent in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Login { .. } => "login",
            ClientMessage::PingCheck { .. } => "ping_check",
            ClientMessage::CreateRace { .. } => "create_race",
            ClientMessage::SelectRace { .. } => "select_race",
            ClientMessage::StartRace { .. } => "start_race",
            ClientMessage::PauseRace { .. } => "pause_race",
            ClientMessage::EndRace { .. } => "end_race",
            ClientMessage::RegisterLap { .. } => "register_lap",
            ClientMessage::InjureStudent { .. } => "injure_student",
            ClientMessage::ReassignStudent { .. } => "reassign_student",
            ClientMessage::EditTime { .. } => "edit_time",
            ClientMessage::RemoveLap { .. } => "remove_lap",
        }
    }

    /// Whether the message needs a logged-in admin connection.
    pub fn requires_admin(&self) -> bool {
        !matches!(
            self,
            ClientMessage::Login { .. }
                | ClientMessage::PingCheck { .. }
                | ClientMessage::RegisterLap { .. }
                | ClientMessage::RemoveLap { .. }
        )
    }
}

impl Validate for ClientMessage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ClientMessage::CreateRace { request, .. } => request.validate(),
            ClientMessage::StartRace { request, .. } => request.validate(),
            ClientMessage::RegisterLap { request, .. } => request.validate(),
            ClientMessage::InjureStudent { request, .. }
            | ClientMessage::RemoveLap { request, .. } => request.validate(),
            ClientMessage::ReassignStudent { request, .. } => request.validate(),
            ClientMessage::EditTime { request, .. } => request.validate(),
            ClientMessage::Login { .. }
            | ClientMessage::PingCheck { .. }
            | ClientMessage::SelectRace { .. }
            | ClientMessage::PauseRace { .. }
            | ClientMessage::EndRace { .. } => Ok(()),
        }
    }
}

/// Failure to decode a client frame.
#[derive(Debug, thiserror::Error)]
pub enum ClientMessageError {
    /// Not a known JSON message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Known message with invalid fields.
    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Serialize)]
/// Messages sent to WebSocket clients in reply to their own frames.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect.
    InitState {
        /// Current state of every group.
        snapshot: RaceDataSnapshot,
    },
    /// Outcome of a race command.
    CommandResult {
        /// Name of the command.
        request: String,
        /// Command outcome.
        #[serde(flatten)]
        response: CommandResponse,
    },
    /// Outcome of a login attempt.
    LoginResult {
        /// Whether admin commands are now allowed.
        success: bool,
    },
    /// Reply to `ping_check`.
    PongCheck {
        /// Timestamp from the ping, if any.
        #[serde(rename = "sentAt", skip_serializing_if = "Option::is_none")]
        sent_at: Option<u64>,
    },
    /// A frame could not be processed.
    Error {
        /// Message the error relates to, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        request: Option<String>,
        /// Human readable reason.
        message: String,
    },
}

#[derive(Debug, Serialize)]
/// Broadcast event forwarded to WebSocket clients.
pub struct BroadcastFrame<'a> {
    /// Event name.
    #[serde(rename = "type")]
    pub kind: &'a str,
    /// Event payload.
    pub payload: &'a serde_json::Value,
}
