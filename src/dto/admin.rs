//! DTO definitions used by the race command endpoints and documentation layer.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{
        race::RaceSummary,
        validation::{validate_lap_seconds, validate_student_name, validate_time_value},
    },
    state::{race::TimeValue, transitions::CommandOutcome},
};

/// Upper bound on the lap target of a race.
pub const MAX_LAPS: u32 = 100;
/// Upper bound on a requested countdown, in seconds.
pub const MAX_COUNTDOWN_SECS: u32 = 3_600;

/// Payload used to create a race in a group.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRaceRequest {
    /// Display label; blank names become `Race <id>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Laps each student has to complete; defaults to 1.
    #[serde(default)]
    pub laps: Option<u32>,
}

impl Validate for CreateRaceRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(laps) = self.laps {
            if !(1..=MAX_LAPS).contains(&laps) {
                let mut err = ValidationError::new("laps_range");
                err.message = Some(format!("Laps must be between 1 and {MAX_LAPS}").into());
                errors.add("laps", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload used to start (or resume) the active race.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRaceRequest {
    /// Count down before the clock starts. Ignored when resuming.
    #[serde(default)]
    pub use_countdown: bool,
    /// Countdown length override in seconds.
    #[serde(default)]
    pub countdown_secs: Option<u32>,
}

impl Validate for StartRaceRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(secs) = self.countdown_secs {
            if !(1..=MAX_COUNTDOWN_SECS).contains(&secs) {
                let mut err = ValidationError::new("countdown_range");
                err.message = Some(
                    format!("Countdown must be between 1 and {MAX_COUNTDOWN_SECS} seconds").into(),
                );
                errors.add("countdown_secs", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload recording a lap for a student.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLapRequest {
    /// Student name.
    pub student: String,
    /// Lap time in seconds; omitted means "elapsed race time now".
    #[serde(default)]
    pub time: Option<f64>,
}

impl Validate for RegisterLapRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(err) = validate_student_name(&self.student) {
            errors.add("student", err);
        }
        if let Some(time) = self.time {
            if let Err(err) = validate_lap_seconds(time) {
                errors.add("time", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload naming a single student (injury, lap removal).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequest {
    /// Student name.
    pub student: String,
}

impl Validate for StudentRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(err) = validate_student_name(&self.student) {
            errors.add("student", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload overwriting the last lap of a student.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditTimeRequest {
    /// Student name.
    pub student: String,
    /// Replacement value: seconds or `"Injured"`.
    #[schema(value_type = Object)]
    pub new_time: TimeValue,
}

impl Validate for EditTimeRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(err) = validate_student_name(&self.student) {
            errors.add("student", err);
        }
        if let Err(err) = validate_time_value(&self.new_time) {
            errors.add("new_time", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload moving the laps of one student to another.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReassignRequest {
    /// Student the laps are recorded under.
    pub old_student: String,
    /// Student receiving the laps.
    pub new_student: String,
    /// When set, only this value is given to the new student.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub new_time: Option<TimeValue>,
}

impl Validate for ReassignRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(err) = validate_student_name(&self.old_student) {
            errors.add("old_student", err);
        }
        if let Err(err) = validate_student_name(&self.new_student) {
            errors.add("new_student", err);
        }
        if let Some(Err(err)) = self.new_time.as_ref().map(validate_time_value) {
            errors.add("new_time", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Result of a race command. `applied` is false when the command was valid
/// but did not apply to the current race state.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    /// Whether the race changed.
    pub applied: bool,
    /// Why the command was ignored.
    pub reason: Option<String>,
    /// Race after the command.
    pub race: Option<RaceSummary>,
}

impl CommandResponse {
    /// Response for a command that changed `race`.
    pub fn applied(race: RaceSummary) -> Self {
        Self {
            applied: true,
            reason: None,
            race: Some(race),
        }
    }
}

impl From<&CommandOutcome> for CommandResponse {
    fn from(outcome: &CommandOutcome) -> Self {
        let (race, reason) = match outcome {
            CommandOutcome::Applied { race, .. } => (race, None),
            CommandOutcome::Ignored { race, reason } => (race, Some(reason.to_string())),
        };
        Self {
            applied: outcome.is_applied(),
            reason,
            race: Some(RaceSummary::from(race)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_race_rejects_zero_laps() {
        let request: CreateRaceRequest = serde_json::from_str(r#"{"laps": 0}"#).unwrap();
        assert!(request.validate().is_err());

        let request: CreateRaceRequest = serde_json::from_str("{}").unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn register_lap_accepts_missing_time() {
        let request: RegisterLapRequest =
            serde_json::from_str(r#"{"student": "Alice"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.time, None);

        let request: RegisterLapRequest =
            serde_json::from_str(r#"{"student": "Alice", "time": -3}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("time"));
    }

    #[test]
    fn edit_time_accepts_injury_marker() {
        let request: EditTimeRequest =
            serde_json::from_str(r#"{"student": "Bob", "newTime": "Injured"}"#).unwrap();
        assert_eq!(request.new_time, TimeValue::Injured);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn reassign_accepts_the_same_student() {
        let request: ReassignRequest = serde_json::from_str(
            r#"{"oldStudent": "Carol", "newStudent": "Carol", "newTime": 30.5}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());

        let request: ReassignRequest =
            serde_json::from_str(r#"{"oldStudent": "Carol", "newStudent": ""}"#).unwrap();
        assert!(request.validate().is_err());

        let request: ReassignRequest = serde_json::from_str(
            r#"{"oldStudent": "Carol", "newStudent": "Dana", "newTime": 12.0}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.new_time, Some(TimeValue::Seconds(12.0)));
    }

    #[test]
    fn command_response_omits_empty_reason() {
        let response = CommandResponse {
            applied: true,
            reason: None,
            race: None,
        };
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::json!({"applied": true})
        );
    }
}
