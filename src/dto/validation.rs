//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::race::TimeValue;

/// Longest accepted student name, in characters.
pub const MAX_STUDENT_NAME_LEN: usize = 100;
/// Longest accepted lap time: one day.
pub const MAX_LAP_SECONDS: f64 = 86_400.0;

/// Validates that a student name is not blank and stays within
/// [`MAX_STUDENT_NAME_LEN`] characters.
///
/// # Examples
///
/// ```ignore
/// validate_student_name("Alice") // Ok
/// validate_student_name("   ")   // Err - blank
/// ```
pub fn validate_student_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("student_blank");
        err.message = Some("Student name must not be blank".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > MAX_STUDENT_NAME_LEN {
        let mut err = ValidationError::new("student_length");
        err.message = Some(
            format!("Student name must be at most {MAX_STUDENT_NAME_LEN} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that a lap time is a finite, non-negative number of seconds no
/// larger than [`MAX_LAP_SECONDS`].
pub fn validate_lap_seconds(seconds: f64) -> Result<(), ValidationError> {
    if !seconds.is_finite() || !(0.0..=MAX_LAP_SECONDS).contains(&seconds) {
        let mut err = ValidationError::new("lap_seconds_range");
        err.message = Some(
            format!("Lap time must be between 0 and {MAX_LAP_SECONDS} seconds (got {seconds})")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates a time value: the injury sentinel is always accepted, numbers
/// go through [`validate_lap_seconds`].
pub fn validate_time_value(value: &TimeValue) -> Result<(), ValidationError> {
    match value {
        TimeValue::Seconds(seconds) => validate_lap_seconds(*seconds),
        TimeValue::Injured => Ok(()),
    }
}
