use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        race::{GroupSnapshot, RaceDataSnapshot, RaceSummary},
        sse::{ServerEvent, StudentReassignedEvent, TimeEditedEvent, TimeRegisteredEvent},
    },
    error::ServiceError,
    state::{
        AppState, SharedState,
        race::{Race, final_time},
        state_machine::RaceEffect,
    },
};

/// Full snapshot of every group.
pub const EVENT_RACE_DATA: &str = "race_data";
/// A lap or an injury was recorded.
pub const EVENT_TIME_REGISTERED: &str = "time_registered";
/// The last lap of a student was edited.
pub const EVENT_TIME_EDITED: &str = "time_edited";
/// Laps moved between students.
pub const EVENT_STUDENT_REASSIGNED: &str = "student_reassigned";

/// Build the full snapshot from the store and the active race registry.
pub async fn build_snapshot(state: &AppState) -> Result<RaceDataSnapshot, ServiceError> {
    let config = state.config();
    let mut groups = IndexMap::with_capacity(config.groups().len());

    for group in config.groups().keys() {
        let races = state
            .store()
            .list_by_group(group.clone())
            .await?
            .into_values()
            .map(|entity| {
                let race = Race::from(entity);
                (race.id, RaceSummary::from(&race))
            })
            .collect();
        groups.insert(
            group.clone(),
            GroupSnapshot {
                current_race_id: state.registry().active(group),
                races,
            },
        );
    }

    Ok(RaceDataSnapshot(groups))
}

/// Broadcast the full snapshot to every subscriber.
pub async fn publish_snapshot(state: &SharedState) {
    match build_snapshot(state).await {
        Ok(snapshot) => send_event(state, EVENT_RACE_DATA, &snapshot),
        Err(err) => warn!(error = %err, "failed to build race snapshot"),
    }
}

/// Broadcast the delta event matching `effect`, if it has one.
pub fn publish_effect(state: &SharedState, race: &Race, effect: &RaceEffect) {
    match effect {
        RaceEffect::LapRegistered { student, value } => {
            let laps = race.laps_of(student).to_vec();
            let payload = TimeRegisteredEvent {
                group: race.group.clone(),
                race_id: race.id,
                student: student.clone(),
                time: *value,
                final_time: final_time(&laps),
                laps,
            };
            send_event(state, EVENT_TIME_REGISTERED, &payload);
        }
        RaceEffect::LapEdited { student, value } => {
            let laps = race.laps_of(student).to_vec();
            let payload = TimeEditedEvent {
                group: race.group.clone(),
                race_id: race.id,
                student: student.clone(),
                new_time: *value,
                final_time: final_time(&laps),
                laps,
            };
            send_event(state, EVENT_TIME_EDITED, &payload);
        }
        RaceEffect::Reassigned {
            old_student,
            new_student,
            new_time,
        } => {
            let laps = race.laps_of(new_student).to_vec();
            let payload = StudentReassignedEvent {
                group: race.group.clone(),
                race_id: race.id,
                old_student: old_student.clone(),
                new_student: new_student.clone(),
                new_time: *new_time,
                final_time: final_time(&laps),
                laps,
            };
            send_event(state, EVENT_STUDENT_REASSIGNED, &payload);
        }
        _ => {}
    }
}

fn send_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(event, payload) {
        Ok(event) => {
            state.events().broadcast(event);
        }
        Err(err) => warn!(event, error = %err, "failed to encode event"),
    }
}
