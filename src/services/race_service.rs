use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            CommandResponse, CreateRaceRequest, EditTimeRequest, ReassignRequest,
            RegisterLapRequest, StartRaceRequest, StudentRequest,
        },
        race::{
            IncompleteStudentsResponse, RaceDataSnapshot, RaceSummary, RosterResponse,
            StudentMatch,
        },
    },
    error::ServiceError,
    services::broadcast,
    state::{
        SharedState,
        race::{GroupId, Race, RaceStatus},
        state_machine::RaceCommand,
        transitions::{load_race, persist, run_race_command},
    },
};

/// Create a race in `group` and make it the group's active race.
pub async fn create_race(
    state: &SharedState,
    group: GroupId,
    request: CreateRaceRequest,
) -> Result<CommandResponse, ServiceError> {
    ensure_group(state, &group)?;

    let task_state = state.clone();
    let task_group = group.clone();
    let race = state
        .serializer()
        .submit(&group, move || async move {
            let race = build_race(task_group, request);
            persist(&task_state, &race).await?;
            if let Some(previous) = task_state.registry().activate(&race.group, race.id) {
                info!(group = %race.group, previous = %previous, "active race replaced");
            }
            info!(group = %race.group, race_id = %race.id, name = %race.name, "race created");
            broadcast::publish_snapshot(&task_state).await;
            Ok(race)
        })
        .await?;

    Ok(CommandResponse::applied(RaceSummary::from(&race)))
}

/// Repoint the active race of `group` to an existing race of that group.
pub async fn select_race(
    state: &SharedState,
    group: GroupId,
    race_id: Uuid,
) -> Result<CommandResponse, ServiceError> {
    ensure_group(state, &group)?;

    let task_state = state.clone();
    let task_group = group.clone();
    let race = state
        .serializer()
        .submit(&group, move || async move {
            let race = load_race(&task_state, race_id).await?;
            if race.group != task_group {
                return Err(ServiceError::NotFound(format!(
                    "race `{race_id}` does not belong to group `{task_group}`"
                )));
            }
            task_state.registry().activate(&task_group, race.id);
            info!(group = %task_group, race_id = %race.id, "race selected");
            broadcast::publish_snapshot(&task_state).await;
            Ok(race)
        })
        .await?;

    Ok(CommandResponse::applied(RaceSummary::from(&race)))
}

/// Start the active race, through a countdown when asked, or resume it after a pause.
pub async fn start_race(
    state: &SharedState,
    group: GroupId,
    request: StartRaceRequest,
) -> Result<CommandResponse, ServiceError> {
    let countdown_secs = request
        .use_countdown
        .then(|| request.countdown_secs.unwrap_or(state.config().countdown_secs()));
    run(state, group, RaceCommand::Start { countdown_secs }).await
}

/// Pause the active race, cancelling a countdown in progress.
pub async fn pause_race(state: &SharedState, group: GroupId) -> Result<CommandResponse, ServiceError> {
    run(state, group, RaceCommand::Pause).await
}

/// End the active race for good and clear the group's active pointer.
pub async fn end_race(state: &SharedState, group: GroupId) -> Result<CommandResponse, ServiceError> {
    run(state, group, RaceCommand::End).await
}

/// Record a lap for a student of the active race.
pub async fn register_lap(
    state: &SharedState,
    group: GroupId,
    request: RegisterLapRequest,
) -> Result<CommandResponse, ServiceError> {
    let command = RaceCommand::RegisterLap {
        student: request.student.trim().to_string(),
        time: request.time,
    };
    run(state, group, command).await
}

/// Mark a student of the active race as injured.
pub async fn injure_student(
    state: &SharedState,
    group: GroupId,
    request: StudentRequest,
) -> Result<CommandResponse, ServiceError> {
    let command = RaceCommand::Injure {
        student: request.student.trim().to_string(),
    };
    run(state, group, command).await
}

/// Move the laps of one student to another in the active race.
pub async fn reassign_student(
    state: &SharedState,
    group: GroupId,
    request: ReassignRequest,
) -> Result<CommandResponse, ServiceError> {
    let command = RaceCommand::Reassign {
        old_student: request.old_student.trim().to_string(),
        new_student: request.new_student.trim().to_string(),
        new_time: request.new_time,
    };
    run(state, group, command).await
}

/// Overwrite the last lap of a student in the active race.
pub async fn edit_time(
    state: &SharedState,
    group: GroupId,
    request: EditTimeRequest,
) -> Result<CommandResponse, ServiceError> {
    let command = RaceCommand::EditLastLap {
        student: request.student.trim().to_string(),
        value: request.new_time,
    };
    run(state, group, command).await
}

/// Drop the last lap of a student in the active race.
pub async fn remove_lap(
    state: &SharedState,
    group: GroupId,
    request: StudentRequest,
) -> Result<CommandResponse, ServiceError> {
    let command = RaceCommand::RemoveLastLap {
        student: request.student.trim().to_string(),
    };
    run(state, group, command).await
}

/// Full snapshot of every group.
pub async fn snapshot(state: &SharedState) -> Result<RaceDataSnapshot, ServiceError> {
    broadcast::build_snapshot(state).await
}

/// Rosters of every configured group.
pub fn roster(state: &SharedState) -> RosterResponse {
    RosterResponse::from(state.config().as_ref())
}

/// Roster students matching `query` across every group.
pub fn search_students(state: &SharedState, query: &str) -> Vec<StudentMatch> {
    state
        .config()
        .search_students(query)
        .into_iter()
        .map(|(group, student)| StudentMatch { group, student })
        .collect()
}

/// Roster students of `group` that are neither injured nor done in the active race.
pub async fn incomplete_students(
    state: &SharedState,
    group: GroupId,
) -> Result<IncompleteStudentsResponse, ServiceError> {
    let config = state.config();
    let roster = config
        .group(&group)
        .ok_or_else(|| ServiceError::NotFound(format!("group `{group}` not found")))?;
    let race_id = state
        .registry()
        .active(&group)
        .ok_or_else(|| ServiceError::NotFound(format!("group `{group}` has no active race")))?;
    let race = load_race(state, race_id).await?;

    let students = roster
        .students()
        .filter(|student| race.is_incomplete(student))
        .map(str::to_string)
        .collect();

    Ok(IncompleteStudentsResponse {
        group,
        race_id,
        students,
    })
}

/// Force every unfinished race to `Ended` and clear all active pointers.
/// Runs once before the server accepts connections.
pub async fn recover_on_startup(state: &SharedState) -> Result<usize, ServiceError> {
    let mut ended = 0;
    for entity in state.store().list_all().await? {
        let mut race = Race::from(entity);
        if race.status == RaceStatus::Ended {
            continue;
        }
        let previous = race.status.label();
        race.status = RaceStatus::Ended;
        race.touch();
        persist(state, &race).await?;
        info!(group = %race.group, race_id = %race.id, previous, "race force-ended at startup");
        ended += 1;
    }

    state.registry().reset();
    info!(ended, "startup recovery complete");
    Ok(ended)
}

async fn run(
    state: &SharedState,
    group: GroupId,
    command: RaceCommand,
) -> Result<CommandResponse, ServiceError> {
    ensure_group(state, &group)?;
    let name = command.name();
    let outcome = run_race_command(state, &group, command)
        .await
        .inspect_err(|err| warn!(group = %group, command = name, error = %err, "command failed"))?;
    Ok(CommandResponse::from(&outcome))
}

fn ensure_group(state: &SharedState, group: &GroupId) -> Result<(), ServiceError> {
    if state.registry().knows(group) {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!("group `{group}` not found")))
    }
}

fn build_race(group: GroupId, request: CreateRaceRequest) -> Race {
    let mut race = Race::new(group, String::new(), request.laps.unwrap_or(1).max(1));
    race.name = request
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Race {}", race.id));
    race
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::RaceEntity,
            race_store::{MemoryRaceStore, RaceStore},
        },
        state::{AppState, race::TimeValue},
    };

    fn roster_config() -> AppConfig {
        AppConfig::from_json_str(
            r#"{"groups": {
                "junior": {"classes": [{"name": "3A", "students": ["Alice", "Bob", "Carol"]}]},
                "senior": {}
            }}"#,
        )
        .unwrap()
        .with_admin_token("secret")
    }

    fn state() -> SharedState {
        AppState::new(roster_config(), Arc::new(MemoryRaceStore::new()))
    }

    fn junior() -> GroupId {
        GroupId::from("junior")
    }

    async fn create(state: &SharedState, laps: u32) -> RaceSummary {
        create_race(
            state,
            junior(),
            CreateRaceRequest {
                name: Some("  800m ".into()),
                laps: Some(laps),
            },
        )
        .await
        .unwrap()
        .race
        .unwrap()
    }

    async fn start(state: &SharedState) {
        let response = start_race(state, junior(), StartRaceRequest::default())
            .await
            .unwrap();
        assert!(response.applied);
    }

    fn lap(student: &str, time: f64) -> RegisterLapRequest {
        RegisterLapRequest {
            student: student.into(),
            time: Some(time),
        }
    }

    #[tokio::test]
    async fn create_race_activates_it() {
        let state = state();
        let race = create(&state, 3).await;

        assert_eq!(race.name, "800m");
        assert_eq!(race.laps, 3);
        assert_eq!(state.registry().active(&junior()), Some(race.id));

        let snapshot = snapshot(&state).await.unwrap();
        assert_eq!(snapshot.0[&junior()].current_race_id, Some(race.id));
        assert!(snapshot.0[&junior()].races.contains_key(&race.id));
    }

    #[tokio::test]
    async fn blank_name_and_missing_laps_get_defaults() {
        let state = state();
        let race = create_race(
            &state,
            junior(),
            CreateRaceRequest {
                name: Some("   ".into()),
                laps: None,
            },
        )
        .await
        .unwrap()
        .race
        .unwrap();

        assert_eq!(race.name, format!("Race {}", race.id));
        assert_eq!(race.laps, 1);
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let state = state();
        let result = create_race(&state, GroupId::from("staff"), CreateRaceRequest::default()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn select_race_rejects_other_groups() {
        let state = state();
        let first = create(&state, 1).await;
        let second = create(&state, 2).await;
        assert_eq!(state.registry().active(&junior()), Some(second.id));

        select_race(&state, junior(), first.id).await.unwrap();
        assert_eq!(state.registry().active(&junior()), Some(first.id));

        let foreign = select_race(&state, GroupId::from("senior"), first.id).await;
        assert!(matches!(foreign, Err(ServiceError::NotFound(_))));
        let unknown = select_race(&state, junior(), Uuid::new_v4()).await;
        assert!(matches!(unknown, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn over_limit_lap_reports_not_applied() {
        let state = state();
        create(&state, 3).await;
        start(&state).await;

        for time in [12.5, 11.9, 12.1] {
            assert!(register_lap(&state, junior(), lap("Alice", time)).await.unwrap().applied);
        }
        let response = register_lap(&state, junior(), lap("Alice", 9.0)).await.unwrap();
        assert!(!response.applied);
        assert!(response.reason.unwrap().contains("already completed 3 laps"));

        let race = response.race.unwrap();
        assert_eq!(race.final_times["Alice"], TimeValue::Seconds(36.5));
    }

    #[tokio::test]
    async fn injury_edit_and_reassign_flow() {
        let state = state();
        create(&state, 3).await;
        start(&state).await;

        register_lap(&state, junior(), lap("Carol", 10.0)).await.unwrap();
        register_lap(&state, junior(), lap("Carol", 11.0)).await.unwrap();
        injure_student(&state, junior(), StudentRequest { student: "Bob".into() })
            .await
            .unwrap();

        let response = reassign_student(
            &state,
            junior(),
            ReassignRequest {
                old_student: "Carol".into(),
                new_student: "Dana".into(),
                new_time: None,
            },
        )
        .await
        .unwrap();
        let race = response.race.unwrap();
        assert_eq!(race.final_times["Dana"], TimeValue::Seconds(21.0));
        assert!(!race.recorded_times.contains_key("Carol"));
        assert_eq!(race.final_times["Bob"], TimeValue::Injured);

        let response = edit_time(
            &state,
            junior(),
            EditTimeRequest {
                student: "Dana".into(),
                new_time: TimeValue::Seconds(12.0),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.race.unwrap().final_times["Dana"], TimeValue::Seconds(22.0));

        let response = remove_lap(&state, junior(), StudentRequest { student: "Dana".into() })
            .await
            .unwrap();
        assert_eq!(response.race.unwrap().final_times["Dana"], TimeValue::Seconds(10.0));
    }

    #[tokio::test]
    async fn end_race_is_final_and_clears_active_race() {
        let state = state();
        let race = create(&state, 2).await;
        start(&state).await;

        assert!(end_race(&state, junior()).await.unwrap().applied);
        assert_eq!(state.registry().active(&junior()), None);

        // Without an active race every command reports not found.
        let result = pause_race(&state, junior()).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));

        // Selecting the ended race again still refuses to restart it.
        select_race(&state, junior(), race.id).await.unwrap();
        let response = start_race(&state, junior(), StartRaceRequest::default())
            .await
            .unwrap();
        assert!(!response.applied);
    }

    #[tokio::test]
    async fn incomplete_students_follow_roster_order() {
        let state = state();
        create(&state, 1).await;
        start(&state).await;

        register_lap(&state, junior(), lap("Alice", 30.0)).await.unwrap();
        injure_student(&state, junior(), StudentRequest { student: "Bob".into() })
            .await
            .unwrap();

        let response = incomplete_students(&state, junior()).await.unwrap();
        assert_eq!(response.students, vec!["Carol".to_string()]);
    }

    #[tokio::test]
    async fn recovery_ends_unfinished_races() {
        let store = Arc::new(MemoryRaceStore::new());
        let mut running = Race::new(junior(), "relay".into(), 2);
        running.status = RaceStatus::Running { started_at_ms: 1 };
        let mut ended = Race::new(junior(), "sprint".into(), 1);
        ended.status = RaceStatus::Ended;
        store.put(RaceEntity::from(&running)).await.unwrap();
        store.put(RaceEntity::from(&ended)).await.unwrap();

        let state = AppState::new(AppConfig::default(), store.clone());
        state.registry().activate(&junior(), running.id);

        assert_eq!(recover_on_startup(&state).await.unwrap(), 1);
        assert_eq!(state.registry().active(&junior()), None);
        let reloaded = Race::from(store.get(running.id).await.unwrap().unwrap());
        assert_eq!(reloaded.status, RaceStatus::Ended);
    }
}
