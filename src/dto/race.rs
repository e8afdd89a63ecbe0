use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::{AppConfig, GroupRoster},
    dto::{format_system_time, status::VisibleRaceStatus},
    state::race::{GroupId, Race, TimeValue},
};

/// Public projection of a race exposed to REST, SSE and WebSocket clients.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaceSummary {
    /// Race identifier.
    pub id: Uuid,
    /// Owning group.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Display label.
    pub name: String,
    /// Laps each student has to complete.
    pub laps: u32,
    /// Lifecycle status with its timing data.
    pub status: VisibleRaceStatus,
    /// Lap entries per student: seconds or `"Injured"`.
    #[schema(value_type = Object)]
    pub recorded_times: IndexMap<String, Vec<TimeValue>>,
    /// Final time per student: seconds or `"Injured"`.
    #[schema(value_type = Object)]
    pub final_times: IndexMap<String, TimeValue>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
}

impl From<&Race> for RaceSummary {
    fn from(race: &Race) -> Self {
        Self {
            id: race.id,
            group: race.group.clone(),
            name: race.name.clone(),
            laps: race.laps_required,
            status: VisibleRaceStatus::from(&race.status),
            recorded_times: race.recorded_times().clone(),
            final_times: race.final_times().clone(),
            created_at: format_system_time(race.created_at),
            updated_at: format_system_time(race.updated_at),
        }
    }
}

/// Races of one group together with its active race.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshot {
    /// Active race, if any.
    pub current_race_id: Option<Uuid>,
    /// Every race of the group keyed by id, oldest first.
    #[schema(value_type = Object)]
    pub races: IndexMap<Uuid, RaceSummary>,
}

/// Full state of every group, emitted as the `race_data` event.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct RaceDataSnapshot(pub IndexMap<GroupId, GroupSnapshot>);

/// Group rosters served to clients.
#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct RosterResponse(pub IndexMap<GroupId, GroupRoster>);

impl From<&AppConfig> for RosterResponse {
    fn from(config: &AppConfig) -> Self {
        Self(config.groups().clone())
    }
}

/// Students of the roster still expected to finish the active race.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteStudentsResponse {
    /// Group queried.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Active race the check ran against.
    pub race_id: Uuid,
    /// Students neither injured nor done with every lap, in roster order.
    pub students: Vec<String>,
}

/// One hit of the roster search.
#[derive(Debug, Serialize, ToSchema)]
pub struct StudentMatch {
    /// Group of the student.
    #[schema(value_type = String)]
    pub group: GroupId,
    /// Student name as written in the roster.
    pub student: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::race::RaceStatus;

    #[test]
    fn race_summary_uses_client_field_names() {
        let mut race = Race::new(GroupId::from("junior"), "800m".into(), 2);
        race.status = RaceStatus::Paused { elapsed_ms: 5_000 };
        race.push_lap("Alice", TimeValue::Seconds(61.5));
        race.push_lap("Bob", TimeValue::Injured);

        let value = serde_json::to_value(RaceSummary::from(&race)).unwrap();
        assert_eq!(value["group"], json!("junior"));
        assert_eq!(value["laps"], json!(2));
        assert_eq!(
            value["status"],
            json!({"state": "paused", "pausedOffsetMs": 5000})
        );
        assert_eq!(
            value["recordedTimes"],
            json!({"Alice": [61.5], "Bob": ["Injured"]})
        );
        assert_eq!(value["finalTimes"], json!({"Alice": 61.5, "Bob": "Injured"}));
        assert!(value["createdAt"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn snapshot_is_keyed_by_group() {
        let race = Race::new(GroupId::from("minis"), "relay".into(), 1);
        let mut races = IndexMap::new();
        races.insert(race.id, RaceSummary::from(&race));

        let mut groups = IndexMap::new();
        groups.insert(
            GroupId::from("minis"),
            GroupSnapshot {
                current_race_id: Some(race.id),
                races,
            },
        );
        groups.insert(GroupId::from("senior"), GroupSnapshot::default());

        let value = serde_json::to_value(RaceDataSnapshot(groups)).unwrap();
        assert_eq!(value["minis"]["currentRaceId"], json!(race.id));
        assert_eq!(value["senior"], json!({"currentRaceId": null, "races": {}}));
    }
}
