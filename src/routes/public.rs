use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    dto::race::{IncompleteStudentsResponse, RaceDataSnapshot, RosterResponse, StudentMatch},
    error::AppError,
    services::race_service,
    state::{SharedState, race::GroupId},
};

/// Public read-only endpoints exposing rosters and race data.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/config", get(get_config))
        .route("/api/races", get(get_races))
        .route("/api/groups/{group}/incomplete", get(get_incomplete_students))
        .route("/api/students", get(search_students))
}

/// Query string of the student search.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StudentSearchQuery {
    /// Case-insensitive fragment of the student name.
    #[serde(default)]
    pub q: String,
}

#[utoipa::path(
    get,
    path = "/api/config",
    tag = "public",
    responses((status = 200, description = "Rosters of every group", body = RosterResponse))
)]
/// Return the class rosters of every group.
pub async fn get_config(State(state): State<SharedState>) -> Json<RosterResponse> {
    Json(race_service::roster(&state))
}

#[utoipa::path(
    get,
    path = "/api/races",
    tag = "public",
    responses(
        (status = 200, description = "Races of every group", body = RaceDataSnapshot),
        (status = 503, description = "Race store unavailable")
    )
)]
/// Return the full race snapshot, the same payload as the `race_data` event.
pub async fn get_races(State(state): State<SharedState>) -> Result<Json<RaceDataSnapshot>, AppError> {
    Ok(Json(race_service::snapshot(&state).await?))
}

#[utoipa::path(
    get,
    path = "/api/groups/{group}/incomplete",
    tag = "public",
    params(("group" = String, Path, description = "Group identifier")),
    responses(
        (status = 200, description = "Students still running", body = IncompleteStudentsResponse),
        (status = 404, description = "Unknown group or no active race")
    )
)]
/// Return the roster students that have neither finished nor been injured in the active race.
pub async fn get_incomplete_students(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
) -> Result<Json<IncompleteStudentsResponse>, AppError> {
    Ok(Json(race_service::incomplete_students(&state, group).await?))
}

#[utoipa::path(
    get,
    path = "/api/students",
    tag = "public",
    params(StudentSearchQuery),
    responses((status = 200, description = "Matching students", body = [StudentMatch]))
)]
/// Search every roster for students whose name contains `q`.
pub async fn search_students(
    State(state): State<SharedState>,
    Query(query): Query<StudentSearchQuery>,
) -> Json<Vec<StudentMatch>> {
    Json(race_service::search_students(&state, &query.q))
}
