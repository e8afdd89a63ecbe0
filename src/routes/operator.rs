use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::admin::{CommandResponse, RegisterLapRequest, StudentRequest},
    error::AppError,
    services::race_service,
    state::{SharedState, race::GroupId},
};

/// Lap recording endpoints used by timing operators; no admin token needed.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/groups/{group}/race/laps", post(register_lap))
        .route("/api/groups/{group}/race/laps/remove", post(remove_lap))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group}/race/laps",
    tag = "operator",
    params(("group" = String, Path, description = "Group identifier")),
    request_body = RegisterLapRequest,
    responses(
        (status = 200, description = "Command outcome", body = CommandResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown group or no active race")
    )
)]
/// Record a lap for a student; without `time` the elapsed race time is used.
pub async fn register_lap(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<RegisterLapRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::register_lap(&state, group, payload).await?))
}

#[utoipa::path(
    post,
    path = "/api/groups/{group}/race/laps/remove",
    tag = "operator",
    params(("group" = String, Path, description = "Group identifier")),
    request_body = StudentRequest,
    responses(
        (status = 200, description = "Command outcome", body = CommandResponse),
        (status = 404, description = "Unknown group or no active race")
    )
)]
/// Drop the last lap of a student.
pub async fn remove_lap(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<StudentRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::remove_lap(&state, group, payload).await?))
}
