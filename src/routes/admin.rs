use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{post, put},
};
use axum_valid::Valid;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::admin::{
        CommandResponse, CreateRaceRequest, EditTimeRequest, ReassignRequest, StartRaceRequest,
        StudentRequest,
    },
    error::AppError,
    services::race_service,
    state::{SharedState, race::GroupId},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving the race lifecycle.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/groups/{group}/races", post(create_race))
        .route("/admin/groups/{group}/races/{id}/select", post(select_race))
        .route("/admin/groups/{group}/race/start", post(start_race))
        .route("/admin/groups/{group}/race/pause", post(pause_race))
        .route("/admin/groups/{group}/race/end", post(end_race))
        .route("/admin/groups/{group}/race/injuries", post(injure_student))
        .route("/admin/groups/{group}/race/reassign", post(reassign_student))
        .route("/admin/groups/{group}/race/laps/last", put(edit_time))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Create a race and make it the active race of the group.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/races",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    request_body = CreateRaceRequest,
    responses(
        (status = 200, description = "Race created", body = CommandResponse),
        (status = 404, description = "Unknown group")
    )
)]
pub async fn create_race(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<CreateRaceRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::create_race(&state, group, payload).await?))
}

/// Make an existing race of the group its active race.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/races/{id}/select",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier"),
    ("id" = String, Path, description = "Identifier of the race to select")),
    responses(
        (status = 200, description = "Race selected", body = CommandResponse),
        (status = 404, description = "Unknown group or race")
    )
)]
pub async fn select_race(
    State(state): State<SharedState>,
    Path((group, id)): Path<(GroupId, Uuid)>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::select_race(&state, group, id).await?))
}

/// Start the active race, optionally through a countdown, or resume it.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/race/start",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    request_body = StartRaceRequest,
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn start_race(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<StartRaceRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::start_race(&state, group, payload).await?))
}

/// Pause the active race.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/race/pause",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn pause_race(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::pause_race(&state, group).await?))
}

/// End the active race.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/race/end",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn end_race(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::end_race(&state, group).await?))
}

/// Mark a student as injured.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/race/injuries",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    request_body = StudentRequest,
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn injure_student(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<StudentRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::injure_student(&state, group, payload).await?))
}

/// Move the laps of a student to another student.
#[utoipa::path(
    post,
    path = "/admin/groups/{group}/race/reassign",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    request_body = ReassignRequest,
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn reassign_student(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<ReassignRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::reassign_student(&state, group, payload).await?))
}

/// Overwrite the last lap of a student.
#[utoipa::path(
    put,
    path = "/admin/groups/{group}/race/laps/last",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token from the server configuration"),
    ("group" = String, Path, description = "Group identifier")),
    request_body = EditTimeRequest,
    responses((status = 200, description = "Command outcome", body = CommandResponse))
)]
pub async fn edit_time(
    State(state): State<SharedState>,
    Path(group): Path<GroupId>,
    Valid(Json(payload)): Valid<Json<EditTimeRequest>>,
) -> Result<Json<CommandResponse>, AppError> {
    Ok(Json(race_service::edit_time(&state, group, payload).await?))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    let authorized = provided == state.config().admin_token();
    if authorized {
        Ok(next.run(req).await)
    } else {
        warn!(path = %req.uri().path(), "rejected admin request with invalid token");
        Err(AppError::Unauthorized("invalid admin token".into()))
    }
}
