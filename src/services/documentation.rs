use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Race Timer Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::public::get_config,
        crate::routes::public::get_races,
        crate::routes::public::get_incomplete_students,
        crate::routes::public::search_students,
        crate::routes::operator::register_lap,
        crate::routes::operator::remove_lap,
        crate::routes::admin::create_race,
        crate::routes::admin::select_race,
        crate::routes::admin::start_race,
        crate::routes::admin::pause_race,
        crate::routes::admin::end_race,
        crate::routes::admin::injure_student,
        crate::routes::admin::reassign_student,
        crate::routes::admin::edit_time,
        crate::routes::sse::race_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::admin::CreateRaceRequest,
            crate::dto::admin::StartRaceRequest,
            crate::dto::admin::RegisterLapRequest,
            crate::dto::admin::StudentRequest,
            crate::dto::admin::EditTimeRequest,
            crate::dto::admin::ReassignRequest,
            crate::dto::admin::CommandResponse,
            crate::dto::race::RaceSummary,
            crate::dto::race::GroupSnapshot,
            crate::dto::race::RaceDataSnapshot,
            crate::dto::race::RosterResponse,
            crate::dto::race::IncompleteStudentsResponse,
            crate::dto::race::StudentMatch,
            crate::dto::status::VisibleRaceStatus,
            crate::dto::sse::TimeRegisteredEvent,
            crate::dto::sse::TimeEditedEvent,
            crate::dto::sse::StudentReassignedEvent,
            crate::config::ClassRoster,
            crate::config::GroupRoster,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "public", description = "Read-only race data and rosters"),
        (name = "operator", description = "Lap recording for timing operators"),
        (name = "admin", description = "Race management, requires the admin token"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "websocket", description = "Bidirectional command channel"),
    )
)]
pub struct ApiDoc;
