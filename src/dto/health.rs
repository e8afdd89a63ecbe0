use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of groups currently running an active race.
    pub active_races: usize,
}

impl HealthResponse {
    /// The race store answered its probe.
    pub fn ok(active_races: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_races,
        }
    }

    /// The race store failed its probe.
    pub fn degraded(active_races: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_races,
        }
    }

    /// Whether the probe succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
