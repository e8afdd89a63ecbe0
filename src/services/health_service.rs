use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the race store and count the groups that currently have an active race.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let active_races = state
        .registry()
        .entries()
        .into_iter()
        .filter(|(_, race_id)| race_id.is_some())
        .count();

    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(active_races),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthResponse::degraded(active_races)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::race_store::{FileRaceStore, MemoryRaceStore},
        state::{AppState, race::GroupId},
    };

    #[tokio::test]
    async fn reports_ok_with_active_race_count() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryRaceStore::new()));
        state
            .registry()
            .activate(&GroupId::from("junior"), uuid::Uuid::new_v4());

        let health = health_status(&state).await;
        assert!(health.is_ok());
        assert_eq!(health.active_races, 1);
    }

    #[tokio::test]
    async fn reports_degraded_when_races_dir_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let races_dir = dir.path().join("races");
        let store = FileRaceStore::open(&races_dir).await.unwrap();
        std::fs::remove_dir_all(&races_dir).unwrap();

        let state = AppState::new(AppConfig::default(), Arc::new(store));
        let health = health_status(&state).await;
        assert!(!health.is_ok());
        assert_eq!(health.status, "degraded");
    }
}
