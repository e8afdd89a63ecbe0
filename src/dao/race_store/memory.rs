use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{models::RaceEntity, storage::StorageResult};
use crate::state::race::RaceId;

use super::{RaceStore, sort_oldest_first};

/// Volatile store keeping every race in memory. Used by tests and when the
/// server runs with `RACE_STORE=memory`.
#[derive(Default)]
pub struct MemoryRaceStore {
    races: DashMap<RaceId, RaceEntity>,
}

impl MemoryRaceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RaceStore for MemoryRaceStore {
    fn get(&self, id: RaceId) -> BoxFuture<'_, StorageResult<Option<RaceEntity>>> {
        Box::pin(async move { Ok(self.races.get(&id).map(|entry| entry.value().clone())) })
    }

    fn put(&self, race: RaceEntity) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.races.insert(race.id, race);
            Ok(())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<RaceEntity>>> {
        Box::pin(async move {
            let mut races: Vec<RaceEntity> =
                self.races.iter().map(|entry| entry.value().clone()).collect();
            sort_oldest_first(&mut races);
            Ok(races)
        })
    }

    fn health_check(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
