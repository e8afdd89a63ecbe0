pub mod file;
pub mod memory;

use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::dao::models::RaceEntity;
use crate::dao::storage::StorageResult;
use crate::state::race::{GroupId, RaceId};

pub use self::{file::FileRaceStore, memory::MemoryRaceStore};

/// Abstraction over the persistence layer for race documents.
///
/// `put` is an atomic overwrite: once the returned future resolves the new
/// document is what every subsequent read observes.
pub trait RaceStore: Send + Sync {
    /// Fetch one race; unknown ids resolve to `None`.
    fn get(&self, id: RaceId) -> BoxFuture<'_, StorageResult<Option<RaceEntity>>>;
    /// Insert or replace a race document.
    fn put(&self, race: RaceEntity) -> BoxFuture<'_, StorageResult<()>>;
    /// Every stored race, oldest first.
    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<RaceEntity>>>;
    /// Probe the backend.
    fn health_check(&self) -> BoxFuture<'_, StorageResult<()>>;

    /// Races of one group keyed by id, oldest first.
    fn list_by_group(
        &self,
        group: GroupId,
    ) -> BoxFuture<'_, StorageResult<IndexMap<RaceId, RaceEntity>>> {
        Box::pin(async move {
            let races = self.list_all().await?;
            Ok(races
                .into_iter()
                .filter(|race| race.group == group)
                .map(|race| (race.id, race))
                .collect())
        })
    }
}

fn sort_oldest_first(races: &mut [RaceEntity]) {
    races.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
