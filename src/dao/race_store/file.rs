use std::{
    io,
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::fs;
use tracing::{info, warn};

use crate::dao::{
    models::RaceEntity,
    storage::{StorageError, StorageResult},
};
use crate::state::race::RaceId;

use super::{RaceStore, sort_oldest_first};

const FILE_PREFIX: &str = "race_";
const FILE_SUFFIX: &str = ".json";

/// Store writing one pretty-printed JSON document per race (`race_<id>.json`)
/// into a directory, with a write-through in-memory index for reads.
pub struct FileRaceStore {
    root: PathBuf,
    index: DashMap<RaceId, RaceEntity>,
}

impl FileRaceStore {
    /// Open (and create if needed) the race directory, indexing every
    /// readable document. Undecodable files are skipped with a warning.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|source| {
            StorageError::unavailable(format!("creating `{}`", root.display()), source)
        })?;

        let store = Self {
            root,
            index: DashMap::new(),
        };
        store.load_index().await?;
        info!(
            path = %store.root.display(),
            count = store.index.len(),
            "race directory indexed"
        );
        Ok(store)
    }

    /// Directory holding the race documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: RaceId) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}"))
    }

    async fn load_index(&self) -> StorageResult<()> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|source| {
            StorageError::unavailable(format!("listing `{}`", self.root.display()), source)
        })?;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StorageError::unavailable(
                        format!("listing `{}`", self.root.display()),
                        source,
                    ));
                }
            };

            let path = entry.path();
            if !is_race_document(&path) {
                continue;
            }

            match read_document(&path).await {
                Ok(race) => {
                    self.index.insert(race.id, race);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping race document"),
            }
        }

        Ok(())
    }

    async fn write_document(&self, race: &RaceEntity) -> StorageResult<()> {
        let path = self.path_for(race.id);
        let payload = serde_json::to_vec_pretty(race).map_err(|source| {
            StorageError::unavailable(format!("encoding race `{}`", race.id), source)
        })?;

        // Rename over the previous document so readers never see a torn write.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload).await.map_err(|source| {
            StorageError::unavailable(format!("writing `{}`", staging.display()), source)
        })?;
        fs::rename(&staging, &path).await.map_err(|source| {
            StorageError::unavailable(format!("replacing `{}`", path.display()), source)
        })?;
        Ok(())
    }
}

impl RaceStore for FileRaceStore {
    fn get(&self, id: RaceId) -> BoxFuture<'_, StorageResult<Option<RaceEntity>>> {
        Box::pin(async move { Ok(self.index.get(&id).map(|entry| entry.value().clone())) })
    }

    fn put(&self, race: RaceEntity) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            self.write_document(&race).await?;
            self.index.insert(race.id, race);
            Ok(())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, StorageResult<Vec<RaceEntity>>> {
        Box::pin(async move {
            let mut races: Vec<RaceEntity> =
                self.index.iter().map(|entry| entry.value().clone()).collect();
            sort_oldest_first(&mut races);
            Ok(races)
        })
    }

    fn health_check(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let metadata = fs::metadata(&self.root).await.map_err(|source| {
                StorageError::unavailable(format!("inspecting `{}`", self.root.display()), source)
            })?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(StorageError::unavailable(
                    format!("`{}` is not a directory", self.root.display()),
                    io::Error::from(io::ErrorKind::NotADirectory),
                ))
            }
        })
    }
}

fn is_race_document(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
}

async fn read_document(path: &Path) -> StorageResult<RaceEntity> {
    let contents = fs::read(path).await.map_err(|source| {
        StorageError::unavailable(format!("reading `{}`", path.display()), source)
    })?;
    serde_json::from_slice(&contents).map_err(|source| StorageError::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}
