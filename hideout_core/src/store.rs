//! Durable key/value storage for progress.
//!
//! Three keyspaces hold sparse maps: a key that is absent reads as zero (or as
//! "not excluded"). Engines implement [`KeyValueStore`]; the persistence layer
//! only ever talks to the trait.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::user_state::PersistedProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Keyspace {
    OnHand,
    StationLevels,
    ExcludedStations,
}

impl Keyspace {
    pub const ALL: [Keyspace; 3] = [
        Keyspace::OnHand,
        Keyspace::StationLevels,
        Keyspace::ExcludedStations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyspace::OnHand => "on_hand",
            Keyspace::StationLevels => "station_levels",
            Keyspace::ExcludedStations => "excluded_stations",
        }
    }

    fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Count(u32),
    Flag(bool),
}

impl StoredValue {
    pub fn as_count(self) -> Option<u32> {
        match self {
            StoredValue::Count(count) => Some(count),
            StoredValue::Flag(_) => None,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            StoredValue::Flag(flag) => Some(flag),
            StoredValue::Count(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("stored {keyspace} data at {path:?} is not valid JSON: {source}")]
    Corrupt {
        keyspace: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {keyspace} data: {source}")]
    Encode {
        keyspace: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// One pending write; `None` removes the key.
pub type KeyWrite = (String, Option<StoredValue>);

pub trait KeyValueStore: Send + Sync {
    fn get_all(&self, keyspace: Keyspace) -> Result<BTreeMap<String, StoredValue>, StoreError>;

    fn put(&self, keyspace: Keyspace, key: &str, value: StoredValue) -> Result<(), StoreError>;

    fn delete(&self, keyspace: Keyspace, key: &str) -> Result<(), StoreError>;

    fn clear(&self, keyspace: Keyspace) -> Result<(), StoreError>;

    /// Applies `writes` in order. Engines may override this to commit once.
    fn apply_writes(&self, keyspace: Keyspace, writes: &[KeyWrite]) -> Result<(), StoreError> {
        for (key, value) in writes {
            match value {
                Some(value) => self.put(keyspace, key, *value)?,
                None => self.delete(keyspace, key)?,
            }
        }
        Ok(())
    }
}

/// In-process store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    spaces: Mutex<HashMap<Keyspace, BTreeMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_all(&self, keyspace: Keyspace) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        let spaces = self.spaces.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(spaces.get(&keyspace).cloned().unwrap_or_default())
    }

    fn put(&self, keyspace: Keyspace, key: &str, value: StoredValue) -> Result<(), StoreError> {
        let mut spaces = self.spaces.lock().map_err(|_| StoreError::Poisoned)?;
        spaces
            .entry(keyspace)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, keyspace: Keyspace, key: &str) -> Result<(), StoreError> {
        let mut spaces = self.spaces.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(space) = spaces.get_mut(&keyspace) {
            space.remove(key);
        }
        Ok(())
    }

    fn clear(&self, keyspace: Keyspace) -> Result<(), StoreError> {
        let mut spaces = self.spaces.lock().map_err(|_| StoreError::Poisoned)?;
        spaces.remove(&keyspace);
        Ok(())
    }
}

/// One JSON object file per keyspace under `dir`. Missing files read as empty.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, keyspace: Keyspace) -> PathBuf {
        self.dir.join(keyspace.file_name())
    }

    fn read(&self, keyspace: Keyspace) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        let path = self.path_for(keyspace);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            keyspace: keyspace.as_str(),
            path,
            source,
        })
    }

    fn write(
        &self,
        keyspace: Keyspace,
        entries: &BTreeMap<String, StoredValue>,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(keyspace);
        let tmp = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Encode {
            keyspace: keyspace.as_str(),
            source,
        })?;
        fs::write(&tmp, encoded).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_all(&self, keyspace: Keyspace) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        self.read(keyspace)
    }

    fn put(&self, keyspace: Keyspace, key: &str, value: StoredValue) -> Result<(), StoreError> {
        self.apply_writes(keyspace, &[(key.to_string(), Some(value))])
    }

    fn delete(&self, keyspace: Keyspace, key: &str) -> Result<(), StoreError> {
        self.apply_writes(keyspace, &[(key.to_string(), None)])
    }

    fn clear(&self, keyspace: Keyspace) -> Result<(), StoreError> {
        let path = self.path_for(keyspace);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn apply_writes(&self, keyspace: Keyspace, writes: &[KeyWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut entries = match self.read(keyspace) {
            Ok(entries) => entries,
            Err(err @ StoreError::Corrupt { .. }) => {
                tracing::warn!(
                    target: "hideout::store",
                    keyspace = keyspace.as_str(),
                    error = %err,
                    "store.corrupt_overwritten"
                );
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        for (key, value) in writes {
            match value {
                Some(value) => {
                    entries.insert(key.clone(), *value);
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        self.write(keyspace, &entries)
    }
}

fn read_keyspace(store: &dyn KeyValueStore, keyspace: Keyspace) -> BTreeMap<String, StoredValue> {
    store.get_all(keyspace).unwrap_or_else(|err| {
        tracing::warn!(
            target: "hideout::store",
            keyspace = keyspace.as_str(),
            error = %err,
            "store.read_failed"
        );
        BTreeMap::new()
    })
}

/// Reads every keyspace. Unreadable keyspaces come back empty.
pub fn load_persisted_progress(store: &dyn KeyValueStore) -> PersistedProgress {
    let counts = |keyspace| -> HashMap<String, u32> {
        read_keyspace(store, keyspace)
            .into_iter()
            .filter_map(|(key, value)| value.as_count().map(|count| (key, count)))
            .collect()
    };

    let on_hand = counts(Keyspace::OnHand);
    let station_levels = counts(Keyspace::StationLevels);
    let excluded = read_keyspace(store, Keyspace::ExcludedStations)
        .into_iter()
        .filter(|(_, value)| value.as_flag() == Some(true))
        .map(|(key, _)| key)
        .collect();

    let progress = PersistedProgress {
        on_hand,
        station_levels,
        excluded,
    };
    tracing::debug!(
        target: "hideout::store",
        on_hand = progress.on_hand.len(),
        station_levels = progress.station_levels.len(),
        excluded = progress.excluded.len(),
        "store.loaded"
    );
    progress
}
