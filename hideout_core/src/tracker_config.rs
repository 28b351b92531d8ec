use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bevy::prelude::Resource;
use hideout_schema::SortMode;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_TRACKER_CONFIG: &str = include_str!("data/tracker_config.json");
pub const TRACKER_CONFIG_ENV: &str = "HIDEOUT_TRACKER_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    debounce_ms: u64,
    storage_dir: PathBuf,
    snapshot_path: Option<PathBuf>,
    default_sort_mode: SortMode,
    frame_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            storage_dir: PathBuf::from(".hideout"),
            snapshot_path: None,
            default_sort_mode: SortMode::NeededDesc,
            frame_interval_ms: 16,
        }
    }
}

impl TrackerConfig {
    pub fn builtin() -> Arc<Self> {
        let config = Self::from_json_str(BUILTIN_TRACKER_CONFIG).unwrap_or_else(|err| {
            tracing::warn!(
                target: "hideout::config",
                error = %err,
                "tracker_config.builtin_invalid"
            );
            Self::default()
        });
        Arc::new(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, TrackerConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| TrackerConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = TrackerConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn default_sort_mode(&self) -> SortMode {
        self.default_sort_mode
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum TrackerConfigError {
    #[error("failed to parse tracker config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read tracker config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Resource, Debug, Clone)]
pub struct TrackerConfigHandle(pub Arc<TrackerConfig>);

impl TrackerConfigHandle {
    pub fn new(config: Arc<TrackerConfig>) -> Self {
        Self(config)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.0
    }
}

/// Reads the file named by `HIDEOUT_TRACKER_CONFIG`, falling back to the
/// builtin config when it is unset or unusable. Returns the path actually used.
pub fn load_tracker_config_from_env() -> (Arc<TrackerConfig>, Option<PathBuf>) {
    let Some(path) = env::var(TRACKER_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "hideout::config", "tracker_config.loaded=builtin");
        return (TrackerConfig::builtin(), None);
    };

    match TrackerConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "hideout::config",
                path = %path.display(),
                "tracker_config.loaded=file"
            );
            (Arc::new(config), Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "hideout::config",
                path = %path.display(),
                error = %err,
                "tracker_config.load_failed"
            );
            (TrackerConfig::builtin(), None)
        }
    }
}
