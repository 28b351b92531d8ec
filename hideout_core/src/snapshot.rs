use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use hideout_schema::{parse_snapshot_payload, HideoutSnapshot, SnapshotErrorResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotLoadError {
    #[error("failed to read snapshot from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot unavailable upstream ({0})")]
    Upstream(SnapshotErrorResponse),
}

/// Accepts the response envelope, a bare tree, or the error envelope (which is
/// reported as [`SnapshotLoadError::Upstream`]).
pub fn parse_snapshot(json: &str) -> Result<HideoutSnapshot, SnapshotLoadError> {
    parse_snapshot_payload(json)?
        .into_snapshot()
        .map_err(SnapshotLoadError::Upstream)
}

pub fn load_snapshot_file(path: &Path) -> Result<HideoutSnapshot, SnapshotLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| SnapshotLoadError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot = parse_snapshot(&contents)?;
    tracing::info!(
        target: "hideout::snapshot",
        path = %path.display(),
        stations = snapshot.stations.len(),
        "snapshot.loaded"
    );
    Ok(snapshot)
}

/// The upgrade tree for this session. Empty while upstream is unavailable.
#[derive(Resource, Debug, Clone, Default)]
pub struct SnapshotCatalog(Option<Arc<HideoutSnapshot>>);

impl SnapshotCatalog {
    pub fn new(snapshot: HideoutSnapshot) -> Self {
        Self(Some(Arc::new(snapshot)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn snapshot(&self) -> Option<&HideoutSnapshot> {
        self.0.as_deref()
    }

    pub fn max_level_of(&self, station_id: &str) -> Option<u32> {
        self.snapshot()?.max_level_of(station_id)
    }
}

/// Loads the snapshot, logging and returning an empty catalog on failure.
pub fn load_catalog(path: Option<&Path>) -> SnapshotCatalog {
    let Some(path) = path else {
        tracing::warn!(target: "hideout::snapshot", "snapshot.path_unset");
        return SnapshotCatalog::empty();
    };
    match load_snapshot_file(path) {
        Ok(snapshot) => SnapshotCatalog::new(snapshot),
        Err(err) => {
            tracing::warn!(
                target: "hideout::snapshot",
                path = %path.display(),
                error = %err,
                "snapshot.load_failed"
            );
            SnapshotCatalog::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_becomes_upstream_error() {
        let err = parse_snapshot(r#"{ "error": "UPSTREAM_DOWN", "message": "no cache" }"#)
            .expect_err("error envelope");
        assert!(matches!(err, SnapshotLoadError::Upstream(_)));
        assert_eq!(
            err.to_string(),
            "snapshot unavailable upstream (UPSTREAM_DOWN: no cache)"
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_snapshot("[1, 2, 3]"),
            Err(SnapshotLoadError::Parse(_))
        ));
    }

    #[test]
    fn catalog_answers_max_level() {
        let snapshot = parse_snapshot(
            r#"{ "hideoutStations": [
                { "id": "gym", "name": "Gym", "levels": [
                    { "id": "g1", "level": 1 }, { "id": "g2", "level": 2 }
                ] }
            ] }"#,
        )
        .expect("bare snapshot");
        let catalog = SnapshotCatalog::new(snapshot);
        assert_eq!(catalog.max_level_of("gym"), Some(2));
        assert_eq!(catalog.max_level_of("pool"), None);
        assert_eq!(SnapshotCatalog::empty().max_level_of("gym"), None);
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let catalog = load_catalog(Some(Path::new("/nonexistent/snapshot.json")));
        assert!(catalog.snapshot().is_none());
        assert!(load_catalog(None).snapshot().is_none());
    }
}
