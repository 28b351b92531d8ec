//! Remembers the chosen sort mode between sessions.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use hideout_schema::SortMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derived::SortPreference;

pub const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to access preferences at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub sort_mode: SortMode,
}

/// Where preferences live; `None` keeps them in memory only.
#[derive(Resource, Debug, Clone, Default)]
pub struct PreferencesPath(pub Option<PathBuf>);

impl PreferencesPath {
    pub fn in_dir(dir: &Path) -> Self {
        Self(Some(dir.join(PREFERENCES_FILE)))
    }
}

pub fn read_preferences(path: &Path) -> Result<Option<Preferences>, PreferencesError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PreferencesError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

pub fn write_preferences(path: &Path, preferences: &Preferences) -> Result<(), PreferencesError> {
    let io_err = |source| PreferencesError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let encoded = serde_json::to_vec_pretty(preferences)?;
    fs::write(path, encoded).map_err(io_err)
}

/// Stored sort mode, or `fallback` when nothing usable is stored.
pub fn load_sort_mode(path: Option<&Path>, fallback: SortMode) -> SortMode {
    let Some(path) = path else {
        return fallback;
    };
    match read_preferences(path) {
        Ok(Some(preferences)) => preferences.sort_mode,
        Ok(None) => fallback,
        Err(err) => {
            tracing::warn!(
                target: "hideout::config",
                path = %path.display(),
                error = %err,
                "preferences.load_failed"
            );
            fallback
        }
    }
}

pub fn save_sort_preference(sort: Res<SortPreference>, path: Res<PreferencesPath>) {
    if !sort.is_changed() || sort.is_added() {
        return;
    }
    let Some(path) = path.0.as_deref() else {
        return;
    };
    let preferences = Preferences { sort_mode: sort.0 };
    if let Err(err) = write_preferences(path, &preferences) {
        tracing::warn!(
            target: "hideout::config",
            path = %path.display(),
            error = %err,
            "preferences.save_failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::scratch_dir;

    #[test]
    fn sort_mode_survives_a_restart() {
        let dir = scratch_dir("prefs");
        let path = PreferencesPath::in_dir(&dir);
        let file = path.0.clone().unwrap();

        let mut app = App::new();
        app.insert_resource(SortPreference(SortMode::NeededDesc))
            .insert_resource(path)
            .add_systems(Update, save_sort_preference);
        app.update();
        assert!(!file.exists());

        app.world.resource_mut::<SortPreference>().0 = SortMode::Category;
        app.update();

        assert_eq!(load_sort_mode(Some(&file), SortMode::Alphabetical), SortMode::Category);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unreadable_preferences_fall_back() {
        let dir = scratch_dir("prefs-bad");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join(PREFERENCES_FILE);
        fs::write(&file, r#"{ "sortMode": "by-weight" }"#).unwrap();

        assert!(matches!(
            read_preferences(&file),
            Err(PreferencesError::Parse(_))
        ));
        assert_eq!(load_sort_mode(Some(&file), SortMode::Alphabetical), SortMode::Alphabetical);
        assert_eq!(
            load_sort_mode(Some(&dir.join("missing.json")), SortMode::Category),
            SortMode::Category
        );
        assert_eq!(load_sort_mode(None, SortMode::NeededDesc), SortMode::NeededDesc);
        let _ = fs::remove_dir_all(dir);
    }
}
