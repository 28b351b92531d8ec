//! Headless hideout upgrade tracker.
//!
//! A Bevy app holds the session: [`UserAction`] events flow through the reducer
//! into [`UserState`], and two independent subscribers react to every
//! [`StateChanged`]: derived-view recomputation and debounced persistence.

use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;

pub mod derived;
pub mod metrics;
pub mod persistence;
pub mod preferences;
pub mod snapshot;
pub mod store;
pub mod tracker_config;
pub mod user_state;

pub use derived::{
    aggregate_needed_now, apply_sort_mode, build_item_rows, build_station_card,
    build_station_cards, compute_derived_state, display_name_cmp, group_by_category, next_level,
    progress_pct, sort_alphabetically, sort_by_category, sort_by_needed_desc, station_card,
    DerivedView, NeededItem, SortPreference,
};
pub use hideout_schema::{DerivedState, HideoutSnapshot, SortMode, StationCard};
pub use metrics::TrackerMetrics;
pub use persistence::{LifecycleEvent, PersistenceLayer, StorageWriter, WriteCounters};
pub use preferences::{load_sort_mode, PreferencesPath};
pub use snapshot::{load_catalog, load_snapshot_file, SnapshotCatalog, SnapshotLoadError};
pub use store::{
    load_persisted_progress, JsonFileStore, KeyValueStore, Keyspace, MemoryStore, StoreError,
    StoredValue,
};
pub use tracker_config::{
    load_tracker_config_from_env, TrackerConfig, TrackerConfigError, TrackerConfigHandle,
};
pub use user_state::{
    clamp_on_hand, clamp_station_level, reduce, upgrade_action_for, PersistedProgress,
    StateChanged, UserAction, UserState,
};

/// Frame phases, run in declaration order.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackerSet {
    /// Startup hydration.
    Intake,
    /// The reducer; the only writer of [`UserState`].
    Reduce,
    /// Persistence, derived views and preferences.
    React,
    Report,
}

/// Assembles the app around an already-opened store and snapshot.
///
/// The persisted progress is read on a background thread and applied as a
/// single `Hydrate` on the first frame after it arrives.
pub fn build_tracker_app(
    config: Arc<TrackerConfig>,
    store: Arc<dyn KeyValueStore>,
    catalog: SnapshotCatalog,
    preferences: PreferencesPath,
) -> App {
    let mut app = App::new();

    let sort_mode = load_sort_mode(preferences.0.as_deref(), config.default_sort_mode());
    let writer = StorageWriter::spawn(Arc::clone(&store));
    let layer = PersistenceLayer::new(writer, config.debounce());
    let pending = persistence::spawn_progress_loader(store);

    app.add_plugins(MinimalPlugins)
        .add_event::<UserAction>()
        .add_event::<StateChanged>()
        .add_event::<LifecycleEvent>()
        .insert_resource(TrackerConfigHandle::new(config))
        .insert_resource(catalog)
        .insert_resource(preferences)
        .insert_resource(SortPreference(sort_mode))
        .insert_resource(layer)
        .insert_resource(pending)
        .init_resource::<UserState>()
        .init_resource::<DerivedView>()
        .init_resource::<TrackerMetrics>()
        .configure_sets(
            Update,
            (
                TrackerSet::Intake,
                TrackerSet::Reduce,
                TrackerSet::React,
                TrackerSet::Report,
            )
                .chain(),
        )
        .add_systems(
            Update,
            persistence::poll_hydration.in_set(TrackerSet::Intake),
        )
        .add_systems(
            Update,
            user_state::apply_user_actions.in_set(TrackerSet::Reduce),
        )
        .add_systems(
            Update,
            (
                (
                    persistence::tick_persistence,
                    persistence::persist_state_changes,
                    persistence::flush_on_lifecycle,
                )
                    .chain(),
                derived::recompute_derived_state,
                preferences::save_sort_preference,
            )
                .in_set(TrackerSet::React),
        )
        .add_systems(
            Update,
            metrics::collect_metrics.in_set(TrackerSet::Report),
        );

    app
}

/// Owned session with the dispatch surface the presentation layer uses.
pub struct TrackerApp {
    app: App,
}

impl TrackerApp {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    /// Opens the JSON store and preferences in the configured storage
    /// directory and loads the configured snapshot.
    pub fn from_config(config: Arc<TrackerConfig>) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(config.storage_dir()));
        let catalog = load_catalog(config.snapshot_path());
        let preferences = PreferencesPath::in_dir(config.storage_dir());
        Self::new(build_tracker_app(config, store, catalog, preferences))
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    pub fn update(&mut self) {
        self.app.update();
    }

    pub fn dispatch(&mut self, action: UserAction) {
        self.app.world.send_event(action);
    }

    pub fn lifecycle(&mut self, event: LifecycleEvent) {
        self.app.world.send_event(event);
    }

    pub fn state(&self) -> &UserState {
        self.app.world.resource::<UserState>()
    }

    pub fn is_hydrated(&self) -> bool {
        self.state().is_hydrated
    }

    pub fn derived(&self) -> Option<&DerivedState> {
        self.app.world.resource::<DerivedView>().state()
    }

    pub fn snapshot(&self) -> Option<&HideoutSnapshot> {
        self.app.world.resource::<SnapshotCatalog>().snapshot()
    }

    pub fn metrics(&self) -> &TrackerMetrics {
        self.app.world.resource::<TrackerMetrics>()
    }

    pub fn persistence(&self) -> &PersistenceLayer {
        self.app.world.resource::<PersistenceLayer>()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.app.world.resource::<SortPreference>().0
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        let mut preference = self.app.world.resource_mut::<SortPreference>();
        if preference.0 != mode {
            preference.0 = mode;
        }
    }

    /// Card built from the live state, independent of the last recompute.
    pub fn station_card(&self, station_id: &str) -> Option<StationCard> {
        derived::station_card(self.snapshot()?, station_id, self.state())
    }

    /// Dispatches a level change bounded by the station's max level. Returns
    /// `false` for stations missing from the snapshot.
    pub fn set_station_level(&mut self, station_id: &str, level: f64) -> bool {
        let Some(max_level) = self
            .app
            .world
            .resource::<SnapshotCatalog>()
            .max_level_of(station_id)
        else {
            return false;
        };
        self.dispatch(UserAction::SetStationLevel {
            station_id: station_id.to_string(),
            level,
            max_level,
        });
        true
    }

    /// Dispatches an upgrade only when the station is ready for one. Readiness
    /// is unknown until stored progress has hydrated.
    pub fn upgrade(&mut self, station_id: &str) -> bool {
        if !self.is_hydrated() {
            return false;
        }
        let Some(action) = self
            .station_card(station_id)
            .as_ref()
            .and_then(upgrade_action_for)
        else {
            return false;
        };
        self.dispatch(action);
        true
    }

    pub fn flush(&mut self) {
        self.app.world.resource_mut::<PersistenceLayer>().flush();
    }

    /// Waits for the writer thread to apply everything sent so far.
    pub fn sync_storage(&self, timeout: Duration) -> bool {
        self.persistence().writer().sync(timeout)
    }

    /// Forces the teardown flush and waits for storage to settle.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.lifecycle(LifecycleEvent::Teardown);
        self.update();
        self.sync_storage(timeout)
    }
}
