use bevy::prelude::*;
use serde::Serialize;

use crate::{derived::DerivedView, persistence::PersistenceLayer, user_state::StateChanged};

#[derive(Resource, Default, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerMetrics {
    pub frames: u64,
    pub actions_applied: u64,
    pub flushes: u64,
    pub pending_on_hand: usize,
    pub pending_station_levels: usize,
    pub writes_applied: u64,
    pub writes_failed: u64,
    pub derived_recomputations: u64,
}

pub fn collect_metrics(
    mut changes: EventReader<StateChanged>,
    layer: Res<PersistenceLayer>,
    view: Res<DerivedView>,
    mut metrics: ResMut<TrackerMetrics>,
) {
    metrics.frames += 1;
    metrics.actions_applied += changes.read().count() as u64;

    metrics.flushes = layer.flushes();
    metrics.pending_on_hand = layer.pending_on_hand();
    metrics.pending_station_levels = layer.pending_station_levels();

    let counters = layer.writer().counters();
    metrics.writes_applied = counters.applied();
    metrics.writes_failed = counters.failed();

    metrics.derived_recomputations = view.recomputations();
}
