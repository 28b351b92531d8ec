//! Progress state owned by the running session and the transition function that
//! mutates it.
//!
//! [`UserState::apply`] is the only mutation path. It is synchronous and total:
//! out-of-range or fractional numbers are floored and clamped, never rejected.
//! Persistence reacts to the [`StateChanged`] events emitted by
//! [`apply_user_actions`] and is never called from here.

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;
use hideout_schema::{ConsumeLine, ItemId, StationCard, StationId};

/// Floors `value` and bounds it below by zero.
pub fn clamp_on_hand(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, u32::MAX as f64) as u32
}

/// Floors `value` and bounds it to `0..=max_level`.
pub fn clamp_station_level(value: f64, max_level: u32) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.floor().clamp(0.0, max_level as f64) as u32
}

/// Progress as read back from durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedProgress {
    pub on_hand: HashMap<ItemId, u32>,
    pub station_levels: HashMap<StationId, u32>,
    pub excluded: HashSet<StationId>,
}

/// User edits, dispatched as events and applied in arrival order.
#[derive(Event, Debug, Clone, PartialEq)]
pub enum UserAction {
    /// Replaces all progress with what storage held. Dispatched once at startup.
    Hydrate(PersistedProgress),
    SetOnHand {
        item_id: ItemId,
        quantity: f64,
    },
    AdjustOnHand {
        item_id: ItemId,
        delta: f64,
    },
    SetStationLevel {
        station_id: StationId,
        level: f64,
        max_level: u32,
    },
    /// Advances one level and deducts `consume` in the same transition.
    /// Shortfalls clamp to zero; readiness is the caller's concern.
    UpgradeStation {
        station_id: StationId,
        max_level: u32,
        consume: Vec<ConsumeLine>,
    },
    ToggleStationExclusion {
        station_id: StationId,
    },
    /// Clears station levels and exclusions together.
    ResetStationLevels,
    ResetOnHand,
}

/// Emitted once per applied [`UserAction`], after the state reflects it.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct StateChanged {
    pub action: UserAction,
}

#[derive(Resource, Debug, Clone, Default, PartialEq, Eq)]
pub struct UserState {
    pub on_hand: HashMap<ItemId, u32>,
    pub station_levels: HashMap<StationId, u32>,
    pub excluded: HashSet<StationId>,
    pub is_hydrated: bool,
}

impl UserState {
    pub fn on_hand(&self, item_id: &str) -> u32 {
        self.on_hand.get(item_id).copied().unwrap_or(0)
    }

    pub fn station_level(&self, station_id: &str) -> u32 {
        self.station_levels.get(station_id).copied().unwrap_or(0)
    }

    pub fn is_excluded(&self, station_id: &str) -> bool {
        self.excluded.contains(station_id)
    }

    pub fn apply(&mut self, action: &UserAction) {
        match action {
            UserAction::Hydrate(progress) => {
                self.on_hand = progress.on_hand.clone();
                self.station_levels = progress.station_levels.clone();
                self.excluded = progress.excluded.clone();
                self.is_hydrated = true;
            }
            UserAction::SetOnHand { item_id, quantity } => {
                self.on_hand.insert(item_id.clone(), clamp_on_hand(*quantity));
            }
            UserAction::AdjustOnHand { item_id, delta } => {
                let next = clamp_on_hand(self.on_hand(item_id) as f64 + delta);
                self.on_hand.insert(item_id.clone(), next);
            }
            UserAction::SetStationLevel {
                station_id,
                level,
                max_level,
            } => {
                self.station_levels
                    .insert(station_id.clone(), clamp_station_level(*level, *max_level));
            }
            UserAction::UpgradeStation {
                station_id,
                max_level,
                consume,
            } => {
                let next = clamp_station_level(self.station_level(station_id) as f64 + 1.0, *max_level);
                for line in consume {
                    let remaining = clamp_on_hand(self.on_hand(&line.item_id) as f64 - line.quantity as f64);
                    self.on_hand.insert(line.item_id.clone(), remaining);
                }
                self.station_levels.insert(station_id.clone(), next);
            }
            UserAction::ToggleStationExclusion { station_id } => {
                if !self.excluded.remove(station_id) {
                    self.excluded.insert(station_id.clone());
                }
            }
            UserAction::ResetStationLevels => {
                self.station_levels.clear();
                self.excluded.clear();
            }
            UserAction::ResetOnHand => {
                self.on_hand.clear();
            }
        }
    }
}

/// Pure form of [`UserState::apply`].
pub fn reduce(mut state: UserState, action: &UserAction) -> UserState {
    state.apply(action);
    state
}

/// Builds the upgrade for a card, or `None` when the card is not ready.
pub fn upgrade_action_for(card: &StationCard) -> Option<UserAction> {
    if !card.is_ready_to_upgrade {
        return None;
    }
    Some(UserAction::UpgradeStation {
        station_id: card.station_id.clone(),
        max_level: card.max_level,
        consume: card.consumable_requirements(),
    })
}

/// Applies actions in arrival order. Edits arriving before `Hydrate` are held
/// and replayed right after it, so stored progress never overwrites them.
pub fn apply_user_actions(
    mut actions: EventReader<UserAction>,
    mut held: Local<Vec<UserAction>>,
    mut state: ResMut<UserState>,
    mut changed: EventWriter<StateChanged>,
) {
    for action in actions.read() {
        let is_hydrate = matches!(action, UserAction::Hydrate(_));
        if !state.is_hydrated && !is_hydrate {
            held.push(action.clone());
            tracing::debug!(
                target: "hideout::tracker",
                held = held.len(),
                "user_state.action_held"
            );
            continue;
        }

        state.apply(action);
        changed.send(StateChanged {
            action: action.clone(),
        });

        if is_hydrate {
            for held_action in held.drain(..) {
                state.apply(&held_action);
                changed.send(StateChanged {
                    action: held_action,
                });
            }
        }
    }
}
