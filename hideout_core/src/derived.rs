//! Derived-state engine: turns the snapshot plus progress into view models.
//!
//! Every function here is pure. The app recomputes the whole [`DerivedState`]
//! whenever progress, the sort preference or the snapshot changes; callers that
//! need memoisation key it on their own inputs.

use std::cmp::Ordering;
use std::collections::HashMap;

use bevy::prelude::*;
use hideout_schema::{
    is_money_category, CategoryId, DerivedState, HideoutSnapshot, ItemCategoryGroup, ItemId,
    ItemRow, Level, SortMode, Station, StationCard, StationId, StationRequirementView,
};

use crate::snapshot::SnapshotCatalog;
use crate::user_state::{StateChanged, UserState};

/// Case-insensitive comparison of display names; lowercase sorts first on ties.
pub fn display_name_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| b.cmp(a))
}

/// Level numbered `current_level + 1`, wherever it sits in the station's list.
pub fn next_level(station: &Station, current_level: u32) -> Option<&Level> {
    let wanted = current_level.checked_add(1)?;
    station.level(wanted)
}

pub fn build_station_card(
    station: &Station,
    current_level: u32,
    on_hand: &HashMap<ItemId, u32>,
) -> StationCard {
    let max_level = station.max_level();
    let next = next_level(station, current_level);

    let mut requirements = Vec::new();
    let mut is_ready_to_upgrade = false;

    if let Some(level) = next {
        is_ready_to_upgrade = true;
        for requirement in &level.item_requirements {
            let is_money = requirement.item.category.is_money();
            let on_hand_qty = if is_money {
                0
            } else {
                on_hand.get(&requirement.item.id).copied().unwrap_or(0)
            };
            let is_satisfied = is_money || on_hand_qty >= requirement.quantity;
            if !is_satisfied {
                is_ready_to_upgrade = false;
            }
            requirements.push(StationRequirementView {
                item_id: requirement.item.id.clone(),
                item_name: requirement.item.name.clone(),
                item_short_name: requirement.item.short_name.clone(),
                icon_link: requirement.item.icon_link.clone(),
                required_qty: requirement.quantity,
                on_hand_qty,
                is_satisfied,
                is_money,
            });
        }
        requirements.sort_by(|a, b| {
            b.is_money
                .cmp(&a.is_money)
                .then_with(|| display_name_cmp(&a.item_name, &b.item_name))
        });
    }

    StationCard {
        station_id: station.id.clone(),
        station_name: station.name.clone(),
        image_link: station.image_link.clone(),
        current_level,
        max_level,
        next_level: next.map(|level| level.level),
        requirements,
        is_ready_to_upgrade,
    }
}

/// One card per station, ordered by station name.
pub fn build_station_cards(
    snapshot: &HideoutSnapshot,
    station_levels: &HashMap<StationId, u32>,
    on_hand: &HashMap<ItemId, u32>,
) -> Vec<StationCard> {
    let mut cards: Vec<StationCard> = snapshot
        .stations
        .iter()
        .map(|station| {
            let current = station_levels.get(&station.id).copied().unwrap_or(0);
            build_station_card(station, current, on_hand)
        })
        .collect();
    cards.sort_by(|a, b| display_name_cmp(&a.station_name, &b.station_name));
    cards
}

/// Card for a single station, without building the others.
pub fn station_card(
    snapshot: &HideoutSnapshot,
    station_id: &str,
    state: &UserState,
) -> Option<StationCard> {
    let station = snapshot.station(station_id)?;
    Some(build_station_card(
        station,
        state.station_level(station_id),
        &state.on_hand,
    ))
}

/// Shopping-list entry accumulated across every station's next level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeededItem {
    pub item_id: ItemId,
    pub name: String,
    pub short_name: String,
    pub icon_link: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub needed_total: u32,
}

/// Sums the non-money requirements of every station's next level, in order of
/// first appearance. Metadata comes from the first occurrence of each item.
pub fn aggregate_needed_now(
    snapshot: &HideoutSnapshot,
    station_levels: &HashMap<StationId, u32>,
) -> Vec<NeededItem> {
    let mut needed: Vec<NeededItem> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for station in &snapshot.stations {
        let current = station_levels.get(&station.id).copied().unwrap_or(0);
        let Some(level) = next_level(station, current) else {
            continue;
        };

        for requirement in &level.item_requirements {
            let item = &requirement.item;
            if is_money_category(&item.category.name) {
                continue;
            }
            match index.get(item.id.as_str()) {
                Some(&slot) => {
                    let entry = &mut needed[slot];
                    entry.needed_total = entry.needed_total.saturating_add(requirement.quantity);
                }
                None => {
                    index.insert(item.id.as_str(), needed.len());
                    needed.push(NeededItem {
                        item_id: item.id.clone(),
                        name: item.name.clone(),
                        short_name: item.short_name.clone(),
                        icon_link: item.icon_link.clone(),
                        category_id: item.category.id.clone(),
                        category_name: item.category.name.clone(),
                        needed_total: requirement.quantity,
                    });
                }
            }
        }
    }

    needed
}

/// `round(100 * on_hand / needed_total)` clamped to `0..=100`; a zero total
/// counts as complete.
pub fn progress_pct(on_hand: u32, needed_total: u32) -> u8 {
    if needed_total == 0 {
        return 100;
    }
    let on_hand = u64::from(on_hand);
    let needed = u64::from(needed_total);
    let rounded = (200 * on_hand + needed) / (2 * needed);
    rounded.min(100) as u8
}

pub fn build_item_rows(needed: &[NeededItem], on_hand: &HashMap<ItemId, u32>) -> Vec<ItemRow> {
    needed
        .iter()
        .map(|item| {
            let held = on_hand.get(&item.item_id).copied().unwrap_or(0);
            ItemRow {
                item_id: item.item_id.clone(),
                name: item.name.clone(),
                short_name: item.short_name.clone(),
                icon_link: item.icon_link.clone(),
                category_id: item.category_id.clone(),
                category_name: item.category_name.clone(),
                needed_total: item.needed_total,
                on_hand: held,
                progress_pct: progress_pct(held, item.needed_total),
                is_complete: held >= item.needed_total,
            }
        })
        .collect()
}

pub fn sort_by_needed_desc(items: &[ItemRow]) -> Vec<ItemRow> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        b.needed_total
            .cmp(&a.needed_total)
            .then_with(|| display_name_cmp(&a.name, &b.name))
    });
    sorted
}

pub fn sort_alphabetically(items: &[ItemRow]) -> Vec<ItemRow> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| display_name_cmp(&a.name, &b.name));
    sorted
}

pub fn sort_by_category(items: &[ItemRow]) -> Vec<ItemRow> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| {
        display_name_cmp(&a.category_name, &b.category_name)
            .then_with(|| display_name_cmp(&a.name, &b.name))
    });
    sorted
}

/// Groups keyed by category id; items by name, groups by category name.
pub fn group_by_category(items: &[ItemRow]) -> Vec<ItemCategoryGroup> {
    let mut groups: Vec<ItemCategoryGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in items {
        let slot = *index.entry(item.category_id.as_str()).or_insert_with(|| {
            groups.push(ItemCategoryGroup {
                category_id: item.category_id.clone(),
                category_name: item.category_name.clone(),
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(item.clone());
    }

    for group in &mut groups {
        group.items.sort_by(|a, b| display_name_cmp(&a.name, &b.name));
    }
    groups.sort_by(|a, b| display_name_cmp(&a.category_name, &b.category_name));
    groups
}

pub fn apply_sort_mode(items: &[ItemRow], mode: SortMode) -> Vec<ItemRow> {
    match mode {
        SortMode::NeededDesc => sort_by_needed_desc(items),
        SortMode::Alphabetical => sort_alphabetically(items),
        SortMode::Category => sort_by_category(items),
    }
}

pub fn compute_derived_state(
    snapshot: &HideoutSnapshot,
    station_levels: &HashMap<StationId, u32>,
    on_hand: &HashMap<ItemId, u32>,
    sort_mode: SortMode,
) -> DerivedState {
    let station_cards = build_station_cards(snapshot, station_levels, on_hand);
    let needed = aggregate_needed_now(snapshot, station_levels);
    let rows = build_item_rows(&needed, on_hand);

    DerivedState {
        station_cards,
        item_rows: apply_sort_mode(&rows, sort_mode),
        item_groups: group_by_category(&rows),
    }
}

/// Sort mode applied to the flat item list.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortPreference(pub SortMode);

/// Latest derived views. `None` until a snapshot is available.
#[derive(Resource, Debug, Default)]
pub struct DerivedView {
    state: Option<DerivedState>,
    recomputations: u64,
}

impl DerivedView {
    pub fn state(&self) -> Option<&DerivedState> {
        self.state.as_ref()
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

pub fn recompute_derived_state(
    mut changes: EventReader<StateChanged>,
    state: Res<UserState>,
    sort: Res<SortPreference>,
    catalog: Res<SnapshotCatalog>,
    mut view: ResMut<DerivedView>,
) {
    let progress_changed = changes.read().count() > 0;
    if !(progress_changed || sort.is_changed() || catalog.is_changed()) {
        return;
    }

    view.state = catalog.snapshot().map(|snapshot| {
        compute_derived_state(snapshot, &state.station_levels, &state.on_hand, sort.0)
    });
    view.recomputations += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hideout_schema::{Category, Item, ItemRequirement};

    fn category(name: &str) -> Category {
        Category {
            id: format!("cat-{}", name.to_lowercase()),
            name: name.to_string(),
        }
    }

    fn item(id: &str, name: &str, category_name: &str) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
            short_name: name.chars().take(4).collect(),
            icon_link: format!("https://assets.invalid/{id}.webp"),
            category: category(category_name),
        }
    }

    fn level(number: u32, requirements: Vec<(u32, Item)>) -> Level {
        Level {
            id: format!("lvl-{number}"),
            level: number,
            item_requirements: requirements
                .into_iter()
                .map(|(quantity, item)| ItemRequirement { quantity, item })
                .collect(),
        }
    }

    fn station(id: &str, name: &str, levels: Vec<Level>) -> Station {
        Station {
            id: id.to_string(),
            name: name.to_string(),
            image_link: String::new(),
            levels,
        }
    }

    fn roubles() -> Item {
        item("roubles", "Roubles", "Money")
    }

    fn bolts() -> Item {
        item("bolts", "Bolts", "Building material")
    }

    fn hose() -> Item {
        item("hose", "Corrugated hose", "Building material")
    }

    fn wires() -> Item {
        item("wires", "Bundle of wires", "Electronics")
    }

    /// Lavatory 1..=3 (stored out of order), Vents 1..=2, Stash without levels.
    fn fixture() -> HideoutSnapshot {
        HideoutSnapshot {
            stations: vec![
                station(
                    "lavatory",
                    "Lavatory",
                    vec![
                        level(3, vec![(1, wires())]),
                        level(1, vec![(5, bolts()), (3, hose()), (2000, roubles())]),
                        level(2, vec![(4, hose())]),
                    ],
                ),
                station(
                    "vents",
                    "Air filtering unit",
                    vec![
                        level(1, vec![(2, bolts()), (1, wires())]),
                        level(2, vec![(9000, roubles())]),
                    ],
                ),
                station("stash", "Stash", Vec::new()),
            ],
        }
    }

    fn counts(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs
            .iter()
            .map(|(id, count)| (id.to_string(), *count))
            .collect()
    }

    fn row(name: &str, category_name: &str, needed_total: u32) -> ItemRow {
        ItemRow {
            item_id: name.to_lowercase(),
            name: name.to_string(),
            short_name: name.to_string(),
            icon_link: String::new(),
            category_id: format!("cat-{}", category_name.to_lowercase()),
            category_name: category_name.to_string(),
            needed_total,
            on_hand: 0,
            progress_pct: 0,
            is_complete: false,
        }
    }

    fn names(rows: &[ItemRow]) -> Vec<&str> {
        rows.iter().map(|row| row.name.as_str()).collect()
    }

    #[test]
    fn next_level_ignores_list_order_and_gaps() {
        let snapshot = fixture();
        let lavatory = snapshot.station("lavatory").unwrap();
        assert_eq!(next_level(lavatory, 0).map(|l| l.level), Some(1));
        assert_eq!(next_level(lavatory, 1).map(|l| l.level), Some(2));
        assert_eq!(next_level(lavatory, 2).map(|l| l.level), Some(3));
        assert!(next_level(lavatory, 3).is_none());
        assert!(next_level(lavatory, 7).is_none());
        assert!(next_level(lavatory, u32::MAX).is_none());

        let gapped = station("gym", "Gym", vec![level(1, vec![]), level(3, vec![])]);
        assert!(next_level(&gapped, 1).is_none());
        assert_eq!(next_level(&gapped, 2).map(|l| l.level), Some(3));
    }

    #[test]
    fn readiness_flips_when_the_short_item_arrives() {
        let snapshot = fixture();
        let lavatory = snapshot.station("lavatory").unwrap();

        let card = build_station_card(lavatory, 0, &counts(&[("bolts", 5), ("hose", 2)]));
        assert_eq!(card.max_level, 3);
        assert_eq!(card.next_level, Some(1));
        assert!(!card.is_ready_to_upgrade);
        let hose_view = card.requirements.iter().find(|r| r.item_id == "hose").unwrap();
        assert!(!hose_view.is_satisfied);
        assert_eq!(hose_view.on_hand_qty, 2);

        let card = build_station_card(lavatory, 0, &counts(&[("bolts", 5), ("hose", 3)]));
        assert!(card.is_ready_to_upgrade);
    }

    #[test]
    fn money_is_listed_first_and_never_blocks() {
        let snapshot = fixture();
        let lavatory = snapshot.station("lavatory").unwrap();
        let card = build_station_card(lavatory, 0, &counts(&[("roubles", 0)]));

        let order: Vec<&str> = card
            .requirements
            .iter()
            .map(|r| r.item_name.as_str())
            .collect();
        assert_eq!(order, vec!["Roubles", "Bolts", "Corrugated hose"]);

        let money = &card.requirements[0];
        assert!(money.is_money);
        assert!(money.is_satisfied);
        assert_eq!(money.on_hand_qty, 0);
    }

    #[test]
    fn money_only_level_is_ready() {
        let snapshot = fixture();
        let vents = snapshot.station("vents").unwrap();
        let card = build_station_card(vents, 1, &HashMap::new());
        assert_eq!(card.next_level, Some(2));
        assert!(card.is_ready_to_upgrade);
    }

    #[test]
    fn empty_level_is_ready_and_max_level_is_not() {
        let gym = station("gym", "Gym", vec![level(1, vec![])]);
        let card = build_station_card(&gym, 0, &HashMap::new());
        assert!(card.is_ready_to_upgrade);
        assert!(card.requirements.is_empty());

        let card = build_station_card(&gym, 1, &HashMap::new());
        assert!(card.is_at_max());
        assert!(!card.is_ready_to_upgrade);
        assert!(card.requirements.is_empty());

        let stash = station("stash", "Stash", Vec::new());
        let card = build_station_card(&stash, 0, &HashMap::new());
        assert_eq!(card.max_level, 0);
        assert!(!card.is_ready_to_upgrade);
    }

    #[test]
    fn station_cards_sorted_by_name() {
        let cards = build_station_cards(&fixture(), &HashMap::new(), &HashMap::new());
        let order: Vec<&str> = cards.iter().map(|c| c.station_name.as_str()).collect();
        assert_eq!(order, vec!["Air filtering unit", "Lavatory", "Stash"]);
    }

    #[test]
    fn single_station_card_matches_full_build() {
        let snapshot = fixture();
        let mut state = UserState::default();
        state.station_levels.insert("lavatory".to_string(), 1);
        state.on_hand.insert("hose".to_string(), 4);

        let single = station_card(&snapshot, "lavatory", &state).unwrap();
        let all = build_station_cards(&snapshot, &state.station_levels, &state.on_hand);
        assert_eq!(Some(&single), all.iter().find(|c| c.station_id == "lavatory"));
        assert!(single.is_ready_to_upgrade);
        assert!(station_card(&snapshot, "missing", &state).is_none());
    }

    #[test]
    fn aggregation_sums_across_stations_and_skips_money() {
        let needed = aggregate_needed_now(&fixture(), &HashMap::new());
        let bolts = needed.iter().find(|n| n.item_id == "bolts").unwrap();
        assert_eq!(bolts.needed_total, 7);
        assert!(needed.iter().all(|n| n.item_id != "roubles"));

        let ids: Vec<&str> = needed.iter().map(|n| n.item_id.as_str()).collect();
        assert_eq!(ids, vec!["bolts", "hose", "wires"]);
    }

    #[test]
    fn aggregation_skips_stations_at_max() {
        let needed = aggregate_needed_now(&fixture(), &counts(&[("lavatory", 3), ("vents", 1)]));
        assert!(needed.is_empty());

        let needed = aggregate_needed_now(&fixture(), &counts(&[("lavatory", 2)]));
        let ids: Vec<&str> = needed.iter().map(|n| n.item_id.as_str()).collect();
        assert_eq!(ids, vec!["wires", "bolts"]);
        assert_eq!(needed[0].needed_total, 2);
    }

    #[test]
    fn item_rows_report_progress() {
        let needed = aggregate_needed_now(&fixture(), &HashMap::new());
        let rows = build_item_rows(&needed, &counts(&[("bolts", 3), ("wires", 9)]));

        let bolts = rows.iter().find(|r| r.item_id == "bolts").unwrap();
        assert_eq!(bolts.on_hand, 3);
        assert_eq!(bolts.progress_pct, 43);
        assert!(!bolts.is_complete);

        let wires = rows.iter().find(|r| r.item_id == "wires").unwrap();
        assert_eq!(wires.progress_pct, 100);
        assert!(wires.is_complete);

        let hose = rows.iter().find(|r| r.item_id == "hose").unwrap();
        assert_eq!(hose.on_hand, 0);
        assert_eq!(hose.progress_pct, 0);
    }

    #[test]
    fn progress_rounds_half_up_and_caps() {
        assert_eq!(progress_pct(1, 2), 50);
        assert_eq!(progress_pct(1, 3), 33);
        assert_eq!(progress_pct(2, 3), 67);
        assert_eq!(progress_pct(1, 8), 13);
        assert_eq!(progress_pct(50, 10), 100);
        assert_eq!(progress_pct(0, 0), 100);
        assert_eq!(progress_pct(u32::MAX, 1), 100);
    }

    #[test]
    fn needed_desc_breaks_ties_by_name() {
        let rows = vec![
            row("Zebra", "Other", 5),
            row("Banana", "Food", 10),
            row("Apple", "Food", 10),
        ];
        let sorted = apply_sort_mode(&rows, SortMode::NeededDesc);
        insta::assert_json_snapshot!(names(&sorted), @r###"
        [
          "Apple",
          "Banana",
          "Zebra"
        ]
        "###);
    }

    #[test]
    fn alphabetical_and_category_modes() {
        let rows = vec![
            row("wires", "Electronics", 1),
            row("Bolts", "Building material", 7),
            row("Capacitors", "Electronics", 3),
            row("Alkali", "Chemicals", 2),
        ];
        assert_eq!(
            names(&apply_sort_mode(&rows, SortMode::Alphabetical)),
            vec!["Alkali", "Bolts", "Capacitors", "wires"]
        );
        assert_eq!(
            names(&apply_sort_mode(&rows, SortMode::Category)),
            vec!["Bolts", "Alkali", "Capacitors", "wires"]
        );
    }

    #[test]
    fn display_names_compare_case_insensitively() {
        assert_eq!(display_name_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(display_name_cmp("Zebra", "apple"), Ordering::Greater);
        assert_eq!(display_name_cmp("apple", "Apple"), Ordering::Less);
        assert_eq!(display_name_cmp("Apple", "Apple"), Ordering::Equal);
    }

    #[test]
    fn groups_sort_categories_and_members() {
        let rows = vec![
            row("wires", "Electronics", 1),
            row("Bolts", "Building material", 7),
            row("Capacitors", "Electronics", 3),
        ];
        let groups = group_by_category(&rows);
        let layout: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.category_name.as_str(), names(&g.items)))
            .collect();
        assert_eq!(
            layout,
            vec![
                ("Building material", vec!["Bolts"]),
                ("Electronics", vec!["Capacitors", "wires"]),
            ]
        );
    }

    #[test]
    fn compute_returns_flat_and_grouped_views_together() {
        let derived = compute_derived_state(
            &fixture(),
            &HashMap::new(),
            &counts(&[("hose", 1)]),
            SortMode::NeededDesc,
        );
        assert_eq!(derived.station_cards.len(), 3);
        assert_eq!(
            names(&derived.item_rows),
            vec!["Bolts", "Corrugated hose", "Bundle of wires"]
        );
        assert_eq!(derived.item_groups.len(), 2);
        let grouped: usize = derived.item_groups.iter().map(|g| g.items.len()).sum();
        assert_eq!(grouped, derived.item_rows.len());
        assert_eq!(derived.item_row("hose").map(|r| r.on_hand), Some(1));
    }

    #[test]
    fn tolerates_an_empty_snapshot() {
        let derived = compute_derived_state(
            &HideoutSnapshot::default(),
            &HashMap::new(),
            &HashMap::new(),
            SortMode::Category,
        );
        assert_eq!(derived, DerivedState::default());
    }
}
