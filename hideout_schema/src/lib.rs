//! Data contracts for the hideout tracker.
//!
//! Holds the read-only upgrade tree delivered by the snapshot collaborator, the
//! envelope it arrives in, and the display-ready view models the core derives
//! from it. Nothing here depends on the Bevy runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ItemId = String;
pub type StationId = String;
pub type CategoryId = String;

/// Category name marking currency items. Those are never tracked on hand and
/// never block an upgrade.
pub const MONEY_CATEGORY_NAME: &str = "Money";

pub fn is_money_category(category_name: &str) -> bool {
    category_name == MONEY_CATEGORY_NAME
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    pub fn is_money(&self) -> bool {
        is_money_category(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub icon_link: String,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequirement {
    pub quantity: u32,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: String,
    pub level: u32,
    #[serde(default)]
    pub item_requirements: Vec<ItemRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub name: String,
    #[serde(default)]
    pub image_link: String,
    #[serde(default)]
    pub levels: Vec<Level>,
}

impl Station {
    /// Highest level number present, or 0 for a station without levels.
    pub fn max_level(&self) -> u32 {
        self.levels.iter().map(|level| level.level).max().unwrap_or(0)
    }

    /// Exact-number lookup; levels are neither assumed sorted nor contiguous.
    pub fn level(&self, number: u32) -> Option<&Level> {
        self.levels.iter().find(|level| level.level == number)
    }
}

/// Immutable upgrade tree for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideoutSnapshot {
    #[serde(rename = "hideoutStations")]
    pub stations: Vec<Station>,
}

impl HideoutSnapshot {
    pub fn station(&self, station_id: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.id == station_id)
    }

    pub fn max_level_of(&self, station_id: &str) -> Option<u32> {
        self.station(station_id).map(Station::max_level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Cache,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub schema_version: String,
    pub fetched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SnapshotSource>,
    pub data: HideoutSnapshot,
}

/// Returned by the retrieval layer when neither upstream nor its cache could
/// produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for SnapshotErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Any of the shapes a snapshot document may take.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SnapshotPayload {
    Response(SnapshotResponse),
    Error(SnapshotErrorResponse),
    Bare(HideoutSnapshot),
}

impl SnapshotPayload {
    pub fn is_error(&self) -> bool {
        matches!(self, SnapshotPayload::Error(_))
    }

    pub fn into_snapshot(self) -> Result<HideoutSnapshot, SnapshotErrorResponse> {
        match self {
            SnapshotPayload::Response(response) => Ok(response.data),
            SnapshotPayload::Bare(snapshot) => Ok(snapshot),
            SnapshotPayload::Error(error) => Err(error),
        }
    }
}

pub fn parse_snapshot_payload(json: &str) -> Result<SnapshotPayload, serde_json::Error> {
    serde_json::from_str(json)
}

/// Ordering applied to the flat shopping list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    NeededDesc,
    Alphabetical,
    Category,
}

impl SortMode {
    pub const ALL: [SortMode; 3] = [
        SortMode::NeededDesc,
        SortMode::Alphabetical,
        SortMode::Category,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::NeededDesc => "needed-desc",
            SortMode::Alphabetical => "alphabetical",
            SortMode::Category => "category",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSortMode(pub String);

impl fmt::Display for UnknownSortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown sort mode '{}'", self.0)
    }
}

impl std::error::Error for UnknownSortMode {}

impl FromStr for SortMode {
    type Err = UnknownSortMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SortMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownSortMode(value.to_string()))
    }
}

/// One `(item, quantity)` line deducted by an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRequirementView {
    pub item_id: ItemId,
    pub item_name: String,
    pub item_short_name: String,
    pub icon_link: String,
    pub required_qty: u32,
    pub on_hand_qty: u32,
    pub is_satisfied: bool,
    pub is_money: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationCard {
    pub station_id: StationId,
    pub station_name: String,
    pub image_link: String,
    pub current_level: u32,
    pub max_level: u32,
    pub next_level: Option<u32>,
    pub requirements: Vec<StationRequirementView>,
    pub is_ready_to_upgrade: bool,
}

impl StationCard {
    pub fn is_at_max(&self) -> bool {
        self.next_level.is_none()
    }

    /// Requirement lines an upgrade deducts from on-hand stock. Money is paid
    /// outside the tracker and never deducted.
    pub fn consumable_requirements(&self) -> Vec<ConsumeLine> {
        self.requirements
            .iter()
            .filter(|requirement| !requirement.is_money)
            .map(|requirement| ConsumeLine {
                item_id: requirement.item_id.clone(),
                quantity: requirement.required_qty,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRow {
    pub item_id: ItemId,
    pub name: String,
    pub short_name: String,
    pub icon_link: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub needed_total: u32,
    pub on_hand: u32,
    pub progress_pct: u8,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCategoryGroup {
    pub category_id: CategoryId,
    pub category_name: String,
    pub items: Vec<ItemRow>,
}

/// Every view the presentation layer needs, recomputed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub station_cards: Vec<StationCard>,
    pub item_rows: Vec<ItemRow>,
    pub item_groups: Vec<ItemCategoryGroup>,
}

impl DerivedState {
    pub fn station_card(&self, station_id: &str) -> Option<&StationCard> {
        self.station_cards
            .iter()
            .find(|card| card.station_id == station_id)
    }

    pub fn item_row(&self, item_id: &str) -> Option<&ItemRow> {
        self.item_rows.iter().find(|row| row.item_id == item_id)
    }
}
