use hideout_schema::{ItemId, SortMode, StationId};

/// Which half of the progress state a reset clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Station levels together with station exclusions.
    StationLevels,
    OnHand,
}

/// Derived views a driver can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Stations,
    Items,
    Groups,
    Metrics,
}

/// Driver commands understood by the tracker binary.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    SetOnHand { item_id: ItemId, quantity: f64 },
    AdjustOnHand { item_id: ItemId, delta: f64 },
    SetStationLevel { station_id: StationId, level: f64 },
    Upgrade { station_id: StationId },
    ToggleExclusion { station_id: StationId },
    Reset(ResetScope),
    Sort(SortMode),
    Show(ViewKind),
    Hidden,
    Visible,
    Flush,
    Quit,
}

impl CommandPayload {
    /// True for commands that change progress state.
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            CommandPayload::SetOnHand { .. }
                | CommandPayload::AdjustOnHand { .. }
                | CommandPayload::SetStationLevel { .. }
                | CommandPayload::Upgrade { .. }
                | CommandPayload::ToggleExclusion { .. }
                | CommandPayload::Reset(_)
        )
    }
}
