use std::num::ParseFloatError;

use thiserror::Error;

use crate::{CommandPayload, ResetScope, SortMode, UnknownSortMode, ViewKind};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid number '{value}' for {context}: {source}")]
    InvalidNumber {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error("invalid reset scope '{0}'")]
    InvalidResetScope(String),
    #[error(transparent)]
    InvalidSortMode(#[from] UnknownSortMode),
}

pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "set" => {
            let item_id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("item"))?;
            let quantity_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("quantity"))?;
            let quantity = parse_number(quantity_str, "on-hand quantity")?;
            Ok(CommandPayload::SetOnHand {
                item_id: item_id.to_string(),
                quantity,
            })
        }
        "adjust" | "add" => {
            let item_id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("item"))?;
            let delta_str = parts.next().unwrap_or("1");
            let delta = parse_number(delta_str, "on-hand delta")?;
            Ok(CommandPayload::AdjustOnHand {
                item_id: item_id.to_string(),
                delta,
            })
        }
        "level" => {
            let station_id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("station"))?;
            let level_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("level"))?;
            let level = parse_number(level_str, "station level")?;
            Ok(CommandPayload::SetStationLevel {
                station_id: station_id.to_string(),
                level,
            })
        }
        "upgrade" => {
            let station_id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("station"))?;
            Ok(CommandPayload::Upgrade {
                station_id: station_id.to_string(),
            })
        }
        "exclude" | "include" => {
            let station_id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("station"))?;
            Ok(CommandPayload::ToggleExclusion {
                station_id: station_id.to_string(),
            })
        }
        "reset" => {
            let scope_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("scope"))?
                .to_ascii_lowercase();
            let scope = match scope_str.as_str() {
                "levels" | "stations" => ResetScope::StationLevels,
                "items" | "onhand" | "on-hand" => ResetScope::OnHand,
                other => return Err(CommandParseError::InvalidResetScope(other.to_string())),
            };
            Ok(CommandPayload::Reset(scope))
        }
        "sort" => {
            let mode_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("mode"))?;
            let mode: SortMode = mode_str.parse()?;
            Ok(CommandPayload::Sort(mode))
        }
        "stations" => Ok(CommandPayload::Show(ViewKind::Stations)),
        "items" => Ok(CommandPayload::Show(ViewKind::Items)),
        "groups" => Ok(CommandPayload::Show(ViewKind::Groups)),
        "metrics" => Ok(CommandPayload::Show(ViewKind::Metrics)),
        "hide" => Ok(CommandPayload::Hidden),
        "show" => Ok(CommandPayload::Visible),
        "flush" => Ok(CommandPayload::Flush),
        "quit" | "exit" => Ok(CommandPayload::Quit),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_number(value: &str, context: &'static str) -> Result<f64, CommandParseError> {
    value
        .parse::<f64>()
        .map_err(|source| CommandParseError::InvalidNumber {
            value: value.to_string(),
            context,
            source,
        })
}
