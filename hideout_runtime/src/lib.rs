//! Shared runtime utilities for the hideout tracker.
//!
//! Re-exports the data contracts from `hideout_schema` and adds helpers that
//! operate on them (driver commands and their text form) without depending on
//! the Bevy runtime in `hideout_core`.

pub use hideout_schema::*;

mod command_text;
mod commands;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::{CommandPayload, ResetScope, ViewKind};
