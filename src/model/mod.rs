//! Core data model (spec §3).

mod source;
mod stats;
mod suggestion;

pub use source::SuggestionSource;
pub use stats::{ClickEvent, SessionStats, Shortcut, SnapshotFrame, SourceEvent, SourceStat, SourceTotals};
pub use suggestion::{effective_intent_data, Icon, ResultCode, SourceResponse, Suggestion};
