//! Durable and session-scoped records: `Shortcut`, click/source logs,
//! aggregate totals, and the per-keystroke snapshot the UI reads
//! (spec §3).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::suggestion::Suggestion;

/// A `Suggestion` persisted because the user clicked it, together with the
/// query it was clicked under and the click timestamp.
///
/// Identity: `source#intentData#intentAction#intentQuery` — see
/// [`crate::intent_key::intent_key`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shortcut {
    pub suggestion: Suggestion,
    pub intent_query: String,
    /// Decayed CTR-style score at read time (not persisted — see
    /// SPEC_FULL.md's "frecency-flavored explanation fields").
    #[serde(skip_serializing, default)]
    pub score: f64,
}

/// Append-only click record.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub intent_key: String,
    pub query: String,
    pub hit_time_ms: i64,
}

/// One row per source per closed session.
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub component_id: String,
    pub time_ms: i64,
    pub clicks: u32,
    pub impressions: u32,
}

/// Aggregate `{component_id, total_clicks, total_impressions}`, derived from
/// `SourceEvent` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTotals {
    pub component_id: String,
    pub total_clicks: u64,
    pub total_impressions: u64,
    /// CTR ranking score at read time (see [`crate::config::defaults::PRIOR_CLICKS`]).
    pub ranking_score: f64,
}

/// Produced once per closed session, reported to `ShortcutRepository`.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub query: String,
    pub clicked: Option<Suggestion>,
    pub source_impressions: HashSet<String>,
}

/// The ordered list of suggestions returned to the UI at a given moment,
/// plus the "more" section's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotFrame {
    pub suggestions: Vec<Suggestion>,
    pub is_pending: bool,
    pub is_showing_more: bool,
    pub more_index: usize,
}

/// One row in the "more" expander, describing a single source's
/// contribution (spec §4.2's `SourceStat`).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStat {
    pub component_id: String,
    pub promoted: bool,
    pub label: String,
    pub icon: Option<super::suggestion::Icon>,
    pub responded: bool,
    pub num_undisplayed_results: usize,
    pub query_limit: usize,
}
