//! `EngineConfig`: the serializable form of every tunable in spec §6.

use serde::{Deserialize, Serialize};

use super::defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_num_promoted")]
    pub num_promoted_sources: usize,
    #[serde(default = "default_max_results_to_display")]
    pub max_results_to_display: usize,
    #[serde(default = "default_max_results_per_source")]
    pub max_results_per_source: usize,

    #[serde(default = "default_promoted_deadline_ms")]
    pub promoted_deadline_ms: u64,
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_prefill_ms")]
    pub prefill_ms: u64,

    #[serde(default = "default_typing_delay_last_three_ms")]
    pub typing_delay_last_three_ms: u64,
    #[serde(default = "default_typing_delay_last_two_ms")]
    pub typing_delay_last_two_ms: u64,
    #[serde(default = "default_cursor_notify_window_ms")]
    pub cursor_notify_window_ms: u64,

    #[serde(default = "default_max_stat_age_ms")]
    pub max_stat_age_ms: u64,
    #[serde(default = "default_max_source_event_age_ms")]
    pub max_source_event_age_ms: u64,
    #[serde(default = "default_prior_clicks")]
    pub prior_clicks: u64,
    #[serde(default = "default_prior_impressions")]
    pub prior_impressions: u64,
}

fn default_num_promoted() -> usize {
    NUM_PROMOTED
}
fn default_max_results_to_display() -> usize {
    MAX_RESULTS_TO_DISPLAY
}
fn default_max_results_per_source() -> usize {
    MAX_RESULTS_PER_SOURCE
}
fn default_promoted_deadline_ms() -> u64 {
    PROMOTED_DEADLINE_MS
}
fn default_source_timeout_ms() -> u64 {
    SOURCE_TIMEOUT_MS
}
fn default_prefill_ms() -> u64 {
    PREFILL_MS
}
fn default_typing_delay_last_three_ms() -> u64 {
    TYPING_DELAY_LAST_THREE_MS
}
fn default_typing_delay_last_two_ms() -> u64 {
    TYPING_DELAY_LAST_TWO_MS
}
fn default_cursor_notify_window_ms() -> u64 {
    CURSOR_NOTIFY_WINDOW_MS
}
fn default_max_stat_age_ms() -> u64 {
    MAX_STAT_AGE_MS
}
fn default_max_source_event_age_ms() -> u64 {
    MAX_SOURCE_EVENT_AGE_MS
}
fn default_prior_clicks() -> u64 {
    PRIOR_CLICKS
}
fn default_prior_impressions() -> u64 {
    PRIOR_IMPRESSIONS
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_promoted_sources: NUM_PROMOTED,
            max_results_to_display: MAX_RESULTS_TO_DISPLAY,
            max_results_per_source: MAX_RESULTS_PER_SOURCE,
            promoted_deadline_ms: PROMOTED_DEADLINE_MS,
            source_timeout_ms: SOURCE_TIMEOUT_MS,
            prefill_ms: PREFILL_MS,
            typing_delay_last_three_ms: TYPING_DELAY_LAST_THREE_MS,
            typing_delay_last_two_ms: TYPING_DELAY_LAST_TWO_MS,
            cursor_notify_window_ms: CURSOR_NOTIFY_WINDOW_MS,
            max_stat_age_ms: MAX_STAT_AGE_MS,
            max_source_event_age_ms: MAX_SOURCE_EVENT_AGE_MS,
            prior_clicks: PRIOR_CLICKS,
            prior_impressions: PRIOR_IMPRESSIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.num_promoted_sources, 4);
        assert_eq!(cfg.max_results_to_display, 7);
        assert_eq!(cfg.max_results_per_source, 58);
        assert_eq!(cfg.promoted_deadline_ms, 3500);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: EngineConfig = serde_json::from_str("{}").expect("empty object should parse");
        assert_eq!(parsed, EngineConfig::default());
    }
}
