//! Engine configuration — tunables from spec §6.
//!
//! # Module structure
//!
//! - `defaults` — literal constants for every tunable
//! - `types` — `EngineConfig`, the serializable, host-overridable form

pub mod defaults;
mod types;

pub use types::EngineConfig;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

/// Deserialize one field of a JSON config object, falling back to `fallback`
/// (logged at `warn!`) if the field is absent or fails to deserialize —
/// a single bad field never discards its siblings.
fn parse_required_json_field<T>(object: &Map<String, JsonValue>, field: &'static str, fallback: T) -> T
where
    T: DeserializeOwned,
{
    let Some(raw) = object.get(field) else {
        return fallback;
    };
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(field, %error, "engine config field failed validation; using default for this field");
            fallback
        }
    }
}

fn recover_engine_config_from_json(value: JsonValue) -> EngineConfig {
    let Some(object) = value.as_object() else {
        warn!("engine config root is not an object; using defaults");
        return EngineConfig::default();
    };
    let defaults = EngineConfig::default();
    EngineConfig {
        num_promoted_sources: parse_required_json_field(object, "numPromotedSources", defaults.num_promoted_sources),
        max_results_to_display: parse_required_json_field(object, "maxResultsToDisplay", defaults.max_results_to_display),
        max_results_per_source: parse_required_json_field(object, "maxResultsPerSource", defaults.max_results_per_source),
        promoted_deadline_ms: parse_required_json_field(object, "promotedDeadlineMs", defaults.promoted_deadline_ms),
        source_timeout_ms: parse_required_json_field(object, "sourceTimeoutMs", defaults.source_timeout_ms),
        prefill_ms: parse_required_json_field(object, "prefillMs", defaults.prefill_ms),
        typing_delay_last_three_ms: parse_required_json_field(
            object,
            "typingDelayLastThreeMs",
            defaults.typing_delay_last_three_ms,
        ),
        typing_delay_last_two_ms: parse_required_json_field(object, "typingDelayLastTwoMs", defaults.typing_delay_last_two_ms),
        cursor_notify_window_ms: parse_required_json_field(object, "cursorNotifyWindowMs", defaults.cursor_notify_window_ms),
        max_stat_age_ms: parse_required_json_field(object, "maxStatAgeMs", defaults.max_stat_age_ms),
        max_source_event_age_ms: parse_required_json_field(object, "maxSourceEventAgeMs", defaults.max_source_event_age_ms),
        prior_clicks: parse_required_json_field(object, "priorClicks", defaults.prior_clicks),
        prior_impressions: parse_required_json_field(object, "priorImpressions", defaults.prior_impressions),
    }
}

/// Parse an `EngineConfig` from a host-provided JSON blob.
///
/// Each field of the object is validated independently: a single malformed
/// or mistyped field falls back to its default while every other valid
/// field is preserved. Only a non-object root falls back wholesale.
pub fn parse_engine_config(json: &str) -> EngineConfig {
    match serde_json::from_str::<JsonValue>(json) {
        Ok(value) => recover_engine_config_from_json(value),
        Err(error) => {
            warn!(%error, "failed to parse engine config; using defaults");
            EngineConfig::default()
        }
    }
}

/// Deserialize one field of a TOML config table, falling back to `fallback`
/// (logged at `warn!`) if the field is absent or fails to deserialize.
fn parse_required_toml_field<T>(table: &toml::value::Table, field: &'static str, fallback: T) -> T
where
    T: DeserializeOwned,
{
    let Some(raw) = table.get(field) else {
        return fallback;
    };
    match T::deserialize(raw.clone()) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(field, %error, "engine config toml field failed validation; using default for this field");
            fallback
        }
    }
}

fn recover_engine_config_from_toml(value: toml::Value) -> EngineConfig {
    let Some(table) = value.as_table() else {
        warn!("engine config toml root is not a table; using defaults");
        return EngineConfig::default();
    };
    let defaults = EngineConfig::default();
    EngineConfig {
        num_promoted_sources: parse_required_toml_field(table, "numPromotedSources", defaults.num_promoted_sources),
        max_results_to_display: parse_required_toml_field(table, "maxResultsToDisplay", defaults.max_results_to_display),
        max_results_per_source: parse_required_toml_field(table, "maxResultsPerSource", defaults.max_results_per_source),
        promoted_deadline_ms: parse_required_toml_field(table, "promotedDeadlineMs", defaults.promoted_deadline_ms),
        source_timeout_ms: parse_required_toml_field(table, "sourceTimeoutMs", defaults.source_timeout_ms),
        prefill_ms: parse_required_toml_field(table, "prefillMs", defaults.prefill_ms),
        typing_delay_last_three_ms: parse_required_toml_field(
            table,
            "typingDelayLastThreeMs",
            defaults.typing_delay_last_three_ms,
        ),
        typing_delay_last_two_ms: parse_required_toml_field(table, "typingDelayLastTwoMs", defaults.typing_delay_last_two_ms),
        cursor_notify_window_ms: parse_required_toml_field(table, "cursorNotifyWindowMs", defaults.cursor_notify_window_ms),
        max_stat_age_ms: parse_required_toml_field(table, "maxStatAgeMs", defaults.max_stat_age_ms),
        max_source_event_age_ms: parse_required_toml_field(table, "maxSourceEventAgeMs", defaults.max_source_event_age_ms),
        prior_clicks: parse_required_toml_field(table, "priorClicks", defaults.prior_clicks),
        prior_impressions: parse_required_toml_field(table, "priorImpressions", defaults.prior_impressions),
    }
}

/// Parse an `EngineConfig` from a host's TOML config file contents, the
/// on-disk counterpart to [`parse_engine_config`]'s JSON blob. Same
/// per-field fallback discipline: one bad key defaults only itself.
pub fn parse_engine_config_toml(toml_source: &str) -> EngineConfig {
    match toml_source.parse::<toml::Value>() {
        Ok(value) => recover_engine_config_from_toml(value),
        Err(error) => {
            warn!(%error, "failed to parse engine config toml; using defaults");
            EngineConfig::default()
        }
    }
}

/// The host's per-user config file, if the platform has a conventional
/// config directory and the file exists there
/// (`<config_dir>/suggest-core/config.toml`).
pub fn default_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("suggest-core").join("config.toml"))
}

/// Load `EngineConfig` from [`default_config_path`], falling back to
/// defaults if the platform has no config directory, the file doesn't
/// exist, or it can't be read.
pub fn load_default_engine_config() -> EngineConfig {
    let Some(path) = default_config_path() else {
        return EngineConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(source) => parse_engine_config_toml(&source),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
        Err(error) => {
            warn!(%error, path = %path.display(), "failed to read engine config file; using defaults");
            EngineConfig::default()
        }
    }
}
