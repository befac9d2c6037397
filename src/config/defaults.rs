//! Literal default values for every engine-visible tunable (spec §6).

/// Number of sources shown "above the fold" without expanding "more".
pub const NUM_PROMOTED: usize = 4;
/// Max rows fetched from a non-promoted source once "more" is expanded.
pub const MAX_RESULTS_TO_DISPLAY: usize = 7;
/// Max rows requested per source, promoted or not.
pub const MAX_RESULTS_PER_SOURCE: usize = 58;

/// Soft deadline after which the backer mixes in whatever promoted sources
/// have responded and reveals the "more" section.
pub const PROMOTED_DEADLINE_MS: u64 = 3500;
/// Per-source fan-out timeout; past this the multiplexer reports an empty
/// error response on the source's behalf.
pub const SOURCE_TIMEOUT_MS: u64 = 10_000;
/// How long a prefilled (stale) cursor buffer is shown before being
/// refreshed by the new query's own results.
pub const PREFILL_MS: u64 = 400;

/// Typing-speed heuristic thresholds (spec §4.6).
pub const TYPING_DELAY_LAST_THREE_MS: u64 = 800;
pub const TYPING_DELAY_LAST_TWO_MS: u64 = 500;

/// Minimum spacing between cursor change notifications.
pub const CURSOR_NOTIFY_WINDOW_MS: u64 = 100;

/// Click/impression retention window for shortcut ranking.
pub const MAX_STAT_AGE_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Retention window for per-source CTR log rows.
pub const MAX_SOURCE_EVENT_AGE_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// CTR-ranking priors: cushions sources with tiny sample sizes.
pub const PRIOR_CLICKS: u64 = 3;
pub const PRIOR_IMPRESSIONS: u64 = 30;

/// Sentinel `shortcutId` meaning "never persist this as a shortcut".
pub const NEVER_MAKE_SHORTCUT: &str = "never_make_shortcut";
