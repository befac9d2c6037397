//! suggest-core - federated, incrementally-refined search-suggestion
//! aggregation engine.
//!
//! A host process owns the UI, the set of `SuggestionSource` providers, and
//! process bootstrap (logging subscriber, config file location); this crate
//! owns everything between a keystroke and the ordered, de-duplicated list
//! of suggestions shown for it: shortcut history (`shortcut_repository`),
//! per-session caching (`session_cache`), the round-robin mixing/deadline
//! state machine (`aggregation_backer`), concurrent per-source fan-out
//! (`query_multiplexer`), background shortcut revalidation
//! (`shortcut_refresher`), the UI-facing read model (`cursor`), and the
//! per-keystroke/per-process orchestration tying them together
//! (`session_engine`, `session_manager`).

pub mod aggregation_backer;
pub mod config;
pub mod cursor;
pub mod error;
pub mod intent_key;
pub mod logging;
pub mod model;
pub mod query_multiplexer;
pub mod session_cache;
pub mod session_engine;
pub mod session_manager;
pub mod shortcut_refresher;
pub mod shortcut_repository;
pub mod typing;

pub use config::EngineConfig;
pub use error::{Result, SuggestError};
pub use model::{Icon, ResultCode, SourceResponse, SourceStat, Suggestion, SuggestionSource};
pub use session_manager::{SessionManager, SessionManagerConfig};
