//! `SuggestionSource` — the opaque per-source capability (spec §3, §6).

use async_trait::async_trait;

use super::suggestion::{SourceResponse, Suggestion};
use crate::error::Result;

/// A suggestion provider. Stateless from the engine's perspective: sources
/// are supplied by the host, own no engine state, and may be called
/// concurrently for distinct queries.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    /// Stable identifier, used as the key throughout the engine.
    fn component_id(&self) -> &str;
    fn label(&self) -> &str;
    /// Icon shown for this source in the "more" expander.
    fn icon(&self) -> Option<crate::model::suggestion::Icon>;
    /// Minimum query length this source will answer.
    fn query_threshold(&self) -> usize;
    /// Whether the session should still query this source after it has
    /// returned zero results for a prefix of the current query.
    fn query_after_zero_results(&self) -> bool;

    async fn suggest(
        &self,
        query: &str,
        max_results: usize,
        query_limit: usize,
    ) -> Result<SourceResponse>;

    /// Re-validate a previously-clicked shortcut. `None` means the shortcut
    /// should be deleted (the source no longer recognizes it).
    async fn validate_shortcut(&self, shortcut_id: &str) -> Result<Option<Suggestion>>;
}
