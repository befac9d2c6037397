//! C5 — per-session memo of what's already been asked and answered
//! (spec §4.5). An `LruCache` behind a single mutex bounds memory use for
//! long sessions instead of the original's weak-reference cache.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::model::SourceResponse;

const RESULTS_CACHE_CAPACITY: usize = 64;

struct Inner {
    /// query -> set of componentIds that returned zero results for it.
    zero_result_sources: std::collections::HashMap<String, HashSet<String>>,
    /// query -> that query's per-source responses, insertion-ordered.
    results_cache: LruCache<String, Vec<SourceResponse>>,
    refreshed_shortcuts: HashSet<String>,
}

/// Caches per-query, per-source results and zero-result/refresh bookkeeping
/// for the lifetime of one session. Not durable across sessions.
pub struct SessionCache {
    inner: Mutex<Inner>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                zero_result_sources: std::collections::HashMap::new(),
                results_cache: LruCache::new(NonZeroUsize::new(RESULTS_CACHE_CAPACITY).unwrap()),
                refreshed_shortcuts: HashSet::new(),
            }),
        }
    }

    /// Has `component_id` already told us it has nothing for some strict
    /// prefix of `query`? If a source returned zero results for "piz", it's
    /// also known to have nothing for "pizz" — used to skip re-querying a
    /// source that is known to be `query_after_zero_results = false`.
    pub fn has_reported_zero_results_for_prefix(&self, query: &str, component_id: &str) -> bool {
        let inner = self.inner.lock();
        query
            .char_indices()
            .skip(1)
            .map(|(i, _)| &query[..i])
            .chain(std::iter::once(query))
            .any(|prefix| {
                inner
                    .zero_result_sources
                    .get(prefix)
                    .is_some_and(|set| set.contains(component_id))
            })
    }

    /// Has this shortcut already been sent for a background refresh this
    /// session?
    pub fn has_shortcut_been_refreshed(&self, shortcut_id: &str) -> bool {
        self.inner.lock().refreshed_shortcuts.contains(shortcut_id)
    }

    /// The last cached response from `component_id` for `query`, if any.
    pub fn get_source_result(&self, query: &str, component_id: &str) -> Option<SourceResponse> {
        let mut inner = self.inner.lock();
        inner
            .results_cache
            .get(query)
            .and_then(|by_source| by_source.iter().find(|r| r.source == component_id))
            .cloned()
    }

    /// All cached responses for `query`, in the order sources first reported.
    pub fn get_source_results(&self, query: &str) -> Vec<SourceResponse> {
        let mut inner = self.inner.lock();
        inner.results_cache.get(query).cloned().unwrap_or_default()
    }

    /// Record a source's response. Error responses are never cached — a
    /// failed/timed-out source must be retried on the next keystroke rather
    /// than permanently remembered as empty.
    pub fn report_source_result(&self, query: &str, response: SourceResponse) {
        if !response.is_ok() {
            return;
        }
        let mut inner = self.inner.lock();
        if response.suggestions.is_empty() {
            inner
                .zero_result_sources
                .entry(query.to_string())
                .or_default()
                .insert(response.source.clone());
        }
        let by_source = inner.results_cache.get_or_insert_mut(query.to_string(), Vec::new);
        if let Some(existing) = by_source.iter_mut().find(|r| r.source == response.source) {
            *existing = response;
        } else {
            by_source.push(response);
        }
    }

    pub fn report_refreshed_shortcut(&self, shortcut_id: impl Into<String>) {
        self.inner.lock().refreshed_shortcuts.insert(shortcut_id.into());
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultCode;

    fn ok_response(source: &str, suggestions: Vec<crate::model::Suggestion>) -> SourceResponse {
        SourceResponse {
            source: source.to_string(),
            count: suggestions.len(),
            query_limit: 10,
            suggestions,
            result_code: ResultCode::Ok,
        }
    }

    #[test]
    fn error_responses_are_never_cached() {
        let cache = SessionCache::new();
        cache.report_source_result("piz", SourceResponse::empty_error("maps"));
        assert!(cache.get_source_result("piz", "maps").is_none());
        assert!(!cache.has_reported_zero_results_for_prefix("piz", "maps"));
    }

    #[test]
    fn zero_result_sources_are_tracked_per_query() {
        let cache = SessionCache::new();
        cache.report_source_result("piz", ok_response("maps", vec![]));
        assert!(cache.has_reported_zero_results_for_prefix("piz", "maps"));
        // "piz" is a strict prefix of "pizz", so a longer keystroke of the
        // same query still counts as already zero-reported.
        assert!(cache.has_reported_zero_results_for_prefix("pizz", "maps"));
        assert!(!cache.has_reported_zero_results_for_prefix("pi", "maps"));
    }

    #[test]
    fn results_round_trip_by_query_and_source() {
        let cache = SessionCache::new();
        let response = ok_response("maps", vec![]);
        cache.report_source_result("piz", response.clone());
        assert_eq!(cache.get_source_result("piz", "maps"), Some(response));
        assert!(cache.get_source_result("piz", "web").is_none());
    }

    #[test]
    fn refreshed_shortcuts_are_tracked() {
        let cache = SessionCache::new();
        assert!(!cache.has_shortcut_been_refreshed("sc1"));
        cache.report_refreshed_shortcut("sc1");
        assert!(cache.has_shortcut_been_refreshed("sc1"));
    }
}
