//! C6 — owns one open typing session: typing-speed heuristic, prefill,
//! per-keystroke orchestration of the cache/backer/multiplexer/refresher,
//! and impression tallying (spec §4.6).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregation_backer::{AggregationBacker, BackerConfig, CorpusEntryFactory, SourceDescriptor};
use crate::config::EngineConfig;
use crate::cursor::{Cursor, CursorRequest, CursorResponse};
use crate::error::ResultExt;
use crate::model::{SessionStats, Shortcut, SourceResponse, Suggestion, SuggestionSource};
use crate::query_multiplexer::{QueryMultiplexer, QueryObserver};
use crate::session_cache::SessionCache;
use crate::shortcut_refresher::{RefreshReceiver, ShortcutRefresher, SourceLookup};
use crate::shortcut_repository::ShortcutRepository;
use crate::typing::TypingWindow;

/// Everything a `SessionEngine` needs that doesn't change for the life of
/// the session.
pub struct SessionEngineConfig {
    pub repo: ShortcutRepository,
    /// Enabled sources, already ordered (web first, then by ranking) per
    /// `SessionManager::order_sources`.
    pub sources: Vec<Arc<dyn SuggestionSource>>,
    pub web_source: Option<String>,
    /// Built-in "go to website" row; `None` if the query doesn't look like
    /// a URL (host policy, not this engine's concern).
    pub go_to_website: Option<Arc<dyn Fn(&str) -> Option<Suggestion> + Send + Sync>>,
    pub search_the_web: Option<Arc<dyn Fn(&str) -> Suggestion + Send + Sync>>,
    pub more_expander: Suggestion,
    pub corpus_entry_factory: CorpusEntryFactory,
    pub cfg: EngineConfig,
    pub on_session_closed: Arc<dyn Fn(SessionStats) + Send + Sync>,
}

struct VecSourceLookup(Vec<Arc<dyn SuggestionSource>>);

impl SourceLookup for VecSourceLookup {
    fn find(&self, component_id: &str) -> Option<Arc<dyn SuggestionSource>> {
        self.0.iter().find(|s| s.component_id() == component_id).cloned()
    }
}

struct BridgeObserver {
    backer: Arc<AggregationBacker>,
    cache: Arc<SessionCache>,
    cursor: Arc<Cursor>,
    query: Arc<str>,
}

#[async_trait::async_trait]
impl QueryObserver for BridgeObserver {
    async fn on_source_query_start(&self, component_id: &str) {
        debug!(component_id, query = %self.query, "source query started");
    }

    async fn on_source_result(&self, response: SourceResponse) {
        self.cache.report_source_result(&self.query, response.clone());
        if self.backer.add_source_result(response) {
            self.cursor.apply_snapshot(self.backer.snapshot(self.cursor.expand_more()));
        }
    }
}

struct BridgeRefreshReceiver {
    backer: Arc<AggregationBacker>,
    cache: Arc<SessionCache>,
    cursor: Arc<Cursor>,
}

#[async_trait::async_trait]
impl RefreshReceiver for BridgeRefreshReceiver {
    async fn on_shortcut_refreshed(&self, component_id: String, shortcut_id: String, refreshed: Option<Suggestion>) {
        self.cache.report_refreshed_shortcut(shortcut_id.clone());
        if self.backer.refresh_shortcut(&component_id, &shortcut_id, refreshed) {
            self.cursor.apply_snapshot(self.backer.snapshot(self.cursor.expand_more()));
        }
    }
}

struct SessionState {
    typing: TypingWindow,
    outstanding: usize,
    clicked: Option<Suggestion>,
    impressions: HashSet<String>,
    previous_cursor_buffer: Option<Vec<Suggestion>>,
    pending: Option<CancellationToken>,
}

/// A live session: survives multiple keystrokes until its last cursor
/// closes.
pub struct SessionEngine {
    config: Arc<SessionEngineConfig>,
    cache: Arc<SessionCache>,
    state: Mutex<SessionState>,
}

/// A single keystroke's cursor, bundled with enough context to interpret
/// click/more/close callbacks against the owning session.
pub struct SessionQuery {
    pub cursor: Arc<Cursor>,
    engine: Arc<SessionEngine>,
    query: Arc<str>,
    backer: Arc<AggregationBacker>,
    additional_sources: Vec<Arc<dyn SuggestionSource>>,
    more_fired: std::sync::atomic::AtomicBool,
}

impl SessionEngine {
    pub fn new(config: SessionEngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            cache: Arc::new(SessionCache::new()),
            state: Mutex::new(SessionState {
                typing: TypingWindow::new(),
                outstanding: 0,
                clicked: None,
                impressions: HashSet::new(),
                previous_cursor_buffer: None,
                pending: None,
            }),
        })
    }

    /// Process one keystroke (spec §4.6's `query(q)` protocol).
    pub async fn query(self: &Arc<Self>, q: &str) -> SessionQuery {
        let now = Instant::now();

        // Step 1: bump outstanding, cancel any not-yet-fired fan-out.
        {
            let mut state = self.state.lock();
            state.outstanding += 1;
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
        }

        // Step 2: typing-speed heuristic.
        let delay = self.state.lock().typing.push(now, &self.config.cfg);

        // Step 3: seed shortcuts from C1, cached results from C5, decide
        // which sources still need querying.
        let cfg = self.config.cfg.clone();
        let shortcuts: Vec<Shortcut> = {
            let repo = self.config.repo.clone();
            let query_owned = q.to_string();
            tokio::task::spawn_blocking(move || repo.get_shortcuts_for_query(&query_owned, now_ms(), &cfg))
                .await
                .expect("blocking task panicked")
                .log_err()
                .unwrap_or_default()
        };

        let enabled_ids: HashSet<&str> = self.config.sources.iter().map(|s| s.component_id()).collect();
        let shortcuts: Vec<Suggestion> = shortcuts
            .into_iter()
            .filter(|s| enabled_ids.contains(s.suggestion.source.as_str()))
            .map(|s| s.suggestion)
            .collect();

        let cached_responses = self.cache.get_source_results(q);
        let cached_sources: HashSet<&str> = cached_responses.iter().map(|r| r.source.as_str()).collect();
        let had_no_cached_or_shortcuts = shortcuts.is_empty() && cached_responses.is_empty();

        let query_len = q.chars().count();
        let sources_to_query: Vec<Arc<dyn SuggestionSource>> = self
            .config
            .sources
            .iter()
            .filter(|s| s.query_threshold() <= query_len.max(1))
            .filter(|s| {
                !self.cache.has_reported_zero_results_for_prefix(q, s.component_id()) || s.query_after_zero_results()
            })
            .filter(|s| !cached_sources.contains(s.component_id()))
            .cloned()
            .collect();

        let num_promoted = self.config.cfg.num_promoted_sources;
        let promoted: Vec<Arc<dyn SuggestionSource>> = sources_to_query.iter().take(num_promoted).cloned().collect();
        let additional_sources: Vec<Arc<dyn SuggestionSource>> =
            sources_to_query.iter().skip(num_promoted).cloned().collect();
        let promoted_ids: HashSet<&str> = promoted.iter().map(|s| s.component_id()).collect();
        let promoted_id_list: Vec<String> = promoted.iter().map(|s| s.component_id().to_string()).collect();

        let descriptors: Vec<SourceDescriptor> = self
            .config
            .sources
            .iter()
            .map(|s| SourceDescriptor {
                component_id: s.component_id().to_string(),
                label: s.label().to_string(),
                icon: s.icon(),
                promoted: promoted_ids.contains(s.component_id()),
            })
            .collect();

        let go_to_website = self.config.go_to_website.as_ref().and_then(|f| (f)(q));
        let search_the_web = self.config.search_the_web.as_ref().map(|f| (f)(q));

        let backer = Arc::new(AggregationBacker::new(BackerConfig {
            query: q.to_string(),
            shortcuts,
            sources: descriptors,
            promoted_sources: promoted_id_list,
            web_source: self.config.web_source.clone(),
            go_to_website,
            search_the_web,
            max_promoted: num_promoted,
            promoted_deadline: Duration::from_millis(self.config.cfg.promoted_deadline_ms),
            more_expander: self.config.more_expander.clone(),
            corpus_entry_factory: self.config.corpus_entry_factory.clone(),
        }));

        for response in cached_responses {
            backer.add_source_result(response);
        }

        let cursor = Arc::new(Cursor::new(Duration::from_millis(self.config.cfg.cursor_notify_window_ms)));
        cursor.apply_snapshot(backer.snapshot(false));

        // Step 7: prefill from the previous cursor if this one starts empty.
        if had_no_cached_or_shortcuts {
            let previous = self.state.lock().previous_cursor_buffer.clone();
            if let Some(previous) = previous.filter(|p| !p.is_empty()) {
                cursor.prefill_from(previous);
                let cursor_for_prefill = Arc::clone(&cursor);
                let backer_for_prefill = Arc::clone(&backer);
                let prefill_ms = self.config.cfg.prefill_ms;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(prefill_ms)).await;
                    let expand = cursor_for_prefill.expand_more();
                    cursor_for_prefill.apply_snapshot(backer_for_prefill.snapshot(expand));
                });
            }
        }

        // Steps 5-6: schedule (or immediately run) the fan-out.
        let token = CancellationToken::new();
        {
            let mut state = self.state.lock();
            state.pending = Some(token.clone());
        }

        let query_arc: Arc<str> = Arc::from(q);
        if delay > Duration::ZERO {
            let engine = Arc::clone(self);
            let backer_task = Arc::clone(&backer);
            let cursor_task = Arc::clone(&cursor);
            let query_task = Arc::clone(&query_arc);
            let promoted_task = promoted.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("pending fan-out cancelled before it fired");
                    }
                    _ = tokio::time::sleep(delay) => {
                        engine.fire(backer_task, cursor_task, query_task, promoted_task).await;
                    }
                }
            });
        } else {
            self.fire(Arc::clone(&backer), Arc::clone(&cursor), Arc::clone(&query_arc), promoted)
                .await;
        }

        SessionQuery {
            cursor,
            engine: Arc::clone(self),
            query: query_arc,
            backer,
            additional_sources,
            more_fired: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Step 6: start the refresher and the promoted fan-out, and schedule
    /// the deadline wake-up so "more" appears even if a promoted source
    /// never responds.
    async fn fire(
        self: &Arc<Self>,
        backer: Arc<AggregationBacker>,
        cursor: Arc<Cursor>,
        query: Arc<str>,
        promoted: Vec<Arc<dyn SuggestionSource>>,
    ) {
        backer.mark_promoted_query_start();

        let lookup = Arc::new(VecSourceLookup(self.config.sources.clone()));
        let refresher = Arc::new(ShortcutRefresher::new(self.config.repo.clone()));
        let refresh_receiver = Arc::new(BridgeRefreshReceiver {
            backer: Arc::clone(&backer),
            cache: Arc::clone(&self.cache),
            cursor: Arc::clone(&cursor),
        });
        let shortcuts_shown: Vec<Shortcut> = cursor
            .handle(CursorRequest::PreClose { max_display_pos: cursor.len() })
            .viewed_or_empty()
            .into_iter()
            .filter(|s| s.shortcut_id.is_some())
            .map(|s| Shortcut { intent_query: query.to_string(), suggestion: s, score: 0.0 })
            .collect();
        refresher.refresh(&shortcuts_shown, usize::MAX, lookup, Arc::clone(&self.cache), refresh_receiver);

        let observer = Arc::new(BridgeObserver {
            backer: Arc::clone(&backer),
            cache: Arc::clone(&self.cache),
            cursor: Arc::clone(&cursor),
            query: Arc::clone(&query),
        });
        let mux = QueryMultiplexer::new();
        let max_results_per_source = self.config.cfg.max_results_per_source;
        mux.send_query(
            Arc::clone(&query),
            promoted,
            max_results_per_source,
            max_results_per_source,
            Duration::from_millis(self.config.cfg.source_timeout_ms),
            observer,
        )
        .await;

        cursor.apply_snapshot(backer.snapshot(cursor.expand_more()));

        let deadline_ms = self.config.cfg.promoted_deadline_ms;
        let cursor_for_deadline = Arc::clone(&cursor);
        let backer_for_deadline = Arc::clone(&backer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(deadline_ms)).await;
            let expand = cursor_for_deadline.expand_more();
            cursor_for_deadline.apply_snapshot(backer_for_deadline.snapshot(expand));
        });
    }

    /// Cancel a not-yet-fired fan-out without waiting for its next
    /// keystroke. Used by `SessionManager::shutdown`.
    pub fn cancel_pending(&self) {
        if let Some(token) = self.state.lock().pending.take() {
            token.cancel();
        }
    }

    fn on_outstanding_drained(&self, query: String) {
        let stats = {
            let mut state = self.state.lock();
            SessionStats {
                query,
                clicked: state.clicked.take(),
                source_impressions: std::mem::take(&mut state.impressions),
            }
        };
        (self.config.on_session_closed)(stats);
    }
}

impl SessionQuery {
    /// `onItemClicked`: remember the clicked suggestion as this session's
    /// eventual `SessionStats.clicked`.
    pub fn on_item_clicked(&self, position: usize) {
        if let CursorResponse::Click { clicked: Some(suggestion), .. } =
            self.cursor.handle(CursorRequest::Click { position })
        {
            self.engine.state.lock().clicked = Some(suggestion);
        }
    }

    /// `onMoreVisible`: fan the additional (non-promoted) sources out with
    /// the display-oriented limits.
    pub fn on_more_visible(&self) {
        if self.additional_sources.is_empty() {
            return;
        }
        if self
            .more_fired
            .compare_exchange(false, true, std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let backer = Arc::clone(&self.backer);
        let cursor = Arc::clone(&self.cursor);
        let cache = Arc::clone(&self.engine.cache);
        let query = Arc::clone(&self.query);
        let additional = self.additional_sources.clone();
        let max_results_to_display = self.engine.config.cfg.max_results_to_display;
        let max_results_per_source = self.engine.config.cfg.max_results_per_source;
        let source_timeout_ms = self.engine.config.cfg.source_timeout_ms;
        tokio::spawn(async move {
            let observer = Arc::new(BridgeObserver { backer, cache, cursor, query: Arc::clone(&query) });
            let mux = QueryMultiplexer::new();
            mux.send_query(
                query,
                additional,
                max_results_to_display,
                max_results_per_source,
                Duration::from_millis(source_timeout_ms),
                observer,
            )
            .await;
        });
    }

    /// `onClose`: tally impressions for everything that was actually shown,
    /// then close out the session once every outstanding query has closed.
    pub fn on_close(&self) {
        let viewed = self
            .cursor
            .handle(CursorRequest::PreClose { max_display_pos: self.cursor.len() })
            .viewed_or_empty();

        let known: HashSet<&str> = self.engine.config.sources.iter().map(|s| s.component_id()).collect();
        let mut impressions = Vec::new();
        for suggestion in &viewed {
            if suggestion.intent_action == "CHANGE_SOURCE" {
                if self.backer.has_reported(&suggestion.intent_data) {
                    impressions.push(suggestion.intent_data.clone());
                }
            } else if known.contains(suggestion.source.as_str()) {
                impressions.push(suggestion.source.clone());
            }
        }

        let buffer = self.cursor.buffer_snapshot();
        let mut state = self.engine.state.lock();
        state.impressions.extend(impressions);
        state.previous_cursor_buffer = Some(buffer);
        state.outstanding = state.outstanding.saturating_sub(1);
        let drained = state.outstanding == 0;
        drop(state);

        if drained {
            self.engine.on_outstanding_drained(self.query.to_string());
        }
    }
}

impl CursorResponse {
    fn viewed_or_empty(&self) -> Vec<Suggestion> {
        match self {
            CursorResponse::PreClose { viewed } => viewed.clone(),
            _ => Vec::new(),
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
