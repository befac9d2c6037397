//! C7 — creates and closes sessions, and computes the ordered enabled-source
//! list each new session is built with (spec §4.7).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::aggregation_backer::CorpusEntryFactory;
use crate::config::EngineConfig;
use crate::error::ResultExt;
use crate::model::{SessionStats, Suggestion, SuggestionSource};
use crate::session_engine::{SessionEngine, SessionEngineConfig, SessionQuery};
use crate::shortcut_repository::ShortcutRepository;

/// Everything needed to build fresh sessions; swapped in wholesale by
/// `refresh`.
pub struct SessionManagerConfig {
    pub repo: ShortcutRepository,
    pub sources: Vec<Arc<dyn SuggestionSource>>,
    pub web_source: Option<String>,
    pub go_to_website: Option<Arc<dyn Fn(&str) -> Option<Suggestion> + Send + Sync>>,
    pub search_the_web: Option<Arc<dyn Fn(&str) -> Suggestion + Send + Sync>>,
    pub more_expander: Suggestion,
    pub corpus_entry_factory: CorpusEntryFactory,
    pub cfg: EngineConfig,
}

struct ManagerState {
    config: Option<Arc<SessionManagerConfig>>,
    session: Option<Arc<SessionEngine>>,
}

/// One per process. Lazily creates a `SessionEngine` on the first `query`
/// after construction or after a `refresh`, and lets it go once its last
/// cursor closes.
pub struct SessionManager {
    state: Mutex<ManagerState>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ManagerState { config: None, session: None }),
        })
    }

    /// Replace the active configuration. Any session already in flight
    /// keeps running to completion via its own `Arc` — only the *next*
    /// `query` after this call sees the new sources/config.
    pub fn refresh(&self, config: SessionManagerConfig) {
        let mut state = self.state.lock();
        state.config = Some(Arc::new(config));
        state.session = None;
    }

    /// Route one keystroke to the current (or lazily created) session.
    pub async fn query(self: &Arc<Self>, q: &str) -> SessionQuery {
        let session = self.get_or_create_session();
        session.query(q).await
    }

    /// Cancel any not-yet-fired fan-out and stop routing new queries to the
    /// current session. Cursors already open keep working; this only
    /// prevents starting new background work on this manager's behalf
    /// (SPEC_FULL.md's ambient shutdown hook).
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.session.take() {
            session.cancel_pending();
        }
    }

    fn get_or_create_session(self: &Arc<Self>) -> Arc<SessionEngine> {
        let mut state = self.state.lock();
        if let Some(session) = &state.session {
            return Arc::clone(session);
        }
        let session = self.create_session(&mut state);
        state.session = Some(Arc::clone(&session));
        session
    }

    fn create_session(self: &Arc<Self>, state: &mut ManagerState) -> Arc<SessionEngine> {
        let config = state
            .config
            .clone()
            .expect("SessionManager::refresh must be called before the first query");

        if let Some(web_id) = &config.web_source {
            if let Some(web) = config.sources.iter().find(|s| s.component_id() == web_id.as_str()) {
                let web = Arc::clone(web);
                tokio::spawn(async move {
                    let _ = web.suggest("", 1, 1).await.warn_on_err();
                });
            }
        }

        let ranking = config.repo.get_source_ranking(&config.cfg).log_err().unwrap_or_default();
        let ordered = order_sources(&config.sources, config.web_source.as_deref(), &ranking, config.cfg.num_promoted_sources);

        let repo = config.repo.clone();
        let cfg = config.cfg.clone();
        let manager = Arc::downgrade(self);
        let on_session_closed: Arc<dyn Fn(SessionStats) + Send + Sync> = Arc::new(move |stats: SessionStats| {
            repo.report_stats(&stats, now_ms(), &cfg).log_err();
            if let Some(manager) = manager.upgrade() {
                manager.state.lock().session = None;
            }
        });

        SessionEngine::new(SessionEngineConfig {
            repo: config.repo.clone(),
            sources: ordered,
            web_source: config.web_source.clone(),
            go_to_website: config.go_to_website.clone(),
            search_the_web: config.search_the_web.clone(),
            more_expander: config.more_expander.clone(),
            corpus_entry_factory: Arc::clone(&config.corpus_entry_factory),
            cfg: config.cfg.clone(),
            on_session_closed,
        })
    }
}

/// Web source first, then fill the remaining promoted slots from the
/// ranking, then every enabled source the ranking doesn't know about
/// (preserving their given order), then whatever ranked sources are left
/// over. Deliberately skips the double-counting variant noted in spec §9 —
/// a source is placed exactly once, in the first bucket it qualifies for.
fn order_sources(
    enabled: &[Arc<dyn SuggestionSource>],
    web_source: Option<&str>,
    ranking: &[String],
    num_promoted: usize,
) -> Vec<Arc<dyn SuggestionSource>> {
    let mut ordered = Vec::with_capacity(enabled.len());
    let mut used: HashSet<&str> = HashSet::new();

    if let Some(web_id) = web_source {
        if let Some(web) = enabled.iter().find(|s| s.component_id() == web_id) {
            ordered.push(Arc::clone(web));
            used.insert(web_id);
        } else {
            warn!(web_id, "configured web source is not among the enabled sources");
        }
    }

    for id in ranking {
        if ordered.len() >= num_promoted {
            break;
        }
        if used.contains(id.as_str()) {
            continue;
        }
        if let Some(source) = enabled.iter().find(|s| s.component_id() == id.as_str()) {
            ordered.push(Arc::clone(source));
            used.insert(id.as_str());
        }
    }

    let ranked: HashSet<&str> = ranking.iter().map(|id| id.as_str()).collect();
    for source in enabled {
        let id = source.component_id();
        if used.contains(id) || ranked.contains(id) {
            continue;
        }
        ordered.push(Arc::clone(source));
        used.insert(id);
    }

    for id in ranking {
        if used.contains(id.as_str()) {
            continue;
        }
        if let Some(source) = enabled.iter().find(|s| s.component_id() == id.as_str()) {
            ordered.push(Arc::clone(source));
            used.insert(id.as_str());
        }
    }

    ordered
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
