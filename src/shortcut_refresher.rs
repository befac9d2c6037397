//! C4 — background re-validation of shortcuts shown from history, so a
//! stale shortcut (its source no longer recognizes it) gets cleaned up
//! before the user clicks it (spec §4.4).

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ResultExt;
use crate::model::{Shortcut, SuggestionSource};
use crate::shortcut_repository::ShortcutRepository;

/// Notified once a shortcut's refresh completes, so the session can fold the
/// (possibly updated, possibly deleted) result into its live snapshot.
#[async_trait::async_trait]
pub trait RefreshReceiver: Send + Sync {
    async fn on_shortcut_refreshed(
        &self,
        component_id: String,
        shortcut_id: String,
        refreshed: Option<crate::model::Suggestion>,
    );
}

/// Looks up the live `SuggestionSource` for a shortcut's `component_id`.
/// The refresher never owns sources directly — the session does.
pub trait SourceLookup: Send + Sync {
    fn find(&self, component_id: &str) -> Option<Arc<dyn SuggestionSource>>;
}

/// Schedules at most `max_to_refresh` shortcuts for background
/// revalidation, one task per shortcut.
pub struct ShortcutRefresher {
    repo: ShortcutRepository,
    token: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ShortcutRefresher {
    pub fn new(repo: ShortcutRepository) -> Self {
        Self {
            repo,
            token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn one task per shortcut in `shortcuts`, skipping any that
    /// `cache` already marked refreshed this session. A shortcut whose
    /// `component_id` isn't resolvable is purged rather than revalidated.
    /// At most `max_to_refresh` tasks are spawned.
    pub fn refresh(
        &self,
        shortcuts: &[Shortcut],
        max_to_refresh: usize,
        lookup: Arc<dyn SourceLookup>,
        cache: Arc<crate::session_cache::SessionCache>,
        receiver: Arc<dyn RefreshReceiver>,
    ) {
        let mut tasks = self.tasks.lock();
        for shortcut in shortcuts.iter().take(max_to_refresh) {
            let shortcut_id = match &shortcut.suggestion.shortcut_id {
                Some(id) if !cache.has_shortcut_been_refreshed(id) => id.clone(),
                _ => continue,
            };
            let component_id = shortcut.suggestion.source.clone();
            let repo = self.repo.clone();
            let token = self.token.clone();
            let receiver = Arc::clone(&receiver);
            let cache = Arc::clone(&cache);
            let shortcut_id_for_task = shortcut_id.clone();

            let Some(source) = lookup.find(&component_id) else {
                debug!(component_id, "no live source for shortcut, purging it");
                let handle = tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = async {
                            if repo.refresh_shortcut(&component_id, &shortcut_id_for_task, None).log_err().is_some() {
                                cache.report_refreshed_shortcut(shortcut_id_for_task.clone());
                                receiver.on_shortcut_refreshed(component_id, shortcut_id_for_task, None).await;
                            }
                        } => {}
                    }
                });
                tasks.push(handle);
                continue;
            };

            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    result = source.validate_shortcut(&shortcut_id_for_task) => {
                        if let Some(refreshed) = result.warn_on_err() {
                            if repo
                                .refresh_shortcut(&component_id, &shortcut_id_for_task, refreshed.as_ref())
                                .log_err()
                                .is_some()
                            {
                                cache.report_refreshed_shortcut(shortcut_id_for_task.clone());
                                receiver.on_shortcut_refreshed(component_id, shortcut_id_for_task, refreshed).await;
                            }
                        }
                    }
                }
            });
            tasks.push(handle);
        }
    }

    /// Cancel all outstanding refresh tasks. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
