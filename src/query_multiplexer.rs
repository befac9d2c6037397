//! C3 — concurrent fan-out of one query to many sources, each bounded by
//! its own timeout (spec §4.3).
//!
//! One `tokio::spawn` per source, `tokio::time::timeout` for the per-source
//! deadline, and a `tokio_util::sync::CancellationToken` for cooperative
//! cancellation of the whole fan-out.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{SourceResponse, SuggestionSource};

/// Callbacks the multiplexer drives as each source starts and finishes.
/// `on_source_query_start` for a given source always fires strictly before
/// its matching `on_source_result`.
#[async_trait::async_trait]
pub trait QueryObserver: Send + Sync {
    async fn on_source_query_start(&self, component_id: &str);
    async fn on_source_result(&self, response: SourceResponse);
}

/// Fans one query out to a set of sources concurrently, applying a
/// per-source timeout and reporting results through a [`QueryObserver`] as
/// they land — not collected into a batch.
pub struct QueryMultiplexer {
    token: CancellationToken,
}

impl QueryMultiplexer {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel all in-flight work started by this multiplexer. Safe to call
    /// more than once; later calls are no-ops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fan `query` out to `sources`, each given at most `max_results` /
    /// `query_limit`, honoring `source_timeout`. Returns once every source
    /// has either responded, timed out, or the multiplexer was cancelled.
    pub async fn send_query(
        &self,
        query: Arc<str>,
        sources: Vec<Arc<dyn SuggestionSource>>,
        max_results: usize,
        query_limit: usize,
        source_timeout: Duration,
        observer: Arc<dyn QueryObserver>,
    ) {
        let mut handles = Vec::with_capacity(sources.len());
        for source in sources {
            let query = Arc::clone(&query);
            let observer = Arc::clone(&observer);
            let token = self.token.clone();
            let component_id = source.component_id().to_string();

            observer.on_source_query_start(&component_id).await;

            let handle = tokio::spawn(async move {
                let fut = source.suggest(&query, max_results, query_limit);
                let response = tokio::select! {
                    _ = token.cancelled() => {
                        debug!(component_id, "source query cancelled");
                        return;
                    }
                    result = tokio::time::timeout(source_timeout, fut) => result,
                };

                let response = match response {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => {
                        warn!(component_id, error = %err, "source returned an error");
                        SourceResponse::empty_error(component_id.clone())
                    }
                    Err(_) => {
                        warn!(component_id, timeout_ms = source_timeout.as_millis(), "source timed out");
                        SourceResponse::empty_error(component_id.clone())
                    }
                };
                observer.on_source_result(response).await;
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for QueryMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::model::{ResultCode, Suggestion};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct FakeSource {
        id: &'static str,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl SuggestionSource for FakeSource {
        fn component_id(&self) -> &str {
            self.id
        }
        fn label(&self) -> &str {
            self.id
        }
        fn icon(&self) -> Option<crate::model::Icon> {
            None
        }
        fn query_threshold(&self) -> usize {
            0
        }
        fn query_after_zero_results(&self) -> bool {
            true
        }
        async fn suggest(&self, query: &str, _max_results: usize, query_limit: usize) -> Result<SourceResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(SourceResponse {
                source: self.id.to_string(),
                suggestions: vec![Suggestion {
                    source: self.id.to_string(),
                    format: None,
                    title: query.to_string(),
                    description: None,
                    icon1: None,
                    icon2: None,
                    intent_action: "VIEW".to_string(),
                    intent_data: "x".to_string(),
                    intent_data_id: None,
                    intent_extra_data: None,
                    intent_component_name: None,
                    query: Some(query.to_string()),
                    action_msg_call: None,
                    shortcut_id: None,
                    pin_to_bottom: false,
                    spinner_while_refreshing: false,
                    background_color: None,
                }],
                count: 1,
                query_limit,
                result_code: ResultCode::Ok,
            })
        }
        async fn validate_shortcut(&self, _shortcut_id: &str) -> Result<Option<Suggestion>> {
            Ok(None)
        }
    }

    struct RecordingObserver {
        starts: Mutex<Vec<String>>,
        results: Mutex<Vec<SourceResponse>>,
        done: Notify,
        expected: AtomicUsize,
    }

    impl RecordingObserver {
        fn new(expected: usize) -> Self {
            Self {
                starts: Mutex::new(Vec::new()),
                results: Mutex::new(Vec::new()),
                done: Notify::new(),
                expected: AtomicUsize::new(expected),
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryObserver for RecordingObserver {
        async fn on_source_query_start(&self, component_id: &str) {
            self.starts.lock().unwrap().push(component_id.to_string());
        }
        async fn on_source_result(&self, response: SourceResponse) {
            self.results.lock().unwrap().push(response);
            if self.results.lock().unwrap().len() == self.expected.load(Ordering::SeqCst) {
                self.done.notify_one();
            }
        }
    }

    #[tokio::test]
    async fn fans_out_and_reports_each_source_once() {
        let mux = QueryMultiplexer::new();
        let observer = Arc::new(RecordingObserver::new(2));
        let sources: Vec<Arc<dyn SuggestionSource>> = vec![
            Arc::new(FakeSource { id: "a", delay: Duration::from_millis(1) }),
            Arc::new(FakeSource { id: "b", delay: Duration::from_millis(2) }),
        ];

        mux.send_query(
            Arc::from("piz"),
            sources,
            10,
            10,
            Duration::from_secs(1),
            observer.clone(),
        )
        .await;

        let starts = observer.starts.lock().unwrap();
        assert_eq!(starts.len(), 2);
        let results = observer.results.lock().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn slow_source_times_out_with_empty_error_response() {
        let mux = QueryMultiplexer::new();
        let observer = Arc::new(RecordingObserver::new(1));
        let sources: Vec<Arc<dyn SuggestionSource>> =
            vec![Arc::new(FakeSource { id: "slow", delay: Duration::from_millis(50) })];

        mux.send_query(
            Arc::from("q"),
            sources,
            10,
            10,
            Duration::from_millis(5),
            observer.clone(),
        )
        .await;

        let results = observer.results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_ok());
        assert!(results[0].suggestions.is_empty());
    }

    #[tokio::test]
    async fn cancel_prevents_pending_results_from_being_reported() {
        let mux = QueryMultiplexer::new();
        let observer = Arc::new(RecordingObserver::new(0));
        let sources: Vec<Arc<dyn SuggestionSource>> =
            vec![Arc::new(FakeSource { id: "slow", delay: Duration::from_secs(10) })];

        let query = Arc::from("q");
        let send = mux.send_query(query, sources, 10, 10, Duration::from_secs(30), observer.clone());
        tokio::pin!(send);

        tokio::select! {
            _ = &mut send => {}
            _ = tokio::time::sleep(Duration::from_millis(10)) => {
                mux.cancel();
            }
        }
        send.await;

        assert!(observer.results.lock().unwrap().is_empty());
    }
}
