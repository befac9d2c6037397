//! C2 — the ordering/mixing state machine that turns partial, out-of-order
//! source responses into a stable, de-duplicated snapshot under a soft
//! deadline (spec §4.2).
//!
//! All mutating operations and `snapshot` serialize on one internal lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::{SnapshotFrame, SourceResponse, SourceStat, Suggestion};

/// Static description of one source known to a session, ordered the way
/// the "more" expander should list it.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub component_id: String,
    pub label: String,
    pub icon: Option<crate::model::Icon>,
    pub promoted: bool,
}

/// Builds the corpus-entry row for one source's "more" listing.
pub type CorpusEntryFactory = Arc<dyn Fn(&SourceStat) -> Suggestion + Send + Sync>;

/// Construction-time inputs for one query's backer (spec §4.2).
pub struct BackerConfig {
    pub query: String,
    pub shortcuts: Vec<Suggestion>,
    /// All sources the session considers, in "more" listing order.
    pub sources: Vec<SourceDescriptor>,
    /// Subset of `sources.component_id`, `len <= max_promoted`, in
    /// round-robin order.
    pub promoted_sources: Vec<String>,
    pub web_source: Option<String>,
    pub go_to_website: Option<Suggestion>,
    pub search_the_web: Option<Suggestion>,
    pub max_promoted: usize,
    pub promoted_deadline: Duration,
    pub more_expander: Suggestion,
    pub corpus_entry_factory: CorpusEntryFactory,
}

struct Inner {
    shortcuts: Vec<Suggestion>,
    /// componentId -> response, insertion-ordered.
    reported_results: Vec<(String, SourceResponse)>,
    reported_before_deadline: HashSet<String>,
    pin_to_bottom: Option<Suggestion>,
    pin_source: Option<String>,
    promoted_query_start: Instant,
    last_is_showing_more: bool,
    last_more_index: usize,
}

pub struct AggregationBacker {
    sources: Vec<SourceDescriptor>,
    promoted_sources: Vec<String>,
    web_source: Option<String>,
    go_to_website: Option<Suggestion>,
    search_the_web: Option<Suggestion>,
    max_promoted: usize,
    promoted_deadline: Duration,
    more_expander: Suggestion,
    corpus_entry_factory: CorpusEntryFactory,
    inner: Mutex<Inner>,
}

impl AggregationBacker {
    pub fn new(config: BackerConfig) -> Self {
        assert!(
            config.promoted_sources.len() <= config.max_promoted,
            "promoted source count must not exceed max_promoted"
        );
        Self {
            sources: config.sources,
            promoted_sources: config.promoted_sources,
            web_source: config.web_source,
            go_to_website: config.go_to_website,
            search_the_web: config.search_the_web,
            max_promoted: config.max_promoted,
            promoted_deadline: config.promoted_deadline,
            more_expander: config.more_expander,
            corpus_entry_factory: config.corpus_entry_factory,
            inner: Mutex::new(Inner {
                shortcuts: config.shortcuts,
                reported_results: Vec::new(),
                reported_before_deadline: HashSet::new(),
                pin_to_bottom: None,
                pin_source: None,
                promoted_query_start: Instant::now(),
                last_is_showing_more: false,
                last_more_index: 0,
            }),
        }
    }

    /// Mark the start of the promoted fan-out; the deadline is measured
    /// from this instant.
    pub fn mark_promoted_query_start(&self) {
        self.inner.lock().promoted_query_start = Instant::now();
    }

    #[cfg(test)]
    fn backdate_promoted_query_start(&self, ago: Duration) {
        self.inner.lock().promoted_query_start = Instant::now() - ago;
    }

    /// Record one source's response. Returns `true` if the snapshot may
    /// have meaningfully changed (spec §4.2's `addSourceResult`).
    pub fn add_source_result(&self, mut response: SourceResponse) -> bool {
        let mut inner = self.inner.lock();

        if Some(response.source.as_str()) == self.web_source.as_deref() {
            if let Some(last) = response.suggestions.last() {
                if last.pin_to_bottom {
                    inner.pin_to_bottom = response.suggestions.pop();
                    inner.pin_source = Some(response.source.clone());
                }
            }
        }

        let elapsed = inner.promoted_query_start.elapsed();
        let past_deadline = elapsed >= self.promoted_deadline;
        if !past_deadline {
            inner.reported_before_deadline.insert(response.source.clone());
        }
        let changed = past_deadline || !response.suggestions.is_empty();

        if let Some(existing) = inner.reported_results.iter_mut().find(|(id, _)| *id == response.source) {
            existing.1 = response;
        } else {
            inner.reported_results.push((response.source.clone(), response));
        }
        changed
    }

    /// Replace (or, if revalidation came back empty, drop) a shortcut after
    /// a background revalidation (spec §4.2's `refreshShortcut`).
    pub fn refresh_shortcut(&self, source: &str, shortcut_id: &str, refreshed: Option<Suggestion>) -> bool {
        let mut inner = self.inner.lock();
        let position = inner
            .shortcuts
            .iter()
            .position(|s| s.source == source && s.shortcut_id.as_deref() == Some(shortcut_id));
        match (position, refreshed) {
            (Some(pos), Some(updated)) => {
                inner.shortcuts[pos] = updated;
                true
            }
            (Some(pos), None) => {
                inner.shortcuts.remove(pos);
                true
            }
            (None, _) => false,
        }
    }

    /// `true` while fewer promoted sources have reported than there are
    /// promoted sources.
    pub fn is_results_pending(&self) -> bool {
        let inner = self.inner.lock();
        inner.reported_results.len() < self.promoted_sources.len()
    }

    /// `true` once `component_id` has reported a response this query,
    /// regardless of whether it returned any suggestions.
    pub fn has_reported(&self, component_id: &str) -> bool {
        let inner = self.inner.lock();
        inner.reported_results.iter().any(|(id, _)| id == component_id)
    }

    pub fn is_showing_more(&self) -> bool {
        self.inner.lock().last_is_showing_more
    }

    pub fn more_index(&self) -> usize {
        self.inner.lock().last_more_index
    }

    /// Materialize the current mixed, de-duplicated, ordered view.
    pub fn snapshot(&self, expand_more: bool) -> SnapshotFrame {
        let mut inner = self.inner.lock();
        let mut dest = Vec::new();

        if let Some(go_to_website) = &self.go_to_website {
            dest.push(go_to_website.clone());
        }

        let mut dedup: HashSet<(String, String)> = HashSet::new();
        for shortcut in &inner.shortcuts {
            dedup.insert((shortcut.intent_action.clone(), shortcut.intent_data.clone()));
            dest.push(shortcut.clone());
        }

        let responses: HashMap<String, SourceResponse> = inner.reported_results.iter().cloned().collect();
        let mut displayed: HashMap<String, usize> = HashMap::new();

        let slots_available = self.max_promoted.saturating_sub(inner.shortcuts.len());
        let num_promoted = self.promoted_sources.len();
        let chunk1 = if num_promoted == 0 { 0 } else { (slots_available / num_promoted).max(1) };
        let used1 = round_robin_fill(
            &self.promoted_sources,
            &inner.reported_before_deadline,
            &responses,
            &dedup,
            chunk1,
            slots_available,
            &mut displayed,
            &mut dest,
        );

        let all_promoted_reported = num_promoted > 0
            && self.promoted_sources.iter().all(|id| responses.contains_key(id));
        let past_deadline = inner.promoted_query_start.elapsed() >= self.promoted_deadline;
        let show_more = (past_deadline || all_promoted_reported) && !self.sources.is_empty();

        let remaining_slots = slots_available.saturating_sub(used1);
        if show_more && remaining_slots > 0 && num_promoted > 0 {
            let chunk2 = (remaining_slots / num_promoted).max(1);
            round_robin_fill(
                &self.promoted_sources,
                &inner.reported_before_deadline,
                &responses,
                &dedup,
                chunk2,
                remaining_slots,
                &mut displayed,
                &mut dest,
            );
        }

        let mut more_index = dest.len();
        if show_more {
            if let Some(search_the_web) = &self.search_the_web {
                dest.push(search_the_web.clone());
            }
            more_index = dest.len();
            dest.push(self.more_expander.clone());

            if expand_more {
                for source in &self.sources {
                    if let Some(stat) = self.source_stat(source, &responses, &displayed, &inner.pin_source) {
                        dest.push((self.corpus_entry_factory)(&stat));
                    }
                }
            }

            if let Some(pin) = inner.pin_to_bottom.clone() {
                dest.push(pin);
            }
        }

        inner.last_is_showing_more = show_more;
        inner.last_more_index = more_index;

        SnapshotFrame {
            suggestions: dest,
            is_pending: inner.reported_results.len() < self.promoted_sources.len(),
            is_showing_more: show_more,
            more_index,
        }
    }

    fn source_stat(
        &self,
        source: &SourceDescriptor,
        responses: &HashMap<String, SourceResponse>,
        displayed: &HashMap<String, usize>,
        pin_source: &Option<String>,
    ) -> Option<SourceStat> {
        let Some(response) = responses.get(&source.component_id) else {
            return Some(SourceStat {
                component_id: source.component_id.clone(),
                promoted: source.promoted,
                label: source.label.clone(),
                icon: source.icon.clone(),
                responded: false,
                num_undisplayed_results: 0,
                query_limit: 0,
            });
        };

        let shown = *displayed.get(&source.component_id).unwrap_or(&0);
        if source.promoted {
            if shown >= response.suggestions.len() {
                return None;
            }
            let mut undisplayed = response.count.saturating_sub(shown);
            if pin_source.as_deref() == Some(source.component_id.as_str()) {
                undisplayed = undisplayed.saturating_sub(1);
            }
            Some(SourceStat {
                component_id: source.component_id.clone(),
                promoted: true,
                label: source.label.clone(),
                icon: source.icon.clone(),
                responded: true,
                num_undisplayed_results: undisplayed,
                query_limit: response.query_limit,
            })
        } else {
            Some(SourceStat {
                component_id: source.component_id.clone(),
                promoted: false,
                label: source.label.clone(),
                icon: source.icon.clone(),
                responded: true,
                num_undisplayed_results: response.count,
                query_limit: response.query_limit,
            })
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn round_robin_fill(
    order: &[String],
    reported_before_deadline: &HashSet<String>,
    responses: &HashMap<String, SourceResponse>,
    dedup: &HashSet<(String, String)>,
    chunk: usize,
    slots_budget: usize,
    displayed: &mut HashMap<String, usize>,
    dest: &mut Vec<Suggestion>,
) -> usize {
    let mut used = 0;
    if chunk == 0 {
        return used;
    }
    for component_id in order {
        if used >= slots_budget {
            break;
        }
        if !reported_before_deadline.contains(component_id) {
            continue;
        }
        let Some(response) = responses.get(component_id) else { continue };
        let start = *displayed.get(component_id).unwrap_or(&0);

        for suggestion in response.suggestions.iter().skip(start).take(chunk) {
            if used >= slots_budget {
                break;
            }
            used += 1;
            *displayed.entry(component_id.clone()).or_insert(0) += 1;
            if !dedup.contains(&(suggestion.intent_action.clone(), suggestion.intent_data.clone())) {
                dest.push(suggestion.clone());
            }
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResultCode;

    fn suggestion(source: &str, title: &str) -> Suggestion {
        Suggestion {
            source: source.to_string(),
            format: None,
            title: title.to_string(),
            description: None,
            icon1: None,
            icon2: None,
            intent_action: "VIEW".to_string(),
            intent_data: format!("{source}-{title}"),
            intent_data_id: None,
            intent_extra_data: None,
            intent_component_name: None,
            query: None,
            action_msg_call: None,
            shortcut_id: None,
            pin_to_bottom: false,
            spinner_while_refreshing: false,
            background_color: None,
        }
    }

    fn response(source: &str, n: usize) -> SourceResponse {
        SourceResponse {
            source: source.to_string(),
            suggestions: (0..n).map(|i| suggestion(source, &format!("{source}{i}"))).collect(),
            count: n,
            query_limit: 58,
            result_code: ResultCode::Ok,
        }
    }

    fn descriptors(ids: &[(&str, bool)]) -> Vec<SourceDescriptor> {
        ids.iter()
            .map(|(id, promoted)| SourceDescriptor {
                component_id: id.to_string(),
                label: id.to_string(),
                icon: None,
                promoted: *promoted,
            })
            .collect()
    }

    fn corpus_factory() -> CorpusEntryFactory {
        Arc::new(|stat: &SourceStat| {
            let mut s = suggestion(&stat.component_id, &format!("corpus-{}", stat.component_id));
            s.intent_action = "CHANGE_SOURCE".to_string();
            s.intent_data = stat.component_id.clone();
            s
        })
    }

    fn more_expander() -> Suggestion {
        let mut s = suggestion("more", "more results");
        s.intent_action = "MORE".to_string();
        s
    }

    fn search_the_web() -> Suggestion {
        let mut s = suggestion("web", "Search the web");
        s.intent_action = "SEARCH".to_string();
        s
    }

    #[test]
    fn scenario_1_two_promoted_one_additional() {
        let s1 = suggestion("shortcut", "S1");
        let backer = AggregationBacker::new(BackerConfig {
            query: "piz".to_string(),
            shortcuts: vec![s1.clone()],
            sources: descriptors(&[("A", true), ("B", true), ("C", false)]),
            promoted_sources: vec!["A".to_string(), "B".to_string()],
            web_source: None,
            go_to_website: None,
            search_the_web: Some(search_the_web()),
            max_promoted: 6,
            promoted_deadline: Duration::from_millis(3500),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });

        assert!(backer.add_source_result(response("A", 4)));
        assert!(backer.add_source_result(response("B", 4)));
        assert!(backer.add_source_result(response("C", 4)));

        let snap = backer.snapshot(false);
        let titles: Vec<&str> = snap.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["S1", "A0", "A1", "B0", "B1", "A2", "Search the web", "more results"]);

        let snap = backer.snapshot(true);
        let titles: Vec<&str> = snap.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "S1", "A0", "A1", "B0", "B1", "A2", "Search the web", "more results", "corpus-A", "corpus-B", "corpus-C"
            ]
        );

        let stats_a = snap.suggestions.iter().find(|s| s.intent_data == "A").unwrap();
        assert_eq!(stats_a.source, "A");
    }

    #[test]
    fn scenario_2_no_sources_respond_before_deadline() {
        let s1 = suggestion("shortcut", "S1");
        let backer = AggregationBacker::new(BackerConfig {
            query: "piz".to_string(),
            shortcuts: vec![s1],
            sources: descriptors(&[("A", true), ("B", true), ("C", false)]),
            promoted_sources: vec!["A".to_string(), "B".to_string()],
            web_source: None,
            go_to_website: None,
            search_the_web: Some(search_the_web()),
            max_promoted: 6,
            promoted_deadline: Duration::from_millis(10),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });
        backer.backdate_promoted_query_start(Duration::from_millis(50));

        let snap = backer.snapshot(false);
        let titles: Vec<&str> = snap.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["S1", "Search the web", "more results"]);

        let snap = backer.snapshot(true);
        let titles: Vec<&str> = snap.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["S1", "Search the web", "more results", "corpus-A", "corpus-B", "corpus-C"]
        );
    }

    #[test]
    fn scenario_3_duplicate_dedup_suppressed_from_mixed_region() {
        let mut s1 = suggestion("shortcut", "S1");
        s1.intent_action = "VIEW".to_string();
        s1.intent_data = "dup-data".to_string();

        let mut dup = suggestion("A", "A0");
        dup.intent_action = "VIEW".to_string();
        dup.intent_data = "dup-data".to_string();
        let a1 = suggestion("A", "A1");
        let a2 = suggestion("A", "A2");
        let a3 = suggestion("A", "A3");

        let backer = AggregationBacker::new(BackerConfig {
            query: "piz".to_string(),
            shortcuts: vec![s1.clone()],
            sources: descriptors(&[("A", true)]),
            promoted_sources: vec!["A".to_string()],
            web_source: None,
            go_to_website: None,
            search_the_web: None,
            max_promoted: 3,
            promoted_deadline: Duration::from_millis(3500),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });

        backer.add_source_result(SourceResponse {
            source: "A".to_string(),
            suggestions: vec![dup, a1, a2, a3],
            count: 4,
            query_limit: 58,
            result_code: ResultCode::Ok,
        });

        let snap = backer.snapshot(false);
        let mixed_region: Vec<&str> = snap.suggestions[..snap.more_index].iter().map(|s| s.title.as_str()).collect();
        assert_eq!(mixed_region, vec!["S1", "A1"]);
    }

    #[test]
    fn scenario_4_pin_to_bottom_survives_to_the_end() {
        let mut w3 = suggestion("web", "W3");
        w3.pin_to_bottom = true;

        let backer = AggregationBacker::new(BackerConfig {
            query: "piz".to_string(),
            shortcuts: vec![],
            sources: descriptors(&[("web", true), ("C", false)]),
            promoted_sources: vec!["web".to_string()],
            web_source: Some("web".to_string()),
            go_to_website: None,
            search_the_web: Some(search_the_web()),
            max_promoted: 4,
            promoted_deadline: Duration::from_millis(3500),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });

        backer.add_source_result(SourceResponse {
            source: "web".to_string(),
            suggestions: vec![
                suggestion("web", "W0"),
                suggestion("web", "W1"),
                suggestion("web", "W2"),
                w3,
            ],
            count: 4,
            query_limit: 58,
            result_code: ResultCode::Ok,
        });
        backer.add_source_result(response("C", 4));

        let snap = backer.snapshot(true);
        assert_eq!(snap.suggestions.last().unwrap().title, "W3");
    }

    #[test]
    fn invariant_promoted_slots_never_exceed_max_promoted_plus_shortcuts() {
        let shortcuts = vec![suggestion("shortcut", "S1")];
        let backer = AggregationBacker::new(BackerConfig {
            query: "q".to_string(),
            shortcuts,
            sources: descriptors(&[("A", true), ("B", true)]),
            promoted_sources: vec!["A".to_string(), "B".to_string()],
            web_source: None,
            go_to_website: None,
            search_the_web: None,
            max_promoted: 3,
            promoted_deadline: Duration::from_millis(3500),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });
        backer.add_source_result(response("A", 10));
        backer.add_source_result(response("B", 10));

        let snap = backer.snapshot(false);
        let before_more = if snap.is_showing_more { snap.more_index } else { snap.suggestions.len() };
        assert!(before_more <= 3 + 1);
    }

    #[test]
    fn refresh_shortcut_replaces_matching_entry_in_place() {
        let shortcut = Suggestion {
            shortcut_id: Some("sc1".to_string()),
            ..suggestion("maps", "Pizza place")
        };
        let backer = AggregationBacker::new(BackerConfig {
            query: "piz".to_string(),
            shortcuts: vec![shortcut],
            sources: vec![],
            promoted_sources: vec![],
            web_source: None,
            go_to_website: None,
            search_the_web: None,
            max_promoted: 4,
            promoted_deadline: Duration::from_millis(3500),
            more_expander: more_expander(),
            corpus_entry_factory: corpus_factory(),
        });

        let updated = Suggestion {
            shortcut_id: Some("sc1".to_string()),
            ..suggestion("maps", "Pizza place (closed)")
        };
        assert!(backer.refresh_shortcut("maps", "sc1", Some(updated)));

        let snap = backer.snapshot(false);
        assert_eq!(snap.suggestions[0].title, "Pizza place (closed)");

        assert!(!backer.refresh_shortcut("maps", "unknown", Some(suggestion("maps", "x"))));

        assert!(backer.refresh_shortcut("maps", "sc1", None));
        let snap = backer.snapshot(false);
        assert!(snap.suggestions.is_empty(), "a revalidation that returns None should drop the shortcut");
        assert!(!backer.refresh_shortcut("maps", "sc1", None), "already-removed shortcut can't be refreshed again");
    }
}
