//! Cursor read model (spec §9 Design Notes: "Cursor-as-OOP-base-class" →
//! "single tagged record with a column-enum").
//!
//! Rather than an inheritance hierarchy of column accessors, the cursor is
//! a thin snapshot buffer plus a single discriminated-message dispatch
//! (`CursorRequest`/`CursorResponse`).

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::{SnapshotFrame, Suggestion};

/// One column of a suggestion row, addressed by name instead of a
/// base-class accessor method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Text1,
    Text2,
    Icon1,
    Icon2,
    IntentAction,
    IntentData,
    Query,
    ShortcutId,
}

/// The discriminated cursor protocol (spec §6's "Cursor protocol").
#[derive(Debug, Clone)]
pub enum CursorRequest {
    /// A background refresh or fan-out completion landed; recompute the
    /// pending/notify state.
    PostRefresh,
    /// The cursor is about to close; `max_display_pos` bounds which rows
    /// count as "viewed" for impression tallying.
    PreClose { max_display_pos: usize },
    /// The row at `position` was activated.
    Click { position: usize },
    /// The "more" row scrolled onto screen.
    ThreshHit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CursorResponse {
    PostRefresh { is_pending: bool, display_notify_index: Option<usize> },
    PreClose { viewed: Vec<Suggestion> },
    /// `reselect` is `Some(position)` when the click landed on the "more"
    /// row and toggled `expandMore` — the UI should re-select that same
    /// position since the row it pointed at just changed shape.
    Click { clicked: Option<Suggestion>, reselect: Option<usize> },
    ThreshHit,
}

struct Inner {
    buffer: Vec<Suggestion>,
    is_pending: bool,
    is_showing_more: bool,
    more_index: usize,
    expand_more: bool,
    last_notify: Option<Instant>,
}

/// Owns a session's current display buffer. Only mutated inside the
/// cursor's own re-query method, per spec §5's shared-resource policy.
pub struct Cursor {
    inner: Mutex<Inner>,
    notify_window: Duration,
}

impl Cursor {
    pub fn new(notify_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: Vec::new(),
                is_pending: true,
                is_showing_more: false,
                more_index: 0,
                expand_more: false,
                last_notify: None,
            }),
            notify_window,
        }
    }

    /// Replace the buffer with a freshly materialized snapshot from the
    /// backer. Returns `true` if a change-notify should fire (throttled to
    /// at most one per `notify_window`).
    pub fn apply_snapshot(&self, frame: SnapshotFrame) -> bool {
        let mut inner = self.inner.lock();
        inner.buffer = frame.suggestions;
        inner.is_pending = frame.is_pending;
        inner.is_showing_more = frame.is_showing_more;
        inner.more_index = frame.more_index;
        self.should_notify(&mut inner)
    }

    /// Seed the buffer with a copy of another (closed or previous) cursor's
    /// contents without touching pending/more state — the "prefill" path
    /// (spec §4.6 step 7).
    pub fn prefill_from(&self, suggestions: Vec<Suggestion>) {
        let mut inner = self.inner.lock();
        inner.buffer = suggestions;
    }

    fn should_notify(&self, inner: &mut Inner) -> bool {
        let now = Instant::now();
        let fire = match inner.last_notify {
            Some(last) => now.duration_since(last) >= self.notify_window,
            None => true,
        };
        if fire {
            inner.last_notify = Some(now);
        }
        fire
    }

    pub fn column(&self, position: usize, column: Column) -> Option<String> {
        let inner = self.inner.lock();
        let suggestion = inner.buffer.get(position)?;
        Some(match column {
            Column::Text1 => suggestion.title.clone(),
            Column::Text2 => suggestion.description.clone().unwrap_or_default(),
            Column::Icon1 => format!("{:?}", suggestion.icon1),
            Column::Icon2 => format!("{:?}", suggestion.icon2),
            Column::IntentAction => suggestion.intent_action.clone(),
            Column::IntentData => suggestion.intent_data.clone(),
            Column::Query => suggestion.query.clone().unwrap_or_default(),
            Column::ShortcutId => suggestion.shortcut_id.clone().unwrap_or_default(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// A copy of the current buffer, used to seed the next keystroke's
    /// prefill if this cursor closes with nothing left pending.
    pub fn buffer_snapshot(&self) -> Vec<Suggestion> {
        self.inner.lock().buffer.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().buffer.is_empty()
    }

    /// Dispatch one cursor-protocol request.
    pub fn handle(&self, request: CursorRequest) -> CursorResponse {
        match request {
            CursorRequest::PostRefresh => {
                let mut inner = self.inner.lock();
                let notify = self.should_notify(&mut inner);
                CursorResponse::PostRefresh {
                    is_pending: inner.is_pending,
                    display_notify_index: notify.then_some(inner.more_index),
                }
            }
            CursorRequest::PreClose { max_display_pos } => {
                let inner = self.inner.lock();
                let end = max_display_pos.min(inner.buffer.len());
                CursorResponse::PreClose {
                    viewed: inner.buffer[..end].to_vec(),
                }
            }
            CursorRequest::Click { position } => {
                let mut inner = self.inner.lock();
                if inner.is_showing_more && position == inner.more_index {
                    inner.expand_more = !inner.expand_more;
                    return CursorResponse::Click { clicked: None, reselect: Some(position) };
                }
                let clicked = inner.buffer.get(position).cloned();
                CursorResponse::Click { clicked, reselect: None }
            }
            CursorRequest::ThreshHit => CursorResponse::ThreshHit,
        }
    }

    pub fn expand_more(&self) -> bool {
        self.inner.lock().expand_more
    }

    pub fn is_showing_more(&self) -> bool {
        self.inner.lock().is_showing_more
    }
}
