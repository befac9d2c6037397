//! Typing-speed heuristic (spec §4.6): computes the recommended delay
//! before firing a keystroke's fan-out from the last two keystroke
//! timestamps, as its own independently-testable type.

use std::time::{Duration, Instant};

use crate::config::EngineConfig;

/// Tracks the last two keystroke timestamps and computes the recommended
/// delay for the next fan-out, per spec §4.6's "last-three / last-two"
/// heuristic.
#[derive(Debug, Default)]
pub struct TypingWindow {
    last_key: Option<Instant>,
    last_last_key: Option<Instant>,
}

impl TypingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a keystroke at `now` and return the recommended delay before
    /// firing a fan-out for it. Slides the keystroke window.
    pub fn push(&mut self, now: Instant, cfg: &EngineConfig) -> Duration {
        let last_two = Duration::from_millis(cfg.typing_delay_last_two_ms);
        let last_three = Duration::from_millis(cfg.typing_delay_last_three_ms);

        let delay = match (self.last_key, self.last_last_key) {
            (Some(last), Some(last_last)) => {
                let d1 = now.saturating_duration_since(last);
                let d2 = last.saturating_duration_since(last_last);
                let avg = (d1 + d2) / 2;
                if avg < last_three {
                    last_three
                } else if d1 < last_two {
                    last_two
                } else {
                    Duration::ZERO
                }
            }
            // Exactly one prior keystroke: no d2 to average against yet, but
            // still honor the "typed two fast keystrokes in a row" signal.
            (Some(last), None) => {
                let d1 = now.saturating_duration_since(last);
                if d1 < last_two {
                    last_two
                } else {
                    Duration::ZERO
                }
            }
            // No prior keystrokes at all: no history, fire immediately.
            (None, _) => Duration::ZERO,
        };

        self.last_last_key = self.last_key;
        self.last_key = Some(now);
        delay
    }
}
