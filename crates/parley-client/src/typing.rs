//! Local typing debounce and rendering of remote typing snapshots.

use std::time::Duration;

use tokio::time::Instant;

use parley_shared::protocol::TypingSnapshot;
use parley_shared::types::UserId;

/// Debounced local typing state.
///
/// Every transition yields the value to emit; staying in the same state
/// yields nothing, so a burst of keystrokes produces a single `typing:true`.
#[derive(Debug)]
pub struct TypingTracker {
    typing: bool,
    quiet: Duration,
    deadline: Option<Instant>,
}

impl TypingTracker {
    pub fn new(quiet: Duration) -> Self {
        Self {
            typing: false,
            quiet,
            deadline: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    /// When the quiet timer fires, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The input changed. Typing iff the trimmed input is non-empty; the
    /// quiet timer is re-armed either way.
    pub fn input_changed(&mut self, text: &str, now: Instant) -> Option<bool> {
        self.deadline = Some(now + self.quiet);
        self.transition(!text.trim().is_empty())
    }

    /// The quiet timer fired.
    pub fn quiet_elapsed(&mut self) -> Option<bool> {
        self.stop()
    }

    /// Blur, send, or teardown.
    pub fn stop(&mut self) -> Option<bool> {
        self.deadline = None;
        self.transition(false)
    }

    fn transition(&mut self, next: bool) -> Option<bool> {
        if self.typing == next {
            return None;
        }
        self.typing = next;
        Some(next)
    }
}

/// What the typing indicator should show.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum TypingIndicator {
    Hidden,
    Visible(String),
}

/// Render a typing snapshot for the active channel.
///
/// Returns `None` when the snapshot belongs to another channel. The local
/// user never appears in the indicator.
pub fn render_typing(
    snapshot: &TypingSnapshot,
    active_slug: &str,
    self_id: UserId,
) -> Option<TypingIndicator> {
    if snapshot.channel != active_slug {
        return None;
    }

    let others: Vec<&str> = snapshot
        .users
        .iter()
        .filter(|user| user.id != self_id)
        .map(|user| user.name.as_str())
        .collect();

    let indicator = match others.as_slice() {
        [] => TypingIndicator::Hidden,
        [only] => TypingIndicator::Visible(format!("{only} 입력 중...")),
        [first, rest @ ..] => {
            TypingIndicator::Visible(format!("{first} 외 {}명 입력 중...", rest.len()))
        }
    };
    Some(indicator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::protocol::TypingUser;

    fn user(id: u64, name: &str) -> TypingUser {
        TypingUser {
            id: UserId(id),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_keystroke_burst_emits_once() {
        let start = Instant::now();
        let mut tracker = TypingTracker::new(Duration::from_millis(1500));

        let mut emitted = Vec::new();
        for (i, text) in ["h", "he", "hel", "hell", "hello", "hello!"].iter().enumerate() {
            let now = start + Duration::from_millis(200 * i as u64);
            emitted.extend(tracker.input_changed(text, now));
        }
        assert_eq!(emitted, [true]);
        assert_eq!(
            tracker.deadline(),
            Some(start + Duration::from_millis(1000 + 1500))
        );

        assert_eq!(tracker.quiet_elapsed(), Some(false));
        assert_eq!(tracker.quiet_elapsed(), None);
        assert!(tracker.deadline().is_none());
    }

    #[test]
    fn test_clearing_input_stops_typing() {
        let now = Instant::now();
        let mut tracker = TypingTracker::new(Duration::from_millis(1500));
        assert_eq!(tracker.input_changed("x", now), Some(true));
        assert_eq!(tracker.input_changed("   ", now), Some(false));
        assert_eq!(tracker.input_changed("", now), None);
    }

    #[test]
    fn test_stop_only_emits_when_typing() {
        let mut tracker = TypingTracker::new(Duration::from_millis(1500));
        assert_eq!(tracker.stop(), None);
        tracker.input_changed("x", Instant::now());
        assert_eq!(tracker.stop(), Some(false));
        assert!(!tracker.is_typing());
    }

    #[test]
    fn test_render_excludes_self() {
        let snapshot = TypingSnapshot {
            channel: "general".into(),
            users: vec![user(1, "me"), user(2, "mina")],
        };
        assert_eq!(
            render_typing(&snapshot, "general", UserId(1)),
            Some(TypingIndicator::Visible("mina 입력 중...".into()))
        );

        let only_me = TypingSnapshot {
            channel: "general".into(),
            users: vec![user(1, "me")],
        };
        assert_eq!(
            render_typing(&only_me, "general", UserId(1)),
            Some(TypingIndicator::Hidden)
        );
    }

    #[test]
    fn test_render_counts_others() {
        let snapshot = TypingSnapshot {
            channel: "general".into(),
            users: vec![user(2, "mina"), user(3, "joon"), user(4, "sol")],
        };
        assert_eq!(
            render_typing(&snapshot, "general", UserId(1)),
            Some(TypingIndicator::Visible("mina 외 2명 입력 중...".into()))
        );
        assert_eq!(render_typing(&snapshot, "random", UserId(1)), None);
    }
}
