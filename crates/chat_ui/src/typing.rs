use std::time::Duration;

use tokio::time::Instant;

/// Rate limit for outgoing "typing" signals, decided by timestamp comparison.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    window: Duration,
    last_sent: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: None,
        }
    }

    /// Returns true, and records `now`, when a signal may go out.
    pub fn should_signal(&mut self, now: Instant) -> bool {
        let due = self
            .last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
