//! Transient, auto-dismissing user-facing messages
//!
//! Only one message is shown at a time. Each `notify` replaces the text and
//! restarts the countdown, so the message hides exactly one duration after
//! the most recent call no matter how many calls came before it.

use std::time::Duration;

/// How long a notification stays on screen
pub const NOTIFICATION_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct NotificationBus {
    message: String,
    remaining: Duration,
    duration: Duration,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::with_duration(NOTIFICATION_DURATION)
    }
}

impl NotificationBus {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            message: String::new(),
            remaining: Duration::ZERO,
            duration,
        }
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.remaining = self.duration;
        tracing::debug!(message = %self.message, "Notification shown");
    }

    /// Advance the countdown by one frame's worth of time
    pub fn tick(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    pub fn is_visible(&self) -> bool {
        !self.remaining.is_zero()
    }

    pub fn visible_message(&self) -> Option<&str> {
        self.is_visible().then_some(self.message.as_str())
    }
}
