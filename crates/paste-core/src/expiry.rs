//! Sliding-window expiry.
//!
//! A non-static document expires once it has gone unread for longer than the
//! window. Every successful read restarts the window. Static documents never
//! expire.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: Duration,
}

impl ExpiryPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds, rounded up, for native TTL engines.
    pub fn window_secs(&self) -> u64 {
        let secs = self.window.as_secs();
        if self.window.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    fn chrono_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX)
    }

    /// When a document last read at `last_accessed_at` stops being served.
    pub fn deadline(&self, last_accessed_at: DateTime<Utc>) -> DateTime<Utc> {
        last_accessed_at
            .checked_add_signed(self.chrono_window())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether a record is past its window at `now`.
    ///
    /// Records without an access time are never treated as expired.
    pub fn is_expired(
        &self,
        is_static: bool,
        last_accessed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if is_static {
            return false;
        }
        match last_accessed_at {
            Some(at) => self.deadline(at) < now,
            None => false,
        }
    }

    /// Records last read before this instant are expired at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.chrono_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
