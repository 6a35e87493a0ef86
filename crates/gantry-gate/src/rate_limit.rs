//! Per-reader sliding-window rate limiting.
//!
//! Process-local and in-memory by design: losing this state on restart
//! briefly undercounts bursts, which affects smoothing, not correctness.
//! A multi-instance deployment would need a shared, TTL-backed counter
//! instead.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Sliding-window counter of accepted starts per reader.
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note one admission start; returns `false` when the reader already
    /// has `max_events` starts inside the window.
    pub fn admit(
        &mut self,
        reader: &str,
        window_secs: i64,
        max_events: usize,
        now: DateTime<Utc>,
    ) -> bool {
        let cutoff = now - Duration::seconds(window_secs);
        let window = self.windows.entry(reader.to_string()).or_default();
        while let Some(front) = window.front() {
            if *front < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= max_events {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop readers with no starts inside the window.
    pub fn cleanup(&mut self, window_secs: i64, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(window_secs);
        self.windows
            .retain(|_, w| w.back().is_some_and(|last| *last >= cutoff));
    }

    /// Number of readers currently tracked.
    #[must_use]
    pub fn tracked_readers(&self) -> usize {
        self.windows.len()
    }
}
