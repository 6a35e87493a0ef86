//! Cross-reader statistical outlier detection.
//!
//! Compares one reader's accepted-event rate against the mean across all
//! readers with recent traffic. A reader several times above the mean is
//! suspicious, but only with low confidence: a busy plaza can be
//! legitimate, so the resulting penalty carries the policy's
//! `outlier_confidence` rather than 1.0.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Rolling per-reader counts of accepted events.
#[derive(Clone, Debug, Default)]
pub struct TrafficMonitor {
    events: HashMap<String, VecDeque<DateTime<Utc>>>,
}

impl TrafficMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note one accepted event for a reader.
    pub fn note(&mut self, reader: &str, now: DateTime<Utc>) {
        self.events
            .entry(reader.to_string())
            .or_default()
            .push_back(now);
    }

    fn count_since(&self, reader: &str, cutoff: DateTime<Utc>) -> usize {
        self.events
            .get(reader)
            .map(|w| w.iter().filter(|t| **t >= cutoff).count())
            .unwrap_or(0)
    }

    /// Whether a reader's recent event count is an outlier.
    ///
    /// True when the reader's count exceeds `multiplier ×` the mean across
    /// readers with traffic in the window. Needs at least two readers with
    /// traffic: a lone reader has no peers to deviate from.
    #[must_use]
    pub fn is_outlier(
        &self,
        reader: &str,
        window_mins: i64,
        multiplier: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let cutoff = now - Duration::minutes(window_mins);
        let counts: Vec<usize> = self
            .events
            .values()
            .map(|w| w.iter().filter(|t| **t >= cutoff).count())
            .filter(|&c| c > 0)
            .collect();
        if counts.len() < 2 {
            return false;
        }
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        let own = self.count_since(reader, cutoff) as f64;
        mean > 0.0 && own > mean * multiplier
    }

    /// Drop events older than the window.
    pub fn cleanup(&mut self, window_mins: i64, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(window_mins);
        for window in self.events.values_mut() {
            while let Some(front) = window.front() {
                if *front < cutoff {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        self.events.retain(|_, w| !w.is_empty());
    }
}
