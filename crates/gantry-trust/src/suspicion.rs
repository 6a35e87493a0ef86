//! Cross-reader tag suspicion.
//!
//! When a reader is quarantined, every tag it sighted recently becomes
//! suspect: a compromised reader may have been vouching for forged tags
//! before detection. Other readers evaluating those tags multiply their
//! fraud sensitivity by the highest active multiplier across sources.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::ReaderId;
use crate::policy::SuspicionPolicy;

/// Elevated-scrutiny flag on a tag, sourced from one quarantined reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagSuspicion {
    /// Suspect tag.
    pub tag_hash: String,
    /// Reader whose quarantine raised the flag.
    pub source_reader: ReaderId,
    /// Fraud-sensitivity multiplier while active.
    pub multiplier: f64,
    /// Entry is ignored and eventually purged after this instant.
    pub expires_at: DateTime<Utc>,
}

/// Active and recently-expired suspicion entries.
#[derive(Clone, Debug, Default)]
pub struct SuspicionBoard {
    entries: Vec<TagSuspicion>,
}

impl SuspicionBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a set of tags as suspect, sourced from one reader.
    ///
    /// An existing (tag, source) entry is refreshed rather than duplicated.
    pub fn propagate(
        &mut self,
        source: &str,
        tags: &[String],
        policy: &SuspicionPolicy,
        now: DateTime<Utc>,
    ) {
        let expires_at = now + Duration::minutes(policy.duration_mins);
        for tag in tags {
            match self
                .entries
                .iter_mut()
                .find(|e| &e.tag_hash == tag && e.source_reader == source)
            {
                Some(existing) => {
                    existing.multiplier = policy.multiplier;
                    existing.expires_at = expires_at;
                }
                None => self.entries.push(TagSuspicion {
                    tag_hash: tag.clone(),
                    source_reader: source.to_string(),
                    multiplier: policy.multiplier,
                    expires_at,
                }),
            }
        }
    }

    /// Current fraud-sensitivity multiplier for a tag.
    ///
    /// The maximum across all active sources, or `1.0` when none is active.
    #[must_use]
    pub fn multiplier_for(&self, tag: &str, now: DateTime<Utc>) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.tag_hash == tag && e.expires_at > now)
            .map(|e| e.multiplier)
            .fold(1.0, f64::max)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.expires_at > now);
        before - self.entries.len()
    }

    /// Amnesty: drop every entry sourced from a restored reader.
    pub fn clear_source(&mut self, reader: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.source_reader != reader);
        before - self.entries.len()
    }

    /// Number of active entries.
    #[must_use]
    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }
}

/// Rolling log of which reader sighted which tag, feeding propagation.
#[derive(Clone, Debug, Default)]
pub struct SightingLog {
    entries: VecDeque<(ReaderId, String, DateTime<Utc>)>,
}

impl SightingLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sighting, trimming entries older than the window.
    pub fn record(&mut self, reader: &str, tag: &str, window_mins: i64, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(window_mins);
        while let Some((_, _, at)) = self.entries.front() {
            if *at < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries
            .push_back((reader.to_string(), tag.to_string(), now));
    }

    /// Distinct tags a reader sighted within the window, oldest first.
    #[must_use]
    pub fn recent_tags(&self, reader: &str, window_mins: i64, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - Duration::minutes(window_mins);
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for (r, tag, at) in &self.entries {
            if r == reader && *at >= cutoff && seen.insert(tag.clone()) {
                tags.push(tag.clone());
            }
        }
        tags
    }

    /// Number of retained sightings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
