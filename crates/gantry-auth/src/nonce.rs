//! Replay-witness ledger of `(reader, nonce)` pairs.
//!
//! Every admitted event records its nonce before any business processing
//! happens, so two concurrent replays of the same nonce can never both pass.
//! Records are grouped into time buckets and pruned whole-bucket once they
//! fall outside the retention window; callers must configure retention to be
//! at least as wide as the clock-drift window, so a nonce that could still
//! pass the freshness check is never forgotten.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{AuthError, Result};
use crate::registry::ReaderId;

/// Duration of each nonce time bucket, in seconds.
const BUCKET_SECS: i64 = 10;

/// Check that an event timestamp is inside the freshness window.
///
/// # Errors
///
/// Returns [`AuthError::StaleTimestamp`] when `|now − timestamp|` exceeds
/// `max_drift_secs`. Future-dated events are rejected the same as stale ones.
pub fn validate_freshness(event_ts: i64, now: DateTime<Utc>, max_drift_secs: i64) -> Result<()> {
    let drift = (now.timestamp() - event_ts).abs();
    if drift > max_drift_secs {
        return Err(AuthError::StaleTimestamp {
            drift_secs: drift,
            max_secs: max_drift_secs,
        });
    }
    Ok(())
}

/// Ledger of used nonces with time-bucketed pruning.
#[derive(Clone, Debug)]
pub struct NonceLedger {
    /// All currently retained pairs, for O(1) replay lookup.
    seen: HashSet<(ReaderId, String)>,
    /// Pairs grouped by insertion-time bucket, pruned whole-bucket.
    buckets: BTreeMap<i64, Vec<(ReaderId, String)>>,
    /// How long records are retained, in seconds.
    retention_secs: i64,
}

impl NonceLedger {
    /// Create a ledger with the given retention window.
    ///
    /// Retention must be at least as wide as the admission drift window;
    /// the policy validator enforces this at load time.
    #[must_use]
    pub fn new(retention_secs: i64) -> Self {
        Self {
            seen: HashSet::new(),
            buckets: BTreeMap::new(),
            retention_secs: retention_secs.max(1),
        }
    }

    /// Record a nonce, rejecting replays.
    ///
    /// Insert-or-reject is a single operation on the ledger, so under an
    /// exclusive borrow two submissions of the same pair resolve to exactly
    /// one acceptance.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NonceReused`] if the pair was already recorded.
    pub fn record(&mut self, reader: &str, nonce: &str, now: DateTime<Utc>) -> Result<()> {
        let pair = (reader.to_string(), nonce.to_string());
        if self.seen.contains(&pair) {
            return Err(AuthError::NonceReused);
        }
        self.seen.insert(pair.clone());
        self.buckets
            .entry(now.timestamp() / BUCKET_SECS)
            .or_default()
            .push(pair);
        Ok(())
    }

    /// Whether a pair has been recorded and not yet pruned.
    #[must_use]
    pub fn is_used(&self, reader: &str, nonce: &str) -> bool {
        self.seen
            .contains(&(reader.to_string(), nonce.to_string()))
    }

    /// Drop all buckets older than the retention window.
    ///
    /// Returns the number of records removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let expiry_bucket = (now.timestamp() - self.retention_secs) / BUCKET_SECS;
        let expired: Vec<i64> = self
            .buckets
            .range(..=expiry_bucket)
            .map(|(&k, _)| k)
            .collect();

        let mut removed = 0;
        for key in expired {
            if let Some(pairs) = self.buckets.remove(&key) {
                for pair in &pairs {
                    self.seen.remove(pair);
                }
                removed += pairs.len();
            }
        }
        removed
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
