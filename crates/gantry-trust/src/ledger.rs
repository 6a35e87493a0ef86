//! Per-reader trust records, violation log and time-decay recovery.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy::{DecayPolicy, ScoringPolicy};
use crate::score::{QuarantineState, TrustScore, TrustStatus};

/// Identifier of a field reader.
pub type ReaderId = String;

/// Classification of a trust violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Bad or forged signature, or a revoked credential presented.
    AuthFailure,
    /// Reused nonce or stale timestamp.
    ReplayAttack,
    /// Event signed under a superseded key version.
    StaleKeyVersion,
    /// Burst traffic over the admission rate limit.
    RateLimitExceeded,
    /// Fraud scorer flagged the transaction.
    FraudSuspected,
    /// Event rate far above the peer average.
    OutlierBehavior,
    /// A probation challenge ran out of attempts.
    ProbationFailure,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ViolationKind::AuthFailure => "AUTH_FAILURE",
            ViolationKind::ReplayAttack => "REPLAY_ATTACK",
            ViolationKind::StaleKeyVersion => "STALE_KEY_VERSION",
            ViolationKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ViolationKind::FraudSuspected => "FRAUD_SUSPECTED",
            ViolationKind::OutlierBehavior => "OUTLIER_BEHAVIOR",
            ViolationKind::ProbationFailure => "PROBATION_FAILURE",
        };
        f.write_str(s)
    }
}

/// One immutable audit entry, appended on every penalty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Violation {
    /// Penalized reader.
    pub reader_id: ReaderId,
    /// What happened.
    pub kind: ViolationKind,
    /// Signed score delta actually applied (after clamping).
    pub applied_delta: i32,
    /// Confidence the signal was recorded with.
    pub confidence: f64,
    /// Free-form detail for the audit trail.
    pub details: String,
    /// When the violation was recorded.
    pub at: DateTime<Utc>,
}

/// Reputation state of one reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustRecord {
    /// Reader this record belongs to.
    pub reader_id: ReaderId,
    score: TrustScore,
    /// Status derived from the score thresholds.
    pub status: TrustStatus,
    /// Quarantine position.
    pub quarantine: QuarantineState,
    /// When the last violation was recorded, if any.
    pub last_violation_at: Option<DateTime<Utc>>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl TrustRecord {
    /// Current score value.
    #[must_use]
    pub fn score(&self) -> u8 {
        self.score.value()
    }

    /// Copyable view of score, status and quarantine state.
    #[must_use]
    pub fn snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            score: self.score.value(),
            status: self.status,
            quarantine: self.quarantine,
        }
    }
}

/// Point-in-time view of a reader's trust.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSnapshot {
    /// Score in `[0, 100]`.
    pub score: u8,
    /// Status tier.
    pub status: TrustStatus,
    /// Quarantine position.
    pub quarantine: QuarantineState,
}

/// Result of recording one violation.
#[derive(Clone, Copy, Debug)]
pub struct ViolationOutcome {
    /// Score after the penalty.
    pub score: u8,
    /// Status after the penalty.
    pub status: TrustStatus,
    /// Quarantine state at the time of the penalty (unchanged by it).
    pub quarantine: QuarantineState,
    /// Delta actually applied.
    pub applied_delta: i32,
    /// Whether the score fell below the proactive key-rotation threshold.
    pub rotate_key: bool,
}

/// Result of one decay recovery application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Score before recovery.
    pub old_score: u8,
    /// Score after recovery.
    pub new_score: u8,
}

/// All trust records plus the append-only violation log.
#[derive(Clone, Debug, Default)]
pub struct TrustLedger {
    records: HashMap<ReaderId, TrustRecord>,
    violations: Vec<Violation>,
}

impl TrustLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(
        &mut self,
        reader: &str,
        scoring: &ScoringPolicy,
        now: DateTime<Utc>,
    ) -> &mut TrustRecord {
        self.records
            .entry(reader.to_string())
            .or_insert_with(|| TrustRecord {
                reader_id: reader.to_string(),
                score: TrustScore::new(scoring.initial_score),
                status: TrustStatus::for_score(
                    scoring.initial_score,
                    scoring.trusted_floor,
                    scoring.degraded_floor,
                ),
                quarantine: QuarantineState::Normal,
                last_violation_at: None,
                created_at: now,
                updated_at: now,
            })
    }

    /// Record a violation and apply its weighted penalty.
    ///
    /// `confidence` scales how much a probabilistic signal is trusted and is
    /// clamped to `[0.5, 1.0]`; deterministic signals use `1.0`. The record
    /// is created lazily at the policy's initial score if this is the
    /// reader's first evaluation.
    pub fn record_violation(
        &mut self,
        reader: &str,
        kind: ViolationKind,
        details: impl Into<String>,
        confidence: f64,
        scoring: &ScoringPolicy,
        now: DateTime<Utc>,
    ) -> ViolationOutcome {
        let penalty = scoring.penalties.for_kind(kind);
        let confidence = confidence.clamp(0.5, 1.0);
        let delta = -((penalty.base * penalty.weight * confidence).round() as i32);

        let trusted_floor = scoring.trusted_floor;
        let degraded_floor = scoring.degraded_floor;
        let rotate_below = scoring.rotate_key_below;

        let record = self.ensure(reader, scoring, now);
        let old_score = record.score.value();
        let applied = record.score.apply(delta);
        record.status = TrustStatus::for_score(record.score.value(), trusted_floor, degraded_floor);
        record.last_violation_at = Some(now);
        record.updated_at = now;

        let outcome = ViolationOutcome {
            score: record.score.value(),
            status: record.status,
            quarantine: record.quarantine,
            applied_delta: applied,
            // Fires on the downward crossing only, so a reader sitting
            // below the line is not re-rotated on every further violation.
            rotate_key: old_score >= rotate_below && record.score.value() < rotate_below,
        };

        debug!(
            reader = %reader,
            kind = %kind,
            delta = applied,
            score = outcome.score,
            status = %outcome.status,
            "violation recorded"
        );

        self.violations.push(Violation {
            reader_id: reader.to_string(),
            kind,
            applied_delta: applied,
            confidence,
            details: details.into(),
            at: now,
        });

        outcome
    }

    /// Reward a fully clean admitted event.
    ///
    /// Does not touch `last_violation_at`, so clean traffic and decay
    /// recovery compose. No effect on quarantined readers.
    pub fn award_clean(
        &mut self,
        reader: &str,
        scoring: &ScoringPolicy,
        now: DateTime<Utc>,
    ) -> TrustSnapshot {
        let reward = i32::from(scoring.clean_reward);
        let trusted_floor = scoring.trusted_floor;
        let degraded_floor = scoring.degraded_floor;

        let record = self.ensure(reader, scoring, now);
        if record.quarantine == QuarantineState::Normal && reward != 0 {
            record.score.apply(reward);
            record.status =
                TrustStatus::for_score(record.score.value(), trusted_floor, degraded_floor);
            record.updated_at = now;
        }
        record.snapshot()
    }

    /// Apply logarithmic time-decay recovery to one reader.
    ///
    /// `recovered = floor(rate × ln(1 + hours_since_last_violation))`:
    /// fast at first so isolated incidents are forgiven, flattening over
    /// time so chronic offenders cannot heal by waiting alone. Never
    /// applies to quarantined readers, never lifts the score above the
    /// recovery cap, and is a no-op when nothing would increase.
    pub fn recover_by_decay(
        &mut self,
        reader: &str,
        decay: &DecayPolicy,
        scoring: &ScoringPolicy,
        now: DateTime<Utc>,
    ) -> Option<RecoveryOutcome> {
        let trusted_floor = scoring.trusted_floor;
        let degraded_floor = scoring.degraded_floor;

        let record = self.records.get_mut(reader)?;
        if record.quarantine != QuarantineState::Normal {
            return None;
        }
        let cap = decay.max_recovery_cap;
        if record.score.value() >= cap {
            return None;
        }
        let last = record.last_violation_at?;
        let hours = (now - last).num_seconds() as f64 / 3600.0;
        if hours < decay.min_recovery_hours {
            return None;
        }

        let recovered = (decay.recovery_rate * (1.0 + hours).ln()).floor() as i32;
        let old_score = record.score.value();
        let new_score = (i32::from(old_score) + recovered).min(i32::from(cap)) as u8;
        if new_score <= old_score {
            return None;
        }

        record.score = TrustScore::new(new_score);
        record.status = TrustStatus::for_score(new_score, trusted_floor, degraded_floor);
        record.updated_at = now;

        debug!(reader = %reader, old_score, new_score, "decay recovery applied");
        Some(RecoveryOutcome {
            old_score,
            new_score,
        })
    }

    /// Administrative override: full score, trusted, out of quarantine.
    pub fn reset(&mut self, reader: &str, scoring: &ScoringPolicy, now: DateTime<Utc>) {
        let trusted_floor = scoring.trusted_floor;
        let degraded_floor = scoring.degraded_floor;
        let record = self.ensure(reader, scoring, now);
        record.score = TrustScore::new(TrustScore::MAX);
        record.status = TrustStatus::for_score(TrustScore::MAX, trusted_floor, degraded_floor);
        record.quarantine = QuarantineState::Normal;
        record.updated_at = now;
    }

    /// Move a reader between quarantine states.
    pub(crate) fn set_quarantine(
        &mut self,
        reader: &str,
        state: QuarantineState,
        now: DateTime<Utc>,
    ) {
        if let Some(record) = self.records.get_mut(reader) {
            record.quarantine = state;
            record.updated_at = now;
        }
    }

    /// Directly set a score, recomputing the status. Used by restoration.
    pub(crate) fn set_score(
        &mut self,
        reader: &str,
        score: u8,
        scoring: &ScoringPolicy,
        now: DateTime<Utc>,
    ) {
        if let Some(record) = self.records.get_mut(reader) {
            record.score = TrustScore::new(score);
            record.status = TrustStatus::for_score(
                record.score.value(),
                scoring.trusted_floor,
                scoring.degraded_floor,
            );
            record.updated_at = now;
        }
    }

    /// Look up a reader's record.
    #[must_use]
    pub fn get(&self, reader: &str) -> Option<&TrustRecord> {
        self.records.get(reader)
    }

    /// Snapshot of a reader's trust, if a record exists.
    #[must_use]
    pub fn snapshot_of(&self, reader: &str) -> Option<TrustSnapshot> {
        self.records.get(reader).map(TrustRecord::snapshot)
    }

    /// All violations recorded against a reader, oldest first.
    pub fn violations_of(&self, reader: &str) -> impl Iterator<Item = &Violation> {
        let reader = reader.to_string();
        self.violations.iter().filter(move |v| v.reader_id == reader)
    }

    /// Readers eligible for decay recovery: not quarantined, below the
    /// cap, with a recorded violation.
    #[must_use]
    pub fn recovery_candidates(&self, decay: &DecayPolicy) -> Vec<ReaderId> {
        self.records
            .values()
            .filter(|r| {
                r.quarantine == QuarantineState::Normal
                    && r.score.value() < decay.max_recovery_cap
                    && r.last_violation_at.is_some()
            })
            .map(|r| r.reader_id.clone())
            .collect()
    }

    /// Iterate over all records.
    pub fn records(&self) -> impl Iterator<Item = &TrustRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::TrustPolicy;
    use chrono::Duration;

    fn policy() -> TrustPolicy {
        TrustPolicy::default()
    }

    #[test]
    fn lazy_creation_at_initial_score() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        let outcome =
            ledger.record_violation("RDR-001", ViolationKind::ReplayAttack, "", 1.0, &p.scoring, now);
        // 100 - (10 × 1.5 × 1.0) = 85
        assert_eq!(outcome.score, 85);
        assert_eq!(outcome.status, TrustStatus::Trusted);
        assert_eq!(ledger.get("RDR-001").unwrap().last_violation_at, Some(now));
    }

    #[test]
    fn auth_failure_weighted_to_forty_points() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        let outcome =
            ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        assert_eq!(outcome.score, 60);
        assert_eq!(outcome.status, TrustStatus::Degraded);

        let outcome =
            ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        assert_eq!(outcome.score, 20);
        assert_eq!(outcome.status, TrustStatus::Suspended);
        assert!(outcome.rotate_key, "crossed below rotate_key_below");

        // Already below the line: no repeated rotation trigger.
        let outcome =
            ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        assert!(!outcome.rotate_key);
    }

    #[test]
    fn confidence_is_clamped_to_half() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        // 0.1 clamps up to 0.5: 12 × 1.0 × 0.5 = 6
        let outcome = ledger.record_violation(
            "RDR-001",
            ViolationKind::FraudSuspected,
            "",
            0.1,
            &p.scoring,
            now,
        );
        assert_eq!(outcome.applied_delta, -6);
    }

    #[test]
    fn score_floors_at_zero() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        for _ in 0..5 {
            ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        }
        assert_eq!(ledger.get("RDR-001").unwrap().score(), 0);
    }

    #[test]
    fn violation_log_is_append_only_per_reader() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        ledger.record_violation("A", ViolationKind::AuthFailure, "one", 1.0, &p.scoring, now);
        ledger.record_violation("B", ViolationKind::ReplayAttack, "two", 1.0, &p.scoring, now);
        ledger.record_violation("A", ViolationKind::ReplayAttack, "three", 1.0, &p.scoring, now);

        let of_a: Vec<_> = ledger.violations_of("A").collect();
        assert_eq!(of_a.len(), 2);
        assert_eq!(of_a[0].details, "one");
        assert_eq!(of_a[1].details, "three");
    }

    #[test]
    fn recovery_follows_logarithmic_curve() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(10);

        // Drive the score to 40 with a violation 10 hours ago.
        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        ledger.record_violation("RDR-001", ViolationKind::FraudSuspected, "", 0.9, &p.scoring, then);
        let before = ledger.get("RDR-001").unwrap().score();

        let now = Utc::now();
        let outcome = ledger
            .recover_by_decay("RDR-001", &p.decay, &p.scoring, now)
            .unwrap();
        // 2.0 × ln(11) ≈ 4.79 → 4 points
        let expected = (2.0 * 11.0_f64.ln()).floor() as u8;
        assert_eq!(outcome.old_score, before);
        assert_eq!(outcome.new_score, before + expected);
    }

    #[test]
    fn no_recovery_inside_min_window() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::minutes(30);

        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        assert!(ledger
            .recover_by_decay("RDR-001", &p.decay, &p.scoring, Utc::now())
            .is_none());
    }

    #[test]
    fn no_recovery_above_cap() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(5);

        // One replay: 100 → 85, already above the cap of 80.
        ledger.record_violation("RDR-001", ViolationKind::ReplayAttack, "", 1.0, &p.scoring, then);
        assert!(ledger
            .recover_by_decay("RDR-001", &p.decay, &p.scoring, Utc::now())
            .is_none());
    }

    #[test]
    fn recovery_never_exceeds_cap() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(10_000);

        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        let outcome = ledger
            .recover_by_decay("RDR-001", &p.decay, &p.scoring, Utc::now())
            .unwrap();
        assert_eq!(outcome.new_score, p.decay.max_recovery_cap);
    }

    #[test]
    fn quarantined_reader_never_recovers() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(5);

        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        ledger.set_quarantine("RDR-001", QuarantineState::Quarantined, then);
        assert!(ledger
            .recover_by_decay("RDR-001", &p.decay, &p.scoring, Utc::now())
            .is_none());
    }

    #[test]
    fn clean_reward_caps_at_full_trust() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        let snap = ledger.award_clean("RDR-001", &p.scoring, now);
        assert_eq!(snap.score, 100);
        assert!(ledger.get("RDR-001").unwrap().last_violation_at.is_none());
    }

    #[test]
    fn clean_reward_skipped_while_quarantined() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        ledger.set_quarantine("RDR-001", QuarantineState::Quarantined, now);
        let snap = ledger.award_clean("RDR-001", &p.scoring, now);
        assert_eq!(snap.score, 60);
    }

    #[test]
    fn reset_restores_full_trust() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let now = Utc::now();

        ledger.record_violation("RDR-001", ViolationKind::AuthFailure, "", 1.0, &p.scoring, now);
        ledger.set_quarantine("RDR-001", QuarantineState::Quarantined, now);
        ledger.reset("RDR-001", &p.scoring, now);

        let record = ledger.get("RDR-001").unwrap();
        assert_eq!(record.score(), 100);
        assert_eq!(record.status, TrustStatus::Trusted);
        assert_eq!(record.quarantine, QuarantineState::Normal);
    }

    #[test]
    fn recovery_candidates_filters_correctly() {
        let mut ledger = TrustLedger::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(2);

        // Eligible: degraded, not quarantined.
        ledger.record_violation("A", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        // Not eligible: quarantined.
        ledger.record_violation("B", ViolationKind::AuthFailure, "", 1.0, &p.scoring, then);
        ledger.set_quarantine("B", QuarantineState::Quarantined, then);
        // Not eligible: no violation ever.
        ledger.award_clean("C", &p.scoring, then);

        let candidates = ledger.recovery_candidates(&p.decay);
        assert_eq!(candidates, vec!["A".to_string()]);
    }
}
