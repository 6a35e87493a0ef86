//! Central coordinator for trust mutations and the self-healing loop.
//!
//! `TrustManager` owns the ledger, quarantine log, challenge book, vote
//! book and suspicion board, and enforces the ordering between them:
//! every violation is considered for quarantine entry, probation feeds
//! grading penalties back into the ledger, and restoration re-checks its
//! preconditions on every call so retries are safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consensus::{ConsensusOutcome, Vote, VoteBook};
use crate::error::{Result, TrustError};
use crate::ledger::{
    ReaderId, RecoveryOutcome, TrustLedger, TrustSnapshot, Violation, ViolationKind,
    ViolationOutcome,
};
use crate::policy::TrustPolicy;
use crate::probation::{Challenge, ChallengeBook, ChallengeId, ChallengeResponse, GradeOutcome};
use crate::quarantine::{EpisodeStatus, QuarantineId, QuarantineLog, QuarantineRecord};
use crate::score::{QuarantineState, TrustStatus};
use crate::suspicion::{SightingLog, SuspicionBoard};

/// Result of recording one violation, including any quarantine it opened.
#[derive(Clone, Copy, Debug)]
pub struct ViolationReport {
    /// Ledger outcome of the penalty.
    pub outcome: ViolationOutcome,
    /// Episode opened by this violation, if it crossed the line.
    pub opened_quarantine: Option<QuarantineId>,
}

/// Result of a successful restoration.
#[derive(Clone, Debug)]
pub struct RestoreReport {
    /// Restored reader.
    pub reader_id: ReaderId,
    /// Score after the capped restoration bonus.
    pub score: u8,
    /// Status after restoration (Degraded by policy construction).
    pub status: TrustStatus,
    /// Episode that was released.
    pub quarantine_id: QuarantineId,
    /// Suspicion entries removed by the amnesty.
    pub cleared_suspicions: usize,
}

/// Operator-facing summary of a reader's open quarantine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuarantineReport {
    /// Reader under quarantine.
    pub reader_id: ReaderId,
    /// Quarantine position of the trust record.
    pub state: QuarantineState,
    /// Open episode id.
    pub quarantine_id: QuarantineId,
    /// Violation that triggered the episode.
    pub reason: ViolationKind,
    /// Severity level, 1..=3.
    pub severity: u8,
    /// When quarantine was entered.
    pub entered_at: DateTime<Utc>,
    /// Score at entry.
    pub score_at_entry: u8,
    /// Score now.
    pub current_score: u8,
    /// When probation began, if it has.
    pub probation_started_at: Option<DateTime<Utc>>,
    /// Challenges passed so far.
    pub challenges_passed: usize,
    /// Challenges issued in total.
    pub challenges_issued: usize,
    /// Approving votes so far.
    pub approvals: usize,
    /// Rejecting votes so far.
    pub rejections: usize,
}

/// Aggregate counts over the whole trust system.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TrustStats {
    /// Readers with a trust record.
    pub readers: usize,
    /// Readers in the Trusted tier.
    pub trusted: usize,
    /// Readers in the Degraded tier.
    pub degraded: usize,
    /// Readers in the Suspended tier.
    pub suspended: usize,
    /// Readers currently quarantined (pre-probation).
    pub quarantined: usize,
    /// Readers currently in probation.
    pub in_probation: usize,
    /// Active tag suspicion entries.
    pub active_suspicions: usize,
}

/// Coordinator owning every trust book.
#[derive(Clone, Debug, Default)]
pub struct TrustManager {
    ledger: TrustLedger,
    quarantines: QuarantineLog,
    challenges: ChallengeBook,
    votes: VoteBook,
    suspicion: SuspicionBoard,
    sightings: SightingLog,
}

impl TrustManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation, then check quarantine entry.
    ///
    /// Rate-limit violations are penalized but never trigger quarantine
    /// on their own: burst traffic is distinct from malice, and the next
    /// substantive violation will catch a score that has already sunk.
    pub fn record_violation(
        &mut self,
        reader: &str,
        kind: ViolationKind,
        details: impl Into<String>,
        confidence: f64,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> ViolationReport {
        let outcome =
            self.ledger
                .record_violation(reader, kind, details, confidence, &policy.scoring, now);

        let opened_quarantine = if kind == ViolationKind::RateLimitExceeded {
            None
        } else {
            self.maybe_quarantine(reader, kind, outcome.score, policy, now)
        };

        ViolationReport {
            outcome,
            opened_quarantine,
        }
    }

    /// Enter quarantine when the post-penalty score crosses the threshold
    /// or the violation is critical. Idempotent: a reader already
    /// quarantined (or in probation) never gets a second open episode.
    fn maybe_quarantine(
        &mut self,
        reader: &str,
        kind: ViolationKind,
        score_after_penalty: u8,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> Option<QuarantineId> {
        let triggered = score_after_penalty <= policy.quarantine.threshold
            || policy.quarantine.is_critical(kind);
        if !triggered {
            return None;
        }

        let record = self.ledger.get(reader)?;
        if record.quarantine != QuarantineState::Normal {
            return None;
        }

        let severity = policy.scoring.penalties.for_kind(kind).severity.max(1);
        let id = self
            .quarantines
            .open(reader, kind, severity, score_after_penalty, now);
        self.ledger
            .set_quarantine(reader, QuarantineState::Quarantined, now);

        // Tags this reader handled recently can no longer be taken at face
        // value by anyone else.
        let tags = self
            .sightings
            .recent_tags(reader, policy.suspicion.sighting_window_mins, now);
        if !tags.is_empty() {
            self.suspicion
                .propagate(reader, &tags, &policy.suspicion, now);
        }

        warn!(
            reader = %reader,
            quarantine_id = id,
            reason = %kind,
            severity,
            score = score_after_penalty,
            suspect_tags = tags.len(),
            "reader quarantined"
        );
        Some(id)
    }

    /// Record that a reader sighted a tag (admitted events only).
    pub fn record_sighting(
        &mut self,
        reader: &str,
        tag: &str,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) {
        self.sightings
            .record(reader, tag, policy.suspicion.sighting_window_mins, now);
    }

    /// Reward a fully clean admitted event.
    pub fn award_clean(
        &mut self,
        reader: &str,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> TrustSnapshot {
        self.ledger.award_clean(reader, &policy.scoring, now)
    }

    /// Snapshot of a reader's trust, if it has a record.
    #[must_use]
    pub fn trust_of(&self, reader: &str) -> Option<TrustSnapshot> {
        self.ledger.snapshot_of(reader)
    }

    /// Violations recorded against a reader, oldest first.
    pub fn violations_of(&self, reader: &str) -> impl Iterator<Item = &Violation> {
        self.ledger.violations_of(reader)
    }

    /// Administrative trust reset.
    pub fn reset(&mut self, reader: &str, policy: &TrustPolicy, now: DateTime<Utc>) {
        self.ledger.reset(reader, &policy.scoring, now);
        info!(reader = %reader, "trust administratively reset");
    }

    /// Current fraud-sensitivity multiplier for a tag.
    #[must_use]
    pub fn suspicion_multiplier(&self, tag: &str, now: DateTime<Utc>) -> f64 {
        self.suspicion.multiplier_for(tag, now)
    }

    /// Look up a quarantine episode.
    #[must_use]
    pub fn quarantine(&self, id: QuarantineId) -> Option<&QuarantineRecord> {
        self.quarantines.get(id)
    }

    /// Issue the probation challenge batch for a quarantined reader.
    ///
    /// Moves the episode and the trust record into probation.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::NotQuarantined`] unless the reader's record is
    /// `Quarantined`, or [`TrustError::NoActiveQuarantine`] if no Active
    /// episode exists for it.
    pub fn issue_probation(
        &mut self,
        reader: &str,
        policy: &TrustPolicy,
        known_tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Challenge>> {
        let record = self
            .ledger
            .get(reader)
            .ok_or_else(|| TrustError::NotQuarantined(reader.to_string()))?;
        if record.quarantine != QuarantineState::Quarantined {
            return Err(TrustError::NotQuarantined(reader.to_string()));
        }
        let episode = self
            .quarantines
            .open_for(reader)
            .filter(|e| e.status == EpisodeStatus::Active)
            .ok_or_else(|| TrustError::NoActiveQuarantine(reader.to_string()))?;
        let (episode_id, severity) = (episode.id, episode.severity);

        let ids = self.challenges.issue_batch(
            reader,
            episode_id,
            severity,
            &policy.probation,
            known_tags,
            now,
        );
        self.quarantines.begin_probation(episode_id, now)?;
        self.ledger
            .set_quarantine(reader, QuarantineState::Probation, now);

        info!(
            reader = %reader,
            quarantine_id = episode_id,
            challenges = ids.len(),
            "probation issued"
        );
        Ok(ids
            .into_iter()
            .filter_map(|id| self.challenges.get(id).cloned())
            .collect())
    }

    /// Grade a probation response.
    ///
    /// Exhausting a challenge's attempts records a probation-failure
    /// violation: failing probation is itself a violation.
    ///
    /// # Errors
    ///
    /// Propagates [`TrustError::UnknownChallenge`] and
    /// [`TrustError::ChallengeAlreadyResolved`] from the challenge book.
    pub fn grade_probation<F>(
        &mut self,
        reader: &str,
        challenge_id: ChallengeId,
        response: &ChallengeResponse,
        verify_signature: F,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> Result<GradeOutcome>
    where
        F: FnOnce(&str, &str) -> bool,
    {
        let outcome = self
            .challenges
            .grade(reader, challenge_id, response, verify_signature, now)?;

        if outcome == GradeOutcome::Exhausted {
            // Already quarantined, so this cannot open a second episode.
            self.record_violation(
                reader,
                ViolationKind::ProbationFailure,
                format!("challenge {challenge_id} ran out of attempts"),
                1.0,
                policy,
                now,
            );
        }
        Ok(outcome)
    }

    /// Whether every challenge of an episode has passed.
    #[must_use]
    pub fn all_challenges_passed(&self, quarantine_id: QuarantineId) -> bool {
        self.challenges.all_passed(quarantine_id)
    }

    /// Cast a peer vote on a quarantine episode.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownQuarantine`] for a missing episode,
    /// [`TrustError::VoterIneligible`] when the voter is itself quarantined
    /// or in probation, and propagates self-vote/duplicate errors from the
    /// vote book.
    pub fn cast_vote(
        &mut self,
        quarantine_id: QuarantineId,
        voter: &str,
        vote: Vote,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let subject = self
            .quarantines
            .get(quarantine_id)
            .map(|e| e.reader_id.clone())
            .ok_or(TrustError::UnknownQuarantine(quarantine_id))?;

        // A compromised peer cannot vouch for another.
        if let Some(record) = self.ledger.get(voter) {
            if record.quarantine != QuarantineState::Normal {
                return Err(TrustError::VoterIneligible(voter.to_string()));
            }
        }

        self.votes
            .cast(quarantine_id, &subject, voter, vote, reason, now)
    }

    /// Evaluate consensus for an episode.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownQuarantine`] for a missing episode.
    pub fn consensus_of(
        &self,
        quarantine_id: QuarantineId,
        policy: &TrustPolicy,
    ) -> Result<ConsensusOutcome> {
        if self.quarantines.get(quarantine_id).is_none() {
            return Err(TrustError::UnknownQuarantine(quarantine_id));
        }
        Ok(self.votes.evaluate(quarantine_id, &policy.consensus))
    }

    /// The only path back to normal operation.
    ///
    /// Re-checks every precondition on every call; a failure mutates
    /// nothing, so callers may retry after a timeout without external
    /// deduplication.
    ///
    /// # Errors
    ///
    /// - [`TrustError::NoActiveProbation`]: no episode in probation
    /// - [`TrustError::ProbationIncomplete`]: not every challenge passed
    /// - [`TrustError::ConsensusPending`]: quorum not met
    /// - [`TrustError::ConsensusRejected`]: quorum met, threshold missed
    pub fn attempt_restore(
        &mut self,
        reader: &str,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> Result<RestoreReport> {
        let episode = self
            .quarantines
            .open_for(reader)
            .filter(|e| e.status == EpisodeStatus::Probation)
            .ok_or_else(|| TrustError::NoActiveProbation(reader.to_string()))?;
        let quarantine_id = episode.id;

        let (passed, issued) = self.challenges.progress(quarantine_id);
        if issued == 0 || passed < issued {
            return Err(TrustError::ProbationIncomplete {
                passed,
                required: issued,
            });
        }

        match self.votes.evaluate(quarantine_id, &policy.consensus) {
            ConsensusOutcome::NotReached { have, need } => {
                return Err(TrustError::ConsensusPending { have, need });
            }
            ConsensusOutcome::Reached {
                approved: false,
                approvals,
                rejections,
                ..
            } => {
                return Err(TrustError::ConsensusRejected {
                    approvals,
                    rejections,
                });
            }
            ConsensusOutcome::Reached { approved: true, .. } => {}
        }

        let record = self
            .ledger
            .get(reader)
            .ok_or_else(|| TrustError::NoActiveProbation(reader.to_string()))?;
        let restored = (record.score() as u32 + u32::from(policy.probation.restoration_bonus))
            .min(u32::from(policy.probation.probation_cap)) as u8;

        self.ledger.set_score(reader, restored, &policy.scoring, now);
        self.ledger
            .set_quarantine(reader, QuarantineState::Normal, now);
        self.quarantines.release(quarantine_id, now)?;
        let cleared_suspicions = self.suspicion.clear_source(reader);

        let snapshot = self
            .ledger
            .snapshot_of(reader)
            .ok_or_else(|| TrustError::NoActiveProbation(reader.to_string()))?;
        info!(
            reader = %reader,
            quarantine_id,
            score = snapshot.score,
            status = %snapshot.status,
            cleared_suspicions,
            "reader restored from quarantine"
        );
        Ok(RestoreReport {
            reader_id: reader.to_string(),
            score: snapshot.score,
            status: snapshot.status,
            quarantine_id,
            cleared_suspicions,
        })
    }

    /// Apply decay recovery to every eligible reader.
    pub fn run_decay_cycle(
        &mut self,
        policy: &TrustPolicy,
        now: DateTime<Utc>,
    ) -> Vec<(ReaderId, RecoveryOutcome)> {
        let mut recovered = Vec::new();
        for reader in self.ledger.recovery_candidates(&policy.decay) {
            if let Some(outcome) =
                self.ledger
                    .recover_by_decay(&reader, &policy.decay, &policy.scoring, now)
            {
                recovered.push((reader, outcome));
            }
        }
        recovered
    }

    /// Drop expired suspicion entries.
    pub fn purge_expired_suspicions(&mut self, now: DateTime<Utc>) -> usize {
        self.suspicion.purge_expired(now)
    }

    /// Operator summary of a reader's open quarantine, if any.
    #[must_use]
    pub fn quarantine_report(&self, reader: &str) -> Option<QuarantineReport> {
        let record = self.ledger.get(reader)?;
        if record.quarantine == QuarantineState::Normal {
            return None;
        }
        let episode = self.quarantines.open_for(reader)?;
        let (challenges_passed, challenges_issued) = self.challenges.progress(episode.id);
        let mut approvals = 0;
        let mut rejections = 0;
        for vote in self.votes.votes_for(episode.id) {
            match vote.vote {
                Vote::Approve => approvals += 1,
                Vote::Reject => rejections += 1,
            }
        }
        Some(QuarantineReport {
            reader_id: reader.to_string(),
            state: record.quarantine,
            quarantine_id: episode.id,
            reason: episode.reason,
            severity: episode.severity,
            entered_at: episode.entered_at,
            score_at_entry: episode.score_at_entry,
            current_score: record.score(),
            probation_started_at: episode.probation_started_at,
            challenges_passed,
            challenges_issued,
            approvals,
            rejections,
        })
    }

    /// Aggregate counts over the whole system.
    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> TrustStats {
        let mut stats = TrustStats {
            active_suspicions: self.suspicion.active_count(now),
            ..TrustStats::default()
        };
        for record in self.ledger.records() {
            stats.readers += 1;
            match record.status {
                TrustStatus::Trusted => stats.trusted += 1,
                TrustStatus::Degraded => stats.degraded += 1,
                TrustStatus::Suspended => stats.suspended += 1,
            }
            match record.quarantine {
                QuarantineState::Quarantined => stats.quarantined += 1,
                QuarantineState::Probation => stats.in_probation += 1,
                QuarantineState::Normal => {}
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probation::ChallengePayload;
    use chrono::Duration;

    fn policy() -> TrustPolicy {
        TrustPolicy::default()
    }

    fn quarantine_by_critical(manager: &mut TrustManager, reader: &str) -> QuarantineId {
        let report = manager.record_violation(
            reader,
            ViolationKind::AuthFailure,
            "forged signature",
            1.0,
            &policy(),
            Utc::now(),
        );
        report.opened_quarantine.expect("critical violation quarantines")
    }

    fn pass_all_challenges(manager: &mut TrustManager, reader: &str, challenges: &[Challenge]) {
        for challenge in challenges {
            let response = match &challenge.payload {
                ChallengePayload::KnownTag { expected_tag } => ChallengeResponse::KnownTag {
                    tag_hash: expected_tag.clone(),
                },
                ChallengePayload::TimingCheck { nonce, .. } => ChallengeResponse::TimingCheck {
                    nonce: nonce.clone(),
                    response_time_ms: 1200,
                },
                ChallengePayload::SignatureVerify { .. } => ChallengeResponse::SignatureVerify {
                    signature: "valid".into(),
                },
            };
            let outcome = manager
                .grade_probation(
                    reader,
                    challenge.id,
                    &response,
                    |_, sig| sig == "valid",
                    &policy(),
                    Utc::now(),
                )
                .unwrap();
            assert_eq!(outcome, GradeOutcome::Passed);
        }
    }

    #[test]
    fn threshold_crossing_quarantines() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();

        // FraudSuspected is not critical; only the threshold can trigger.
        let mut last = None;
        for _ in 0..6 {
            last = Some(manager.record_violation(
                "RDR-001",
                ViolationKind::FraudSuspected,
                "",
                1.0,
                &p,
                now,
            ));
        }
        let report = last.unwrap();
        // 100 − 6×12 = 28 ≤ 35
        assert_eq!(report.outcome.score, 28);
        assert!(report.opened_quarantine.is_some());
        assert_eq!(
            manager.trust_of("RDR-001").unwrap().quarantine,
            QuarantineState::Quarantined
        );
    }

    #[test]
    fn critical_violation_quarantines_above_threshold() {
        let mut manager = TrustManager::new();
        let id = quarantine_by_critical(&mut manager, "RDR-001");

        let episode = manager.quarantine(id).unwrap();
        assert_eq!(episode.severity, 2);
        assert_eq!(episode.score_at_entry, 60);
        assert_eq!(episode.reason, ViolationKind::AuthFailure);
    }

    #[test]
    fn second_violation_does_not_open_second_episode() {
        let mut manager = TrustManager::new();
        let first = quarantine_by_critical(&mut manager, "RDR-001");

        let report = manager.record_violation(
            "RDR-001",
            ViolationKind::ReplayAttack,
            "",
            1.0,
            &policy(),
            Utc::now(),
        );
        assert!(report.opened_quarantine.is_none());
        assert_eq!(manager.quarantine(first).unwrap().status, EpisodeStatus::Active);
    }

    #[test]
    fn rate_limit_violations_never_quarantine() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();

        for _ in 0..60 {
            let report = manager.record_violation(
                "RDR-001",
                ViolationKind::RateLimitExceeded,
                "",
                1.0,
                &p,
                now,
            );
            assert!(report.opened_quarantine.is_none());
        }
        let snap = manager.trust_of("RDR-001").unwrap();
        assert_eq!(snap.score, 0);
        assert_eq!(snap.quarantine, QuarantineState::Normal);
    }

    #[test]
    fn quarantine_propagates_suspicion_to_recent_tags() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();

        manager.record_sighting("RDR-001", "TAG-A", &p, now - Duration::minutes(10));
        manager.record_sighting("RDR-001", "TAG-B", &p, now - Duration::minutes(5));
        // Too old to be inside the one-hour window.
        manager.record_sighting("RDR-001", "TAG-OLD", &p, now - Duration::minutes(90));

        quarantine_by_critical(&mut manager, "RDR-001");

        assert!(manager.suspicion_multiplier("TAG-A", now) > 1.0);
        assert!(manager.suspicion_multiplier("TAG-B", now) > 1.0);
        assert!((manager.suspicion_multiplier("TAG-OLD", now) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn probation_requires_quarantine() {
        let mut manager = TrustManager::new();
        assert!(matches!(
            manager.issue_probation("RDR-001", &policy(), &[], Utc::now()),
            Err(TrustError::NotQuarantined(_))
        ));
    }

    #[test]
    fn probation_batch_scales_with_severity() {
        let mut manager = TrustManager::new();
        quarantine_by_critical(&mut manager, "RDR-001");

        let challenges = manager
            .issue_probation(
                "RDR-001",
                &policy(),
                &["KNOWN-TAG".to_string()],
                Utc::now(),
            )
            .unwrap();
        // severity 2 → 3 + (2 − 1) = 4 challenges
        assert_eq!(challenges.len(), 4);
        assert_eq!(
            manager.trust_of("RDR-001").unwrap().quarantine,
            QuarantineState::Probation
        );
    }

    #[test]
    fn exhausted_challenge_is_itself_a_violation() {
        let mut manager = TrustManager::new();
        quarantine_by_critical(&mut manager, "RDR-001");
        let challenges = manager
            .issue_probation("RDR-001", &policy(), &["TAG".to_string()], Utc::now())
            .unwrap();
        let target = &challenges[0];
        let score_before = manager.trust_of("RDR-001").unwrap().score;

        let wrong = ChallengeResponse::KnownTag {
            tag_hash: "WRONG".into(),
        };
        for _ in 0..2 {
            manager
                .grade_probation(
                    "RDR-001",
                    target.id,
                    &wrong,
                    |_, _| false,
                    &policy(),
                    Utc::now(),
                )
                .unwrap();
        }
        let score_after = manager.trust_of("RDR-001").unwrap().score;
        assert!(score_after < score_before);
        let kinds: Vec<_> = manager
            .violations_of("RDR-001")
            .map(|v| v.kind)
            .collect();
        assert!(kinds.contains(&ViolationKind::ProbationFailure));
    }

    #[test]
    fn quarantined_voter_is_ineligible() {
        let mut manager = TrustManager::new();
        let id = quarantine_by_critical(&mut manager, "RDR-001");
        quarantine_by_critical(&mut manager, "RDR-002");

        assert!(matches!(
            manager.cast_vote(id, "RDR-002", Vote::Approve, "", Utc::now()),
            Err(TrustError::VoterIneligible(_))
        ));
        // A clean peer may vote.
        assert!(manager.cast_vote(id, "RDR-003", Vote::Approve, "", Utc::now()).is_ok());
    }

    #[test]
    fn restore_fails_stepwise_then_succeeds() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();
        let id = quarantine_by_critical(&mut manager, "RDR-001");

        // Still Active, not in probation.
        assert!(matches!(
            manager.attempt_restore("RDR-001", &p, now),
            Err(TrustError::NoActiveProbation(_))
        ));

        let challenges = manager
            .issue_probation("RDR-001", &p, &["TAG".to_string()], now)
            .unwrap();
        assert!(matches!(
            manager.attempt_restore("RDR-001", &p, now),
            Err(TrustError::ProbationIncomplete { .. })
        ));

        pass_all_challenges(&mut manager, "RDR-001", &challenges);
        assert!(matches!(
            manager.attempt_restore("RDR-001", &p, now),
            Err(TrustError::ConsensusPending { have: 0, need: 2 })
        ));

        manager.cast_vote(id, "PEER-1", Vote::Approve, "looks healthy", now).unwrap();
        assert!(matches!(
            manager.attempt_restore("RDR-001", &p, now),
            Err(TrustError::ConsensusPending { have: 1, need: 2 })
        ));

        manager.cast_vote(id, "PEER-2", Vote::Approve, "ok", now).unwrap();
        let report = manager.attempt_restore("RDR-001", &p, now).unwrap();

        // 60 at entry + 20 bonus, capped at 60 → 60; Degraded, never Trusted.
        assert!(report.score <= p.probation.probation_cap);
        assert_eq!(report.status, TrustStatus::Degraded);
        let snap = manager.trust_of("RDR-001").unwrap();
        assert_eq!(snap.quarantine, QuarantineState::Normal);
        assert_eq!(
            manager.quarantine(id).unwrap().status,
            EpisodeStatus::Released
        );
    }

    #[test]
    fn rejected_consensus_blocks_restore() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();
        let id = quarantine_by_critical(&mut manager, "RDR-001");
        let challenges = manager
            .issue_probation("RDR-001", &p, &["TAG".to_string()], now)
            .unwrap();
        pass_all_challenges(&mut manager, "RDR-001", &challenges);

        manager.cast_vote(id, "PEER-1", Vote::Approve, "", now).unwrap();
        manager.cast_vote(id, "PEER-2", Vote::Reject, "still flaky", now).unwrap();

        // Ratio 0.5 < 0.6: reached but not approved. No state change.
        assert!(matches!(
            manager.attempt_restore("RDR-001", &p, now),
            Err(TrustError::ConsensusRejected {
                approvals: 1,
                rejections: 1
            })
        ));
        assert_eq!(
            manager.trust_of("RDR-001").unwrap().quarantine,
            QuarantineState::Probation
        );
    }

    #[test]
    fn restoration_amnesties_suspicion() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();

        manager.record_sighting("RDR-001", "TAG-A", &p, now);
        let id = quarantine_by_critical(&mut manager, "RDR-001");
        assert!(manager.suspicion_multiplier("TAG-A", now) > 1.0);

        let challenges = manager
            .issue_probation("RDR-001", &p, &["TAG".to_string()], now)
            .unwrap();
        pass_all_challenges(&mut manager, "RDR-001", &challenges);
        manager.cast_vote(id, "PEER-1", Vote::Approve, "", now).unwrap();
        manager.cast_vote(id, "PEER-2", Vote::Approve, "", now).unwrap();

        let report = manager.attempt_restore("RDR-001", &p, now).unwrap();
        assert_eq!(report.cleared_suspicions, 1);
        assert!((manager.suspicion_multiplier("TAG-A", now) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decay_cycle_skips_quarantined_readers() {
        let mut manager = TrustManager::new();
        let p = policy();
        let then = Utc::now() - Duration::hours(3);

        // Eligible reader: two fraud flags 3 hours ago pull it to 76,
        // under the recovery cap, without tripping quarantine.
        manager.record_violation("RDR-CLEANISH", ViolationKind::FraudSuspected, "", 1.0, &p, then);
        manager.record_violation("RDR-CLEANISH", ViolationKind::FraudSuspected, "", 1.0, &p, then);
        // Quarantined reader.
        manager.record_violation("RDR-BAD", ViolationKind::AuthFailure, "", 1.0, &p, then);

        let recovered = manager.run_decay_cycle(&p, Utc::now());
        let names: Vec<_> = recovered.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(names, vec!["RDR-CLEANISH"]);
    }

    #[test]
    fn quarantine_report_tallies_progress() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();
        let id = quarantine_by_critical(&mut manager, "RDR-001");
        let challenges = manager
            .issue_probation("RDR-001", &p, &["TAG".to_string()], now)
            .unwrap();
        pass_all_challenges(&mut manager, "RDR-001", &challenges[..1]);
        manager.cast_vote(id, "PEER-1", Vote::Approve, "", now).unwrap();

        let report = manager.quarantine_report("RDR-001").unwrap();
        assert_eq!(report.quarantine_id, id);
        assert_eq!(report.state, QuarantineState::Probation);
        assert_eq!(report.challenges_passed, 1);
        assert_eq!(report.challenges_issued, 4);
        assert_eq!(report.approvals, 1);
        assert_eq!(report.rejections, 0);
    }

    #[test]
    fn stats_count_tiers_and_states() {
        let mut manager = TrustManager::new();
        let p = policy();
        let now = Utc::now();

        manager.award_clean("RDR-OK", &p, now);
        manager.record_violation("RDR-DEGRADED", ViolationKind::AuthFailure, "", 1.0, &p, now);

        let stats = manager.stats(now);
        assert_eq!(stats.readers, 2);
        assert_eq!(stats.trusted, 1);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.quarantined, 1);
    }
}
