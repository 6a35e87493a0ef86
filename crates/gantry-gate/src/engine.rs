//! The trust engine: admission gate plus the full operator surface.
//!
//! `TrustEngine` owns every mutable book behind one mutex, so request-path
//! and reconciler mutations of the same reader are serialized under the
//! single-writer discipline the trust math requires. Decision paths take a
//! policy snapshot once per call; hot policy swaps never change the rules
//! mid-decision.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gantry_auth::{
    validate_freshness, verify_challenge, verify_event, AuthError, NonceLedger, Reader,
    ReaderRegistry, ReaderSecret,
};
use gantry_trust::{
    Challenge, ChallengeId, ChallengeResponse, ConsensusOutcome, GradeOutcome, PolicyHandle,
    QuarantineId, QuarantineReport, QuarantineState, RestoreReport, TrustError, TrustManager,
    TrustPolicy, TrustSnapshot, TrustStats, TrustStatus, Violation, ViolationKind, Vote,
};

use crate::error::Result;
use crate::event::{AdmissionDecision, RejectReason, TollEvent};
use crate::outlier::TrafficMonitor;
use crate::rate_limit::RateLimiter;
use crate::scorer::{FraudScorer, NoopScorer};

/// Aggregate counters for monitoring.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EngineStats {
    /// Readers in the registry.
    pub registered_readers: usize,
    /// Nonce records currently retained.
    pub tracked_nonces: usize,
    /// Trust-system counts.
    pub trust: TrustStats,
}

/// What one reconciliation cycle did.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Readers whose score recovered by decay.
    pub recovered: usize,
    /// Expired suspicion entries purged.
    pub purged_suspicions: usize,
    /// Nonce records pruned.
    pub pruned_nonces: usize,
}

struct EngineState {
    registry: ReaderRegistry,
    nonces: NonceLedger,
    trust: TrustManager,
    rate: RateLimiter,
    traffic: TrafficMonitor,
    known_tags: Vec<String>,
}

/// The reader trust and autonomous quarantine engine.
pub struct TrustEngine {
    policy: PolicyHandle,
    scorer: Arc<dyn FraudScorer>,
    inner: Mutex<EngineState>,
}

/// Record a penalty and run its side effects: quarantine check (inside the
/// manager) and proactive secret rotation when the score crosses below the
/// rotation threshold.
fn penalize(
    state: &mut EngineState,
    reader: &str,
    kind: ViolationKind,
    details: String,
    confidence: f64,
    policy: &TrustPolicy,
    now: DateTime<Utc>,
) -> TrustSnapshot {
    let report = state
        .trust
        .record_violation(reader, kind, details, confidence, policy, now);

    if report.outcome.rotate_key {
        // Severe degradation is presumptive compromise: invalidate the
        // current secret so a captured credential stops working.
        match state.registry.rotate_key(reader, ReaderSecret::generate()) {
            Ok(version) => warn!(
                reader = %reader,
                key_version = version,
                "secret proactively rotated on severe degradation"
            ),
            Err(err) => debug!(reader = %reader, error = %err, "proactive rotation skipped"),
        }
    }

    state
        .trust
        .trust_of(reader)
        .expect("record exists after violation")
}

impl TrustEngine {
    /// Create an engine with no fraud scorer wired in.
    #[must_use]
    pub fn new(policy: PolicyHandle) -> Self {
        Self::with_scorer(policy, Arc::new(NoopScorer))
    }

    /// Create an engine consulting the given fraud scorer on admission.
    #[must_use]
    pub fn with_scorer(policy: PolicyHandle, scorer: Arc<dyn FraudScorer>) -> Self {
        let retention = policy.snapshot().admission.nonce_retention_secs;
        Self {
            policy,
            scorer,
            inner: Mutex::new(EngineState {
                registry: ReaderRegistry::new(),
                nonces: NonceLedger::new(retention),
                trust: TrustManager::new(),
                rate: RateLimiter::new(),
                traffic: TrafficMonitor::new(),
                known_tags: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().expect("engine state lock poisoned")
    }

    fn default_snapshot(policy: &TrustPolicy) -> TrustSnapshot {
        TrustSnapshot {
            score: policy.scoring.initial_score,
            status: TrustStatus::for_score(
                policy.scoring.initial_score,
                policy.scoring.trusted_floor,
                policy.scoring.degraded_floor,
            ),
            quarantine: QuarantineState::Normal,
        }
    }

    /// Handle to the active policy, for hot reloads.
    #[must_use]
    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Run one event through the ordered admission checks.
    ///
    /// Each check short-circuits on failure; every failure except rate
    /// limiting and quarantine containment records a trust penalty against
    /// the reporting reader. Only events passing all checks may proceed to
    /// business logic.
    pub fn admit(&self, event: &TollEvent) -> AdmissionDecision {
        let policy = self.policy.snapshot();
        let now = Utc::now();
        let mut state = self.lock();

        // 1. Rate limit. Lightly penalized: bursts can be legitimate, so
        // this kind never triggers quarantine by itself.
        if !state.rate.admit(
            &event.reader_id,
            policy.admission.rate_window_secs,
            policy.admission.rate_max_events,
            now,
        ) {
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::RateLimitExceeded,
                format!("event {} over rate limit", event.event_id),
                1.0,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::RateLimited,
                trust: Some(trust),
            };
        }

        // 2. Reader existence, credential state, quarantine containment.
        let reader: Reader = match state.registry.get(&event.reader_id) {
            // Nothing to attribute a penalty to.
            None => {
                return AdmissionDecision::Rejected {
                    reason: RejectReason::UnknownReader,
                    trust: None,
                }
            }
            Some(r) => r.clone(),
        };
        if !reader.is_active() {
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::AuthFailure,
                "revoked credential presented".into(),
                1.0,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::ReaderRevoked,
                trust: Some(trust),
            };
        }
        if let Some(snap) = state.trust.trust_of(&event.reader_id) {
            if snap.quarantine != QuarantineState::Normal {
                // Containment is an outcome, not a fresh violation.
                return AdmissionDecision::Rejected {
                    reason: RejectReason::ReaderQuarantined,
                    trust: Some(snap),
                };
            }
        }

        // 3. Signature, distinguishing a stale key version from outright
        // forgery. A reader signing with a superseded secret cannot
        // produce a valid MAC under the active one.
        if verify_event(
            reader.secret(),
            &event.tag_hash,
            &event.reader_id,
            event.timestamp,
            &event.nonce,
            &event.signature,
        )
        .is_err()
        {
            return if event.key_version != reader.key_version {
                let trust = penalize(
                    &mut state,
                    &event.reader_id,
                    ViolationKind::StaleKeyVersion,
                    format!(
                        "signed under version {} but {} is active",
                        event.key_version, reader.key_version
                    ),
                    1.0,
                    &policy,
                    now,
                );
                AdmissionDecision::Rejected {
                    reason: RejectReason::StaleKeyVersion {
                        presented: event.key_version,
                        active: reader.key_version,
                    },
                    trust: Some(trust),
                }
            } else {
                let trust = penalize(
                    &mut state,
                    &event.reader_id,
                    ViolationKind::AuthFailure,
                    format!("signature mismatch on event {}", event.event_id),
                    1.0,
                    &policy,
                    now,
                );
                AdmissionDecision::Rejected {
                    reason: RejectReason::SignatureMismatch,
                    trust: Some(trust),
                }
            };
        }
        if event.key_version != reader.key_version {
            // MAC verifies under the live secret but the version claim is
            // stale: treat the claim itself as the violation.
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::StaleKeyVersion,
                format!(
                    "claimed version {} but {} is active",
                    event.key_version, reader.key_version
                ),
                1.0,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::StaleKeyVersion {
                    presented: event.key_version,
                    active: reader.key_version,
                },
                trust: Some(trust),
            };
        }

        // 4. Freshness, then the replay witness. Replay is weighted above
        // auth noise: a reused nonce implies a captured valid message.
        if let Err(AuthError::StaleTimestamp { drift_secs, .. }) =
            validate_freshness(event.timestamp, now, policy.admission.max_drift_secs)
        {
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::ReplayAttack,
                format!("timestamp drift {drift_secs}s on event {}", event.event_id),
                1.0,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::StaleTimestamp { drift_secs },
                trust: Some(trust),
            };
        }
        // The nonce write lands before any business processing, so two
        // concurrent replays of the same nonce cannot both pass.
        if state
            .nonces
            .record(&event.reader_id, &event.nonce, now)
            .is_err()
        {
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::ReplayAttack,
                format!("nonce reused on event {}", event.event_id),
                1.0,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::NonceReused,
                trust: Some(trust),
            };
        }

        // 5. Cross-reader outlier: statistical, hence lower confidence.
        if state.traffic.is_outlier(
            &event.reader_id,
            policy.admission.outlier_window_mins,
            policy.admission.outlier_multiplier,
            now,
        ) {
            let trust = penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::OutlierBehavior,
                "event rate far above peer average".into(),
                policy.admission.outlier_confidence,
                &policy,
                now,
            );
            return AdmissionDecision::Rejected {
                reason: RejectReason::OutlierTraffic,
                trust: Some(trust),
            };
        }

        // Admitted: record traffic and the tag sighting, then let the
        // fraud scorer weigh in as one more (probabilistic) signal.
        state.traffic.note(&event.reader_id, now);
        state
            .trust
            .record_sighting(&event.reader_id, &event.tag_hash, &policy, now);

        let fraud = self.scorer.assess(event);
        let combined = fraud.combined(policy.admission.anomaly_confidence_boost);
        let trust = if combined >= policy.admission.fraud_risk_threshold {
            penalize(
                &mut state,
                &event.reader_id,
                ViolationKind::FraudSuspected,
                format!("combined fraud risk {combined:.2} on event {}", event.event_id),
                combined,
                &policy,
                now,
            )
        } else {
            state.trust.award_clean(&event.reader_id, &policy, now)
        };

        debug!(
            event = %event.event_id,
            reader = %event.reader_id,
            score = trust.score,
            "event admitted"
        );
        AdmissionDecision::Accepted { trust, fraud }
    }

    /// Register a new reader.
    ///
    /// # Errors
    ///
    /// Fails if the id is already taken.
    pub fn register_reader(&self, id: &str, secret: ReaderSecret) -> Result<()> {
        self.lock().registry.register(id, secret)?;
        info!(reader = %id, "reader registered");
        Ok(())
    }

    /// Rotate a reader's secret, returning the new key version.
    ///
    /// # Errors
    ///
    /// Fails for unknown or revoked readers.
    pub fn rotate_key(&self, id: &str, new_secret: ReaderSecret) -> Result<u32> {
        let version = self.lock().registry.rotate_key(id, new_secret)?;
        info!(reader = %id, key_version = version, "reader key rotated");
        Ok(version)
    }

    /// Permanently revoke a reader's credential.
    ///
    /// # Errors
    ///
    /// Fails for unknown or already-revoked readers.
    pub fn revoke_reader(&self, id: &str) -> Result<()> {
        self.lock().registry.revoke(id)?;
        warn!(reader = %id, "reader revoked");
        Ok(())
    }

    /// Add a known-good tag hash for probation challenge generation.
    pub fn provision_known_tag(&self, tag: impl Into<String>) {
        self.lock().known_tags.push(tag.into());
    }

    /// A reader's active key version, if it is registered.
    #[must_use]
    pub fn key_version_of(&self, id: &str) -> Option<u32> {
        self.lock().registry.get(id).map(|r| r.key_version)
    }

    /// A reader's trust snapshot; readers never evaluated report the
    /// policy's initial score.
    #[must_use]
    pub fn trust_of(&self, reader: &str) -> TrustSnapshot {
        let policy = self.policy.snapshot();
        self.lock()
            .trust
            .trust_of(reader)
            .unwrap_or_else(|| Self::default_snapshot(&policy))
    }

    /// Violations recorded against a reader, oldest first.
    #[must_use]
    pub fn violations_of(&self, reader: &str) -> Vec<Violation> {
        self.lock().trust.violations_of(reader).cloned().collect()
    }

    /// Administrative override back to full trust.
    pub fn reset_trust(&self, reader: &str) {
        let policy = self.policy.snapshot();
        self.lock().trust.reset(reader, &policy, Utc::now());
    }

    /// Current fraud-sensitivity multiplier for a tag.
    #[must_use]
    pub fn suspicion_multiplier(&self, tag: &str) -> f64 {
        self.lock().trust.suspicion_multiplier(tag, Utc::now())
    }

    /// Issue the probation challenge batch for a quarantined reader.
    ///
    /// # Errors
    ///
    /// Fails unless the reader is quarantined with an open episode.
    pub fn issue_probation(&self, reader: &str) -> Result<Vec<Challenge>> {
        let policy = self.policy.snapshot();
        let mut state = self.lock();
        let tags = state.known_tags.clone();
        let challenges = state
            .trust
            .issue_probation(reader, &policy, &tags, Utc::now())?;
        Ok(challenges)
    }

    /// Grade a reader's response to a probation challenge.
    ///
    /// Signature challenges are recomputed against the reader's *current*
    /// secret in the registry.
    ///
    /// # Errors
    ///
    /// Fails for unknown or already-resolved challenges.
    pub fn grade_probation(
        &self,
        reader: &str,
        challenge_id: ChallengeId,
        response: &ChallengeResponse,
    ) -> Result<GradeOutcome> {
        let policy = self.policy.snapshot();
        let mut state = self.lock();
        let secret = state.registry.get(reader).map(|r| r.secret().clone());
        let reader_owned = reader.to_string();
        let outcome = state.trust.grade_probation(
            reader,
            challenge_id,
            response,
            move |nonce, presented| {
                secret
                    .as_ref()
                    .is_some_and(|s| verify_challenge(s, &reader_owned, nonce, presented))
            },
            &policy,
            Utc::now(),
        )?;
        Ok(outcome)
    }

    /// Cast a peer vote on a quarantine episode.
    ///
    /// The voter must hold an active credential and must not itself be
    /// quarantined.
    ///
    /// # Errors
    ///
    /// Fails for ineligible voters, self-votes and duplicates.
    pub fn cast_vote(
        &self,
        quarantine_id: QuarantineId,
        voter: &str,
        vote: Vote,
        reason: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.registry.require_active(voter)?;
        state
            .trust
            .cast_vote(quarantine_id, voter, vote, reason, Utc::now())?;
        Ok(())
    }

    /// Evaluate consensus for a quarantine episode.
    ///
    /// # Errors
    ///
    /// Fails for unknown episodes.
    pub fn consensus_of(&self, quarantine_id: QuarantineId) -> Result<ConsensusOutcome> {
        let policy = self.policy.snapshot();
        let outcome = self.lock().trust.consensus_of(quarantine_id, &policy)?;
        Ok(outcome)
    }

    /// Readers that may vote on an episode: active, not the subject, not
    /// themselves quarantined.
    ///
    /// # Errors
    ///
    /// Fails for unknown episodes.
    pub fn eligible_voters(&self, quarantine_id: QuarantineId) -> Result<Vec<String>> {
        let state = self.lock();
        let subject = state
            .trust
            .quarantine(quarantine_id)
            .map(|e| e.reader_id.clone())
            .ok_or(TrustError::UnknownQuarantine(quarantine_id))?;
        let mut voters: Vec<String> = state
            .registry
            .active_ids()
            .filter(|id| **id != subject)
            .filter(|id| {
                state
                    .trust
                    .trust_of(id)
                    .map_or(true, |s| s.quarantine == QuarantineState::Normal)
            })
            .cloned()
            .collect();
        voters.sort();
        Ok(voters)
    }

    /// Attempt full restoration of a probation reader.
    ///
    /// # Errors
    ///
    /// Returns the distinct unmet precondition: no active probation,
    /// probation incomplete, consensus pending, or consensus rejected.
    /// Nothing is mutated on failure.
    pub fn attempt_restore(&self, reader: &str) -> Result<RestoreReport> {
        let policy = self.policy.snapshot();
        let report = self
            .lock()
            .trust
            .attempt_restore(reader, &policy, Utc::now())?;
        Ok(report)
    }

    /// Operator summary of a reader's open quarantine, if any.
    #[must_use]
    pub fn quarantine_report(&self, reader: &str) -> Option<QuarantineReport> {
        self.lock().trust.quarantine_report(reader)
    }

    /// Aggregate counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let state = self.lock();
        EngineStats {
            registered_readers: state.registry.len(),
            tracked_nonces: state.nonces.len(),
            trust: state.trust.stats(Utc::now()),
        }
    }

    /// One reconciliation cycle: decay recovery for eligible readers,
    /// expired-suspicion purge, nonce pruning, window cleanup.
    pub fn run_reconciliation(&self) -> ReconcileSummary {
        let policy = self.policy.snapshot();
        let now = Utc::now();
        let mut state = self.lock();

        let recovered = state.trust.run_decay_cycle(&policy, now);
        let purged_suspicions = state.trust.purge_expired_suspicions(now);
        let pruned_nonces = state.nonces.prune(now);
        state.rate.cleanup(policy.admission.rate_window_secs, now);
        state
            .traffic
            .cleanup(policy.admission.outlier_window_mins, now);

        let summary = ReconcileSummary {
            recovered: recovered.len(),
            purged_suspicions,
            pruned_nonces,
        };
        debug!(
            recovered = summary.recovered,
            purged_suspicions = summary.purged_suspicions,
            pruned_nonces = summary.pruned_nonces,
            "reconciliation cycle complete"
        );
        summary
    }
}

impl std::fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustEngine").finish()
    }
}
