//! Graduated probation challenges for quarantined readers.
//!
//! A quarantined reader proves it is healthy again by passing a batch of
//! challenges issued round-robin across three kinds:
//!
//! - `KnownTag`: report a tag hash the server already knows to be good
//! - `TimingCheck`: echo a server nonce within a bounded response time
//! - `SignatureVerify`: HMAC-sign a server nonce with the current secret
//!
//! Harsher quarantines demand more proof: the batch size grows with the
//! episode's severity.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TrustError};
use crate::ledger::ReaderId;
use crate::policy::ProbationPolicy;
use crate::quarantine::QuarantineId;

/// Identifier of a probation challenge.
pub type ChallengeId = u64;

/// Kind-specific data the reader must answer to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChallengePayload {
    /// Report the expected tag hash.
    KnownTag {
        /// Tag hash the server knows a priori.
        expected_tag: String,
    },
    /// Echo the nonce within the deadline.
    TimingCheck {
        /// Server nonce to echo back.
        nonce: String,
        /// Response deadline, in milliseconds.
        max_response_ms: u64,
    },
    /// HMAC-sign `reader_id ∥ nonce` with the current secret.
    SignatureVerify {
        /// Server nonce to sign.
        nonce: String,
    },
}

/// Terminal or pending state of a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeOutcome {
    /// Not yet resolved.
    Pending,
    /// Answered correctly.
    Pass,
    /// Attempts exhausted without a correct answer.
    Fail,
}

/// One probation challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge id, assigned monotonically.
    pub id: ChallengeId,
    /// Reader under probation.
    pub reader_id: ReaderId,
    /// Episode this challenge belongs to.
    pub quarantine_id: QuarantineId,
    /// What the reader must answer.
    pub payload: ChallengePayload,
    /// Resolution state.
    pub outcome: ChallengeOutcome,
    /// Attempts consumed so far.
    pub attempts: u32,
    /// Attempts allowed before terminal failure.
    pub max_attempts: u32,
    /// When the challenge was issued.
    pub issued_at: DateTime<Utc>,
    /// When the challenge reached a terminal outcome.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A reader's answer to one challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ChallengeResponse {
    /// Answer to a `KnownTag` challenge.
    KnownTag {
        /// Reported tag hash.
        tag_hash: String,
    },
    /// Answer to a `TimingCheck` challenge.
    TimingCheck {
        /// Echoed nonce.
        nonce: String,
        /// Measured response time, in milliseconds.
        response_time_ms: u64,
    },
    /// Answer to a `SignatureVerify` challenge.
    SignatureVerify {
        /// Hex HMAC over `reader_id ∥ nonce`.
        signature: String,
    },
}

/// Result of grading one response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradeOutcome {
    /// Correct answer; challenge is resolved.
    Passed,
    /// Wrong answer; attempts remain.
    Failed {
        /// Attempts left before terminal failure.
        attempts_remaining: u32,
    },
    /// Wrong answer and no attempts left; the challenge failed terminally
    /// and the caller must record a probation-failure violation.
    Exhausted,
}

fn challenge_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// All probation challenges across episodes.
#[derive(Clone, Debug, Default)]
pub struct ChallengeBook {
    challenges: BTreeMap<ChallengeId, Challenge>,
    next_id: ChallengeId,
}

impl ChallengeBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the challenge batch for a quarantine episode.
    ///
    /// Batch size is `challenges_required + (severity − 1)`. Kinds rotate
    /// round-robin; when no known-good tags are available, `KnownTag` slots
    /// fall back to `SignatureVerify` so the batch never shrinks.
    pub fn issue_batch(
        &mut self,
        reader: &str,
        quarantine_id: QuarantineId,
        severity: u8,
        policy: &ProbationPolicy,
        known_tags: &[String],
        now: DateTime<Utc>,
    ) -> Vec<ChallengeId> {
        let count = policy.challenges_required + u32::from(severity.saturating_sub(1));
        let mut issued = Vec::with_capacity(count as usize);

        for i in 0..count {
            let payload = match i % 3 {
                0 if !known_tags.is_empty() => ChallengePayload::KnownTag {
                    expected_tag: known_tags[i as usize % known_tags.len()].clone(),
                },
                1 => ChallengePayload::TimingCheck {
                    nonce: challenge_nonce(),
                    max_response_ms: policy.timing_max_response_ms,
                },
                _ => ChallengePayload::SignatureVerify {
                    nonce: challenge_nonce(),
                },
            };

            self.next_id += 1;
            let id = self.next_id;
            self.challenges.insert(
                id,
                Challenge {
                    id,
                    reader_id: reader.to_string(),
                    quarantine_id,
                    payload,
                    outcome: ChallengeOutcome::Pending,
                    attempts: 0,
                    max_attempts: policy.max_attempts,
                    issued_at: now,
                    completed_at: None,
                },
            );
            issued.push(id);
        }
        issued
    }

    /// Grade a reader's response to one of its challenges.
    ///
    /// `verify_signature` is consulted only for `SignatureVerify`
    /// challenges; it receives the challenge nonce and the presented
    /// signature, and recomputes the expected MAC against the reader's
    /// current secret (which this crate does not hold).
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownChallenge`] if the id does not exist or
    /// belongs to a different reader, and
    /// [`TrustError::ChallengeAlreadyResolved`] for a terminal challenge.
    pub fn grade<F>(
        &mut self,
        reader: &str,
        id: ChallengeId,
        response: &ChallengeResponse,
        verify_signature: F,
        now: DateTime<Utc>,
    ) -> Result<GradeOutcome>
    where
        F: FnOnce(&str, &str) -> bool,
    {
        let challenge = self
            .challenges
            .get_mut(&id)
            .filter(|c| c.reader_id == reader)
            .ok_or(TrustError::UnknownChallenge(id))?;
        if challenge.outcome != ChallengeOutcome::Pending {
            return Err(TrustError::ChallengeAlreadyResolved(id));
        }

        challenge.attempts += 1;

        let passed = match (&challenge.payload, response) {
            (
                ChallengePayload::KnownTag { expected_tag },
                ChallengeResponse::KnownTag { tag_hash },
            ) => expected_tag.eq_ignore_ascii_case(tag_hash),
            (
                ChallengePayload::TimingCheck {
                    nonce,
                    max_response_ms,
                },
                ChallengeResponse::TimingCheck {
                    nonce: echoed,
                    response_time_ms,
                },
            ) => nonce == echoed && response_time_ms <= max_response_ms,
            (
                ChallengePayload::SignatureVerify { nonce },
                ChallengeResponse::SignatureVerify { signature },
            ) => verify_signature(nonce, signature),
            // Mismatched response kind is simply a wrong answer.
            _ => false,
        };

        if passed {
            challenge.outcome = ChallengeOutcome::Pass;
            challenge.completed_at = Some(now);
            return Ok(GradeOutcome::Passed);
        }

        if challenge.attempts >= challenge.max_attempts {
            challenge.outcome = ChallengeOutcome::Fail;
            challenge.completed_at = Some(now);
            return Ok(GradeOutcome::Exhausted);
        }

        Ok(GradeOutcome::Failed {
            attempts_remaining: challenge.max_attempts - challenge.attempts,
        })
    }

    /// Look up a challenge.
    #[must_use]
    pub fn get(&self, id: ChallengeId) -> Option<&Challenge> {
        self.challenges.get(&id)
    }

    /// All challenges of one episode, in issue order.
    pub fn for_quarantine(
        &self,
        quarantine_id: QuarantineId,
    ) -> impl Iterator<Item = &Challenge> {
        self.challenges
            .values()
            .filter(move |c| c.quarantine_id == quarantine_id)
    }

    /// Passed / issued counts for one episode.
    #[must_use]
    pub fn progress(&self, quarantine_id: QuarantineId) -> (usize, usize) {
        let mut passed = 0;
        let mut issued = 0;
        for challenge in self.for_quarantine(quarantine_id) {
            issued += 1;
            if challenge.outcome == ChallengeOutcome::Pass {
                passed += 1;
            }
        }
        (passed, issued)
    }

    /// Whether every issued challenge of the episode has passed.
    #[must_use]
    pub fn all_passed(&self, quarantine_id: QuarantineId) -> bool {
        let (passed, issued) = self.progress(quarantine_id);
        issued > 0 && passed >= issued
    }
}
