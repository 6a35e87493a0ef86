//! Peer consensus on restoring a quarantined reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};
use crate::ledger::ReaderId;
use crate::policy::ConsensusPolicy;
use crate::quarantine::QuarantineId;

/// A peer's position on restoration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    /// The reader should be restored.
    Approve,
    /// The reader should stay quarantined.
    Reject,
}

/// One immutable peer vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusVote {
    /// Episode voted on.
    pub quarantine_id: QuarantineId,
    /// Voting reader.
    pub voter: ReaderId,
    /// The position taken.
    pub vote: Vote,
    /// Optional justification.
    pub reason: String,
    /// When the vote was cast.
    pub at: DateTime<Utc>,
}

/// Outcome of evaluating an episode's votes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConsensusOutcome {
    /// Too few votes to decide anything.
    NotReached {
        /// Votes cast so far.
        have: usize,
        /// Minimum required.
        need: usize,
    },
    /// Quorum met; approval compared against the threshold.
    Reached {
        /// Whether the approval ratio met the threshold.
        approved: bool,
        /// Approving votes.
        approvals: usize,
        /// Rejecting votes.
        rejections: usize,
        /// Approvals / total.
        ratio: f64,
    },
}

impl ConsensusOutcome {
    /// Whether quorum was met and the threshold reached.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, ConsensusOutcome::Reached { approved: true, .. })
    }
}

/// All votes across quarantine episodes.
#[derive(Clone, Debug, Default)]
pub struct VoteBook {
    votes: Vec<ConsensusVote>,
}

impl VoteBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cast a vote on an episode.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::SelfVoteNotAllowed`] when the voter is the
    /// quarantined reader, or [`TrustError::DuplicateVote`] when the voter
    /// already voted on this episode.
    pub fn cast(
        &mut self,
        quarantine_id: QuarantineId,
        subject: &str,
        voter: &str,
        vote: Vote,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if voter == subject {
            return Err(TrustError::SelfVoteNotAllowed);
        }
        if self
            .votes
            .iter()
            .any(|v| v.quarantine_id == quarantine_id && v.voter == voter)
        {
            return Err(TrustError::DuplicateVote {
                quarantine_id,
                voter: voter.to_string(),
            });
        }
        self.votes.push(ConsensusVote {
            quarantine_id,
            voter: voter.to_string(),
            vote,
            reason: reason.into(),
            at: now,
        });
        Ok(())
    }

    /// Evaluate an episode's votes against the consensus policy.
    #[must_use]
    pub fn evaluate(&self, quarantine_id: QuarantineId, policy: &ConsensusPolicy) -> ConsensusOutcome {
        let mut approvals = 0;
        let mut rejections = 0;
        for vote in self.votes.iter().filter(|v| v.quarantine_id == quarantine_id) {
            match vote.vote {
                Vote::Approve => approvals += 1,
                Vote::Reject => rejections += 1,
            }
        }
        let total = approvals + rejections;
        if total < policy.min_voters {
            return ConsensusOutcome::NotReached {
                have: total,
                need: policy.min_voters,
            };
        }
        let ratio = approvals as f64 / total as f64;
        ConsensusOutcome::Reached {
            approved: ratio >= policy.approval_threshold,
            approvals,
            rejections,
            ratio,
        }
    }

    /// All votes on one episode, in cast order.
    pub fn votes_for(&self, quarantine_id: QuarantineId) -> impl Iterator<Item = &ConsensusVote> {
        self.votes
            .iter()
            .filter(move |v| v.quarantine_id == quarantine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ConsensusPolicy {
        ConsensusPolicy::default()
    }

    #[test]
    fn single_vote_does_not_reach_consensus() {
        let mut book = VoteBook::new();
        book.cast(1, "SUBJECT", "PEER-1", Vote::Approve, "", Utc::now())
            .unwrap();
        assert_eq!(
            book.evaluate(1, &policy()),
            ConsensusOutcome::NotReached { have: 1, need: 2 }
        );
    }

    #[test]
    fn two_approvals_approve() {
        let mut book = VoteBook::new();
        book.cast(1, "SUBJECT", "PEER-1", Vote::Approve, "", Utc::now())
            .unwrap();
        book.cast(1, "SUBJECT", "PEER-2", Vote::Approve, "", Utc::now())
            .unwrap();
        assert!(book.evaluate(1, &policy()).is_approved());
    }

    #[test]
    fn split_vote_reaches_but_rejects() {
        let mut book = VoteBook::new();
        book.cast(1, "SUBJECT", "PEER-1", Vote::Approve, "", Utc::now())
            .unwrap();
        book.cast(1, "SUBJECT", "PEER-2", Vote::Reject, "", Utc::now())
            .unwrap();

        // Ratio 0.5 is below the 0.6 threshold.
        match book.evaluate(1, &policy()) {
            ConsensusOutcome::Reached {
                approved, ratio, ..
            } => {
                assert!(!approved);
                assert!((ratio - 0.5).abs() < f64::EPSILON);
            }
            other => panic!("expected Reached, got {other:?}"),
        }
    }

    #[test]
    fn self_vote_rejected() {
        let mut book = VoteBook::new();
        assert!(matches!(
            book.cast(1, "SUBJECT", "SUBJECT", Vote::Approve, "", Utc::now()),
            Err(TrustError::SelfVoteNotAllowed)
        ));
    }

    #[test]
    fn duplicate_vote_rejected() {
        let mut book = VoteBook::new();
        book.cast(1, "SUBJECT", "PEER-1", Vote::Approve, "", Utc::now())
            .unwrap();
        assert!(matches!(
            book.cast(1, "SUBJECT", "PEER-1", Vote::Reject, "", Utc::now()),
            Err(TrustError::DuplicateVote { .. })
        ));
    }

    #[test]
    fn votes_are_scoped_per_episode() {
        let mut book = VoteBook::new();
        book.cast(1, "SUBJECT", "PEER-1", Vote::Approve, "", Utc::now())
            .unwrap();
        // Same voter, different episode: allowed.
        book.cast(2, "SUBJECT", "PEER-1", Vote::Reject, "", Utc::now())
            .unwrap();

        assert_eq!(book.votes_for(1).count(), 1);
        assert_eq!(book.votes_for(2).count(), 1);
    }
}
