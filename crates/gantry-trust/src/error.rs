//! Error types for trust and quarantine operations.
//!
//! Policy-precondition failures (probation incomplete, consensus pending or
//! rejected) are ordinary variants here: they cause no state change and are
//! safe to retry once the precondition is met.

use thiserror::Error;

/// Errors that can occur during trust and quarantine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrustError {
    /// Operation requires the reader to be quarantined.
    #[error("reader {0} is not quarantined")]
    NotQuarantined(String),

    /// Reader is flagged quarantined but no open episode exists.
    #[error("no active quarantine episode for reader {0}")]
    NoActiveQuarantine(String),

    /// Restoration requires an episode in probation.
    #[error("no probation in progress for reader {0}")]
    NoActiveProbation(String),

    /// Not every probation challenge has been passed.
    #[error("probation incomplete: {passed} of {required} challenges passed")]
    ProbationIncomplete {
        /// Challenges passed so far.
        passed: usize,
        /// Challenges that must pass.
        required: usize,
    },

    /// Too few peers have voted for consensus to be evaluated.
    #[error("consensus not reached: {have} of {need} required votes")]
    ConsensusPending {
        /// Votes cast so far.
        have: usize,
        /// Minimum votes required.
        need: usize,
    },

    /// Peers voted, but approval fell below the threshold.
    #[error("consensus rejected restoration: {approvals} approve, {rejections} reject")]
    ConsensusRejected {
        /// Approving votes.
        approvals: usize,
        /// Rejecting votes.
        rejections: usize,
    },

    /// No quarantine episode with this id.
    #[error("unknown quarantine episode: {0}")]
    UnknownQuarantine(u64),

    /// No challenge with this id for this reader.
    #[error("unknown challenge: {0}")]
    UnknownChallenge(u64),

    /// Challenge already graded to a terminal outcome.
    #[error("challenge {0} already resolved")]
    ChallengeAlreadyResolved(u64),

    /// A reader cannot vote on its own quarantine.
    #[error("reader cannot vote on its own quarantine")]
    SelfVoteNotAllowed,

    /// One vote per voter per quarantine.
    #[error("reader {voter} already voted on quarantine {quarantine_id}")]
    DuplicateVote {
        /// Episode voted on.
        quarantine_id: u64,
        /// Offending voter.
        voter: String,
    },

    /// Quarantined or suspended peers cannot vouch for another reader.
    #[error("reader {0} is not eligible to vote")]
    VoterIneligible(String),
}

/// Result type for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;
