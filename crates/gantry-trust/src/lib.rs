//! # gantry-trust
//!
//! Reader reputation and the self-healing quarantine loop for the Gantry
//! toll network.
//!
//! This crate provides:
//! - **TrustPolicy**: every threshold, weight and window as hot-swappable data
//! - **TrustLedger**: per-reader 0–100 scores, violation log, time-decay recovery
//! - **QuarantineLog**: autonomous quarantine episodes with severity escalation
//! - **ChallengeBook**: graduated probation challenges for quarantined readers
//! - **VoteBook**: peer consensus on restoring a quarantined reader
//! - **TrustManager**: the coordinator tying violations, quarantine entry,
//!   probation, consensus and restoration together
//!
//! ## Trust lifecycle
//!
//! Violations push a reader's score down and may open a quarantine; a
//! quarantined reader is blocked until it passes a batch of probation
//! challenges *and* its non-quarantined peers vote to approve restoration.
//! Restored readers re-enter capped below full trust and must earn the top
//! tier through clean activity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consensus;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod policy;
pub mod probation;
pub mod quarantine;
pub mod score;
pub mod suspicion;

#[cfg(test)]
mod proptests;

pub use consensus::{ConsensusOutcome, ConsensusVote, Vote, VoteBook};
pub use error::{Result, TrustError};
pub use ledger::{
    ReaderId, RecoveryOutcome, TrustLedger, TrustRecord, TrustSnapshot, Violation, ViolationKind,
    ViolationOutcome,
};
pub use manager::{QuarantineReport, RestoreReport, TrustManager, TrustStats, ViolationReport};
pub use policy::{PolicyError, PolicyHandle, TrustPolicy};
pub use probation::{
    Challenge, ChallengeBook, ChallengeId, ChallengeOutcome, ChallengePayload, ChallengeResponse,
    GradeOutcome,
};
pub use quarantine::{EpisodeStatus, QuarantineId, QuarantineLog, QuarantineRecord};
pub use score::{QuarantineState, TrustScore, TrustStatus};
pub use suspicion::{SightingLog, SuspicionBoard, TagSuspicion};
