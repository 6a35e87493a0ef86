//! Inbound toll events and admission outcomes.

use serde::{Deserialize, Serialize};

use gantry_trust::TrustSnapshot;

use crate::scorer::FraudSignal;

/// A toll event as reported by a field reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TollEvent {
    /// Caller-assigned event id, carried through for the audit trail.
    pub event_id: String,
    /// Hashed RFID tag the reader scanned.
    pub tag_hash: String,
    /// Reporting reader.
    pub reader_id: String,
    /// Reader-side Unix timestamp, seconds.
    pub timestamp: i64,
    /// Single-use random value for replay protection.
    pub nonce: String,
    /// Hex HMAC-SHA256 over `tag_hash ∥ reader_id ∥ timestamp ∥ nonce`.
    pub signature: String,
    /// Key version the event was signed under.
    pub key_version: u32,
}

/// Why an event was turned away.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Too many accepted starts inside the rate window.
    RateLimited,
    /// Reader not in the registry.
    UnknownReader,
    /// Reader's credential has been revoked.
    ReaderRevoked,
    /// Reader is quarantined or in probation; operation is suspended.
    ReaderQuarantined,
    /// HMAC signature did not verify.
    SignatureMismatch,
    /// Event signed under a superseded key version.
    StaleKeyVersion {
        /// Version the event claimed.
        presented: u32,
        /// Version currently active.
        active: u32,
    },
    /// Timestamp outside the freshness window.
    StaleTimestamp {
        /// Observed drift, in seconds.
        drift_secs: i64,
    },
    /// Nonce already seen from this reader.
    NonceReused,
    /// Event rate far above the peer average.
    OutlierTraffic,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::RateLimited => f.write_str("rate limited"),
            RejectReason::UnknownReader => f.write_str("unknown reader"),
            RejectReason::ReaderRevoked => f.write_str("reader revoked"),
            RejectReason::ReaderQuarantined => f.write_str("reader quarantined"),
            RejectReason::SignatureMismatch => f.write_str("signature mismatch"),
            RejectReason::StaleKeyVersion { presented, active } => {
                write!(f, "stale key version {presented} (active {active})")
            }
            RejectReason::StaleTimestamp { drift_secs } => {
                write!(f, "timestamp drift {drift_secs}s")
            }
            RejectReason::NonceReused => f.write_str("nonce reused"),
            RejectReason::OutlierTraffic => f.write_str("outlier traffic"),
        }
    }
}

/// Outcome of running an event through the admission gate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AdmissionDecision {
    /// All checks passed; the event may proceed to business logic.
    Accepted {
        /// Reader trust after the clean reward or fraud penalty.
        trust: TrustSnapshot,
        /// What the fraud scorer said, for the downstream pipeline.
        fraud: FraudSignal,
    },
    /// A check failed; the event must not be processed.
    Rejected {
        /// Which check failed.
        reason: RejectReason,
        /// Reader trust after any penalty, when attributable.
        trust: Option<TrustSnapshot>,
    },
}

impl AdmissionDecision {
    /// Whether the event was admitted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accepted { .. })
    }

    /// The rejection reason, if rejected.
    #[must_use]
    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            AdmissionDecision::Rejected { reason, .. } => Some(reason),
            AdmissionDecision::Accepted { .. } => None,
        }
    }
}
