//! Trust policy: every threshold, weight and window as data.
//!
//! Nothing in the decision logic hard-codes a threshold; callers take an
//! immutable policy snapshot per call, which makes unit testing with fixture
//! policies trivial and lets an operator hot-swap the policy without a
//! process restart via [`PolicyHandle::replace`].
//!
//! A missing or invalid policy file at startup is the one fatal error in
//! this subsystem: the system must not silently default on security
//! thresholds.

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::ViolationKind;

/// Errors raised while loading or validating a policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A field holds a value outside its allowed range.
    #[error("invalid policy value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Why the value is rejected.
        reason: String,
    },

    /// The policy file could not be read.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// The policy file could not be parsed.
    #[error("failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Penalty parameters for one violation kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    /// Base score deduction before weighting.
    pub base: f64,
    /// Kind-specific weight multiplier.
    pub weight: f64,
    /// Quarantine severity contribution (clamped to 1..=3 at entry).
    pub severity: u8,
}

impl PenaltyPolicy {
    fn new(base: f64, weight: f64, severity: u8) -> Self {
        Self {
            base,
            weight,
            severity,
        }
    }
}

/// Penalty parameters per violation kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyTable {
    /// Bad or forged signature.
    pub auth_failure: PenaltyPolicy,
    /// Reused nonce or stale timestamp: a captured, previously-valid message.
    pub replay_attack: PenaltyPolicy,
    /// Event signed under a superseded key version.
    pub stale_key_version: PenaltyPolicy,
    /// Burst traffic over the admission rate limit.
    pub rate_limit_exceeded: PenaltyPolicy,
    /// Fraud scorer flagged the transaction.
    pub fraud_suspected: PenaltyPolicy,
    /// Event rate far above the peer average.
    pub outlier_behavior: PenaltyPolicy,
    /// A probation challenge ran out of attempts.
    pub probation_failure: PenaltyPolicy,
}

impl Default for PenaltyTable {
    fn default() -> Self {
        Self {
            auth_failure: PenaltyPolicy::new(20.0, 2.0, 2),
            replay_attack: PenaltyPolicy::new(10.0, 1.5, 2),
            stale_key_version: PenaltyPolicy::new(10.0, 1.2, 1),
            rate_limit_exceeded: PenaltyPolicy::new(4.0, 0.5, 1),
            fraud_suspected: PenaltyPolicy::new(12.0, 1.0, 1),
            outlier_behavior: PenaltyPolicy::new(6.0, 1.0, 1),
            probation_failure: PenaltyPolicy::new(10.0, 1.0, 1),
        }
    }
}

impl PenaltyTable {
    /// Penalty parameters for a violation kind.
    #[must_use]
    pub fn for_kind(&self, kind: ViolationKind) -> &PenaltyPolicy {
        match kind {
            ViolationKind::AuthFailure => &self.auth_failure,
            ViolationKind::ReplayAttack => &self.replay_attack,
            ViolationKind::StaleKeyVersion => &self.stale_key_version,
            ViolationKind::RateLimitExceeded => &self.rate_limit_exceeded,
            ViolationKind::FraudSuspected => &self.fraud_suspected,
            ViolationKind::OutlierBehavior => &self.outlier_behavior,
            ViolationKind::ProbationFailure => &self.probation_failure,
        }
    }
}

/// Score thresholds and penalty weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score assigned when a trust record is first created.
    pub initial_score: u8,
    /// Scores at or above this are `Trusted`.
    pub trusted_floor: u8,
    /// Scores at or above this (but below `trusted_floor`) are `Degraded`.
    pub degraded_floor: u8,
    /// Reward for a fully clean admitted event.
    pub clean_reward: u8,
    /// Below this score the reader's secret is proactively rotated:
    /// severe degradation is treated as presumptive compromise.
    pub rotate_key_below: u8,
    /// Per-kind penalty parameters.
    pub penalties: PenaltyTable,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            initial_score: 100,
            trusted_floor: 70,
            degraded_floor: 40,
            clean_reward: 1,
            rotate_key_below: 25,
            penalties: PenaltyTable::default(),
        }
    }
}

/// Quarantine entry rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarantinePolicy {
    /// A post-penalty score at or below this triggers quarantine.
    pub threshold: u8,
    /// Kinds that trigger quarantine regardless of score.
    pub critical_kinds: Vec<ViolationKind>,
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self {
            threshold: 35,
            critical_kinds: vec![ViolationKind::AuthFailure, ViolationKind::ReplayAttack],
        }
    }
}

impl QuarantinePolicy {
    /// Whether a violation kind bypasses the score threshold.
    #[must_use]
    pub fn is_critical(&self, kind: ViolationKind) -> bool {
        self.critical_kinds.contains(&kind)
    }
}

/// Time-decay recovery parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayPolicy {
    /// Points recovered per `ln(1 + hours)` unit.
    pub recovery_rate: f64,
    /// No recovery until this many hours since the last violation.
    pub min_recovery_hours: f64,
    /// Recovery never lifts a score above this; the top tier must be
    /// earned through clean activity, not by waiting.
    pub max_recovery_cap: u8,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            recovery_rate: 2.0,
            min_recovery_hours: 1.0,
            max_recovery_cap: 80,
        }
    }
}

/// Probation challenge parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbationPolicy {
    /// Challenges issued for a severity-1 quarantine; each extra severity
    /// level adds one.
    pub challenges_required: u32,
    /// Attempts allowed per challenge before it fails terminally.
    pub max_attempts: u32,
    /// Restored readers are capped at this score.
    pub probation_cap: u8,
    /// Score bonus granted on successful restoration (before capping).
    pub restoration_bonus: u8,
    /// Response deadline for timing challenges, in milliseconds.
    pub timing_max_response_ms: u64,
}

impl Default for ProbationPolicy {
    fn default() -> Self {
        Self {
            challenges_required: 3,
            max_attempts: 2,
            probation_cap: 60,
            restoration_bonus: 20,
            timing_max_response_ms: 5000,
        }
    }
}

/// Peer consensus parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    /// Minimum votes before consensus can be evaluated at all.
    pub min_voters: usize,
    /// Approvals / total must reach this ratio.
    pub approval_threshold: f64,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            min_voters: 2,
            approval_threshold: 0.6,
        }
    }
}

/// Cross-reader tag suspicion parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspicionPolicy {
    /// Fraud-sensitivity multiplier attached to suspect tags.
    pub multiplier: f64,
    /// How long a suspicion entry stays active, in minutes.
    pub duration_mins: i64,
    /// Tags sighted by the reader within this window are marked on
    /// quarantine entry, in minutes.
    pub sighting_window_mins: i64,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        Self {
            multiplier: 1.5,
            duration_mins: 30,
            sighting_window_mins: 60,
        }
    }
}

/// Admission gate parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionPolicy {
    /// Maximum clock drift between reader and server, in seconds.
    pub max_drift_secs: i64,
    /// Nonce retention, in seconds. Must be at least `max_drift_secs`.
    pub nonce_retention_secs: i64,
    /// Rate-limit window, in seconds.
    pub rate_window_secs: i64,
    /// Maximum accepted starts per reader inside the rate window.
    pub rate_max_events: usize,
    /// Window for the cross-reader outlier comparison, in minutes.
    pub outlier_window_mins: i64,
    /// A reader this many times above the peer average is an outlier.
    pub outlier_multiplier: f64,
    /// Confidence assigned to outlier penalties (a statistical signal,
    /// not a deterministic one).
    pub outlier_confidence: f64,
    /// Combined fraud risk at or above this records a violation.
    pub fraud_risk_threshold: f64,
    /// Confidence boost when the anomaly detector also fires.
    pub anomaly_confidence_boost: f64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_drift_secs: 30,
            nonce_retention_secs: 60,
            rate_window_secs: 10,
            rate_max_events: 30,
            outlier_window_mins: 10,
            outlier_multiplier: 3.0,
            outlier_confidence: 0.6,
            fraud_risk_threshold: 0.7,
            anomaly_confidence_boost: 0.1,
        }
    }
}

/// The complete trust policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    /// Score thresholds and penalties.
    pub scoring: ScoringPolicy,
    /// Quarantine entry rules.
    pub quarantine: QuarantinePolicy,
    /// Time-decay recovery.
    pub decay: DecayPolicy,
    /// Probation challenges.
    pub probation: ProbationPolicy,
    /// Peer consensus.
    pub consensus: ConsensusPolicy,
    /// Tag suspicion propagation.
    pub suspicion: SuspicionPolicy,
    /// Admission gate windows and limits.
    pub admission: AdmissionPolicy,
    /// Interval of the background reconciliation task, in seconds.
    pub reconcile_interval_secs: u64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            scoring: ScoringPolicy::default(),
            quarantine: QuarantinePolicy::default(),
            decay: DecayPolicy::default(),
            probation: ProbationPolicy::default(),
            consensus: ConsensusPolicy::default(),
            suspicion: SuspicionPolicy::default(),
            admission: AdmissionPolicy::default(),
            reconcile_interval_secs: 300,
        }
    }
}

fn invalid(field: &str, reason: &str) -> PolicyError {
    PolicyError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

impl TrustPolicy {
    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidValue`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (field, value) in [
            ("scoring.initial_score", self.scoring.initial_score),
            ("scoring.trusted_floor", self.scoring.trusted_floor),
            ("scoring.degraded_floor", self.scoring.degraded_floor),
            ("scoring.rotate_key_below", self.scoring.rotate_key_below),
            ("quarantine.threshold", self.quarantine.threshold),
            ("decay.max_recovery_cap", self.decay.max_recovery_cap),
            ("probation.probation_cap", self.probation.probation_cap),
        ] {
            if value > 100 {
                return Err(invalid(field, "scores live in [0, 100]"));
            }
        }
        if self.scoring.trusted_floor <= self.scoring.degraded_floor {
            return Err(invalid(
                "scoring.trusted_floor",
                "must be above degraded_floor",
            ));
        }
        if self.decay.max_recovery_cap >= 100 {
            return Err(invalid(
                "decay.max_recovery_cap",
                "must be strictly below full trust",
            ));
        }
        if self.decay.recovery_rate <= 0.0 {
            return Err(invalid("decay.recovery_rate", "must be positive"));
        }
        if self.decay.min_recovery_hours < 0.0 {
            return Err(invalid("decay.min_recovery_hours", "must not be negative"));
        }
        if self.probation.probation_cap >= self.scoring.trusted_floor {
            return Err(invalid(
                "probation.probation_cap",
                "restored readers must re-enter below the trusted floor",
            ));
        }
        if self.probation.challenges_required == 0 {
            return Err(invalid("probation.challenges_required", "must be at least 1"));
        }
        if self.probation.max_attempts == 0 {
            return Err(invalid("probation.max_attempts", "must be at least 1"));
        }
        if self.consensus.min_voters == 0 {
            return Err(invalid("consensus.min_voters", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.consensus.approval_threshold)
            || self.consensus.approval_threshold == 0.0
        {
            return Err(invalid(
                "consensus.approval_threshold",
                "must be in (0.0, 1.0]",
            ));
        }
        if self.suspicion.multiplier < 1.0 {
            return Err(invalid("suspicion.multiplier", "must be at least 1.0"));
        }
        if self.admission.max_drift_secs <= 0 {
            return Err(invalid("admission.max_drift_secs", "must be positive"));
        }
        if self.admission.nonce_retention_secs < self.admission.max_drift_secs {
            return Err(invalid(
                "admission.nonce_retention_secs",
                "pruning a nonce still inside the drift window would allow replays",
            ));
        }
        if self.admission.rate_window_secs <= 0 || self.admission.rate_max_events == 0 {
            return Err(invalid("admission.rate_window_secs", "rate limit must be positive"));
        }
        if self.reconcile_interval_secs == 0 {
            return Err(invalid("reconcile_interval_secs", "must be positive"));
        }
        Ok(())
    }

    /// Load and validate a policy from a JSON file.
    ///
    /// Fields absent from the file take their default values.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the file cannot be read or parsed, or
    /// fails validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        let policy: TrustPolicy = serde_json::from_str(&raw)?;
        policy.validate()?;
        Ok(policy)
    }
}

/// Shared handle to the active policy, supporting hot replacement.
///
/// Decision paths call [`PolicyHandle::snapshot`] once and work against the
/// immutable snapshot for the rest of the call, so a concurrent
/// [`PolicyHandle::replace`] never changes the rules mid-decision.
#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<Arc<TrustPolicy>>>,
}

impl PolicyHandle {
    /// Wrap a validated policy.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the policy fails validation.
    pub fn new(policy: TrustPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(policy))),
        })
    }

    /// Load the policy from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] on read, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::new(TrustPolicy::from_file(path)?)
    }

    /// Take an immutable snapshot of the current policy.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrustPolicy> {
        Arc::clone(&self.inner.read().expect("policy lock poisoned"))
    }

    /// Replace the active policy without a restart.
    ///
    /// In-flight decisions keep the snapshot they already took.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if the new policy fails validation; the
    /// previous policy stays active.
    pub fn replace(&self, policy: TrustPolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        *self.inner.write().expect("policy lock poisoned") = Arc::new(policy);
        Ok(())
    }
}

impl std::fmt::Debug for PolicyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyHandle").finish()
    }
}
