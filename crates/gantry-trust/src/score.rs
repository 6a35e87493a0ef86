//! Clamped trust score arithmetic and status tiers.

use serde::{Deserialize, Serialize};

/// Trust status derived from the score thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustStatus {
    /// Full operational trust.
    Trusted,
    /// Elevated scrutiny; still operating.
    Degraded,
    /// Heavily restricted pending recovery.
    Suspended,
}

impl TrustStatus {
    /// Map a score to a status given the policy floors.
    #[must_use]
    pub fn for_score(score: u8, trusted_floor: u8, degraded_floor: u8) -> Self {
        if score >= trusted_floor {
            TrustStatus::Trusted
        } else if score >= degraded_floor {
            TrustStatus::Degraded
        } else {
            TrustStatus::Suspended
        }
    }
}

impl std::fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrustStatus::Trusted => "TRUSTED",
            TrustStatus::Degraded => "DEGRADED",
            TrustStatus::Suspended => "SUSPENDED",
        };
        f.write_str(s)
    }
}

/// Quarantine position of a reader, orthogonal to [`TrustStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarantineState {
    /// Operating normally.
    Normal,
    /// Blocked; awaiting probation.
    Quarantined,
    /// Blocked; working through probation challenges.
    Probation,
}

impl std::fmt::Display for QuarantineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuarantineState::Normal => "NORMAL",
            QuarantineState::Quarantined => "QUARANTINED",
            QuarantineState::Probation => "PROBATION",
        };
        f.write_str(s)
    }
}

/// A trust score, always inside `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrustScore(u8);

impl TrustScore {
    /// Highest possible score.
    pub const MAX: u8 = 100;

    /// Create a score, clamping to the valid range.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    /// The raw score value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Apply a signed delta, clamping to `[0, 100]`.
    ///
    /// Returns the delta actually applied after clamping.
    pub fn apply(&mut self, delta: i32) -> i32 {
        let old = i32::from(self.0);
        let new = (old + delta).clamp(0, i32::from(Self::MAX));
        self.0 = new as u8;
        new - old
    }
}

impl std::fmt::Display for TrustScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_floors() {
        assert_eq!(TrustStatus::for_score(100, 70, 40), TrustStatus::Trusted);
        assert_eq!(TrustStatus::for_score(70, 70, 40), TrustStatus::Trusted);
        assert_eq!(TrustStatus::for_score(69, 70, 40), TrustStatus::Degraded);
        assert_eq!(TrustStatus::for_score(40, 70, 40), TrustStatus::Degraded);
        assert_eq!(TrustStatus::for_score(39, 70, 40), TrustStatus::Suspended);
        assert_eq!(TrustStatus::for_score(0, 70, 40), TrustStatus::Suspended);
    }

    #[test]
    fn apply_clamps_low() {
        let mut score = TrustScore::new(30);
        let applied = score.apply(-50);
        assert_eq!(applied, -30);
        assert_eq!(score.value(), 0);
    }

    #[test]
    fn apply_clamps_high() {
        let mut score = TrustScore::new(95);
        let applied = score.apply(20);
        assert_eq!(applied, 5);
        assert_eq!(score.value(), 100);
    }

    #[test]
    fn new_clamps_out_of_range() {
        assert_eq!(TrustScore::new(250).value(), 100);
    }
}
