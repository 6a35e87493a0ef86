//! Seam to the external fraud-probability scorer.
//!
//! The scorer itself (two classifiers plus an anomaly detector) lives
//! outside this subsystem; the gate only consumes its output as one more
//! violation signal. The combined risk is `max(risk_a, risk_b)`, boosted
//! by the policy's `anomaly_confidence_boost` when the anomaly flag is
//! set, and feeds both the flag threshold and the penalty confidence.

use serde::{Deserialize, Serialize};

use crate::event::TollEvent;

/// Output of the external fraud scorer for one event.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FraudSignal {
    /// First classifier's fraud probability.
    pub risk_a: f64,
    /// Second classifier's fraud probability.
    pub risk_b: f64,
    /// Whether the anomaly detector fired.
    pub anomaly: bool,
}

impl FraudSignal {
    /// Combined risk: the stronger classifier, boosted on anomaly.
    #[must_use]
    pub fn combined(&self, anomaly_boost: f64) -> f64 {
        let base = self.risk_a.max(self.risk_b);
        let boosted = if self.anomaly {
            base + anomaly_boost
        } else {
            base
        };
        boosted.clamp(0.0, 1.0)
    }
}

/// External collaborator scoring events for fraud.
pub trait FraudScorer: Send + Sync {
    /// Assess an admitted event.
    fn assess(&self, event: &TollEvent) -> FraudSignal;
}

/// Scorer that flags nothing. Used when no model is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopScorer;

impl FraudScorer for NoopScorer {
    fn assess(&self, _event: &TollEvent) -> FraudSignal {
        FraudSignal::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_takes_stronger_classifier() {
        let signal = FraudSignal {
            risk_a: 0.3,
            risk_b: 0.8,
            anomaly: false,
        };
        assert!((signal.combined(0.1) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn anomaly_boost_applies_and_clamps() {
        let signal = FraudSignal {
            risk_a: 0.95,
            risk_b: 0.2,
            anomaly: true,
        };
        assert!((signal.combined(0.1) - 1.0).abs() < f64::EPSILON);

        let mild = FraudSignal {
            risk_a: 0.5,
            risk_b: 0.4,
            anomaly: true,
        };
        assert!((mild.combined(0.1) - 0.6).abs() < f64::EPSILON);
    }
}
