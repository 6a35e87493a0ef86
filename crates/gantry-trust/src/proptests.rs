//! Property-based tests for trust scoring invariants.
//!
//! These verify the score-bounds and recovery-cap properties hold for
//! arbitrary interleavings of violations, rewards and decay recovery.

use chrono::{Duration, Utc};
use proptest::prelude::*;

use crate::ledger::{TrustLedger, ViolationKind};
use crate::policy::TrustPolicy;
use crate::score::QuarantineState;

fn any_kind() -> impl Strategy<Value = ViolationKind> {
    prop_oneof![
        Just(ViolationKind::AuthFailure),
        Just(ViolationKind::ReplayAttack),
        Just(ViolationKind::StaleKeyVersion),
        Just(ViolationKind::RateLimitExceeded),
        Just(ViolationKind::FraudSuspected),
        Just(ViolationKind::OutlierBehavior),
        Just(ViolationKind::ProbationFailure),
    ]
}

#[derive(Clone, Debug)]
enum Op {
    Violation(ViolationKind, f64),
    CleanReward,
    DecayAfterHours(u32),
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any_kind(), 0.0f64..=1.5).prop_map(|(k, c)| Op::Violation(k, c)),
        Just(Op::CleanReward),
        (0u32..=200).prop_map(Op::DecayAfterHours),
    ]
}

proptest! {
    /// For every sequence of violations, rewards and recoveries, the score
    /// stays inside [0, 100].
    #[test]
    fn score_always_bounded(ops in prop::collection::vec(any_op(), 1..60)) {
        let policy = TrustPolicy::default();
        let mut ledger = TrustLedger::new();
        let mut now = Utc::now();

        for op in ops {
            match op {
                Op::Violation(kind, confidence) => {
                    let outcome = ledger.record_violation(
                        "RDR-P", kind, "", confidence, &policy.scoring, now,
                    );
                    prop_assert!(outcome.score <= 100);
                }
                Op::CleanReward => {
                    let snap = ledger.award_clean("RDR-P", &policy.scoring, now);
                    prop_assert!(snap.score <= 100);
                }
                Op::DecayAfterHours(hours) => {
                    now += Duration::hours(i64::from(hours));
                    ledger.recover_by_decay("RDR-P", &policy.decay, &policy.scoring, now);
                }
            }
            let score = ledger.get("RDR-P").map_or(100, |r| r.score());
            prop_assert!(score <= 100);
        }
    }

    /// Decay recovery never lifts a score above the recovery cap, and
    /// never applies to a quarantined reader.
    #[test]
    fn recovery_respects_cap_and_quarantine(
        penalties in 1usize..6,
        hours in 1i64..5000,
        quarantined in any::<bool>(),
    ) {
        let policy = TrustPolicy::default();
        let mut ledger = TrustLedger::new();
        let then = Utc::now() - Duration::hours(hours);

        for _ in 0..penalties {
            ledger.record_violation(
                "RDR-P", ViolationKind::FraudSuspected, "", 1.0, &policy.scoring, then,
            );
        }
        if quarantined {
            ledger.set_quarantine("RDR-P", QuarantineState::Quarantined, then);
        }
        let before = ledger.get("RDR-P").map_or(0, |r| r.score());

        let outcome = ledger.recover_by_decay("RDR-P", &policy.decay, &policy.scoring, Utc::now());
        match outcome {
            Some(recovery) => {
                prop_assert!(!quarantined);
                prop_assert!(recovery.new_score > before);
                prop_assert!(recovery.new_score <= policy.decay.max_recovery_cap);
            }
            None => {
                let after = ledger.get("RDR-P").map_or(0, |r| r.score());
                prop_assert_eq!(before, after);
            }
        }
    }

    /// Applied deltas scale monotonically with confidence inside the
    /// clamp range.
    #[test]
    fn confidence_scales_penalty(low in 0.5f64..0.75, high in 0.75f64..=1.0) {
        let policy = TrustPolicy::default();
        let now = Utc::now();

        let mut ledger_low = TrustLedger::new();
        let a = ledger_low.record_violation(
            "RDR-P", ViolationKind::FraudSuspected, "", low, &policy.scoring, now,
        );
        let mut ledger_high = TrustLedger::new();
        let b = ledger_high.record_violation(
            "RDR-P", ViolationKind::FraudSuspected, "", high, &policy.scoring, now,
        );
        prop_assert!(a.applied_delta >= b.applied_delta);
    }
}
